//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`HuggingFaceEmbedder`]** (default): Hugging Face inference API, `feature-extraction` task.
//! - **[`OpenAiEmbedder`]**: OpenAI `/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//! - **`LocalEmbedder`**: in-process fastembed, behind the `local-embeddings-fastembed` feature.
//!
//! Also provides vector utilities for the SQLite-backed index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding
//!
//! # Retry Strategy
//!
//! The HTTP providers share one retry loop, off unless `embedding.max_retries`
//! is raised above its default of 0:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub const DEFAULT_HF_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_HF_URL: &str = "https://router.huggingface.co/hf-inference/models";
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Turns text into fixed-dimension vectors.
///
/// One instance is shared by the semantic splitter, index build and
/// query embedding so all vectors live in the same space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embeds a batch, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }
}

/// Embeds `texts` in slices of `batch_size`, checking that every slice
/// comes back with one vector per input.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        out.extend(vectors);
    }
    Ok(out)
}

// ============ Shared HTTP plumbing ============

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// POSTs `body` as JSON. With `max_retries` above zero, 429, 5xx and network
/// failures are retried with exponential backoff.
async fn post_json_with_retry(
    client: &reqwest::Client,
    label: &str,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(
                provider = label,
                attempt,
                delay_secs = delay.as_secs(),
                "retrying embedding request"
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        Error::Embedding(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::Embedding(format!("{} API error {}: {}", label, status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(Error::Embedding(format!(
                    "{} connection error ({}): {}",
                    label, url, e
                )));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| Error::Embedding(format!("{} embedding failed after retries", label))))
}

fn json_to_vec(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

// ============ Hugging Face ============

/// Hugging Face inference API, `feature-extraction` pipeline.
///
/// Sentence-transformers models answer with one pooled vector per input.
/// Models that answer with per-token vectors are mean-pooled here.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig, token: &str) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_HF_MODEL.to_string());
        let base = config
            .url
            .as_deref()
            .unwrap_or(DEFAULT_HF_URL)
            .trim_end_matches('/');
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: format!("{}/{}/pipeline/feature-extraction", base, model),
            token: token.to_string(),
            dims: config.dims.unwrap_or(384),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "inputs": texts });
        let json = post_json_with_retry(
            &self.client,
            "Hugging Face",
            &self.endpoint,
            Some(&self.token),
            &body,
            self.max_retries,
        )
        .await?;
        parse_hf_response(&json)
    }
}

fn parse_hf_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = || Error::Embedding("invalid Hugging Face response".to_string());
    let items = json.as_array().ok_or_else(invalid)?;

    items
        .iter()
        .map(|item| {
            if let Some(v) = json_to_vec(item) {
                return Ok(v);
            }
            // [tokens][dims] → mean over tokens
            let tokens: Vec<Vec<f32>> = item
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(json_to_vec)
                .collect::<Option<_>>()
                .ok_or_else(invalid)?;
            mean_pool(&tokens).ok_or_else(invalid)
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dims = tokens.first()?.len();
    let mut sum = vec![0.0f32; dims];
    for t in tokens {
        if t.len() != dims {
            return None;
        }
        for (s, v) in sum.iter_mut().zip(t) {
            *s += v;
        }
    }
    let n = tokens.len() as f32;
    Some(sum.into_iter().map(|s| s / n).collect())
}

// ============ OpenAI ============

/// Embedding provider using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        let base = config
            .url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_URL)
            .trim_end_matches('/');
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/embeddings", base),
            api_key: api_key.to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            dims: config.dims.unwrap_or(1536),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            "OpenAI",
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Embedding("Invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vec = item
            .get("embedding")
            .and_then(json_to_vec)
            .ok_or_else(|| Error::Embedding("Invalid OpenAI response: missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config
            .url
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/');
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/api/embed", base),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            dims: config.dims.unwrap_or(768),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            "Ollama",
            &self.url,
            None,
            &body,
            self.max_retries,
        )
        .await?;
        json.get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|items| items.iter().map(json_to_vec).collect::<Option<Vec<_>>>())
            .ok_or_else(|| Error::Embedding("Invalid Ollama response: missing embeddings".into()))
    }
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-process embeddings via fastembed. The model is downloaded from
    /// Hugging Face on first use and cached; later calls run offline.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            fastembed_model(&model_name)?;
            let dims = config.dims.unwrap_or(match model_name.as_str() {
                "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
                "bge-large-en-v1.5" => 1024,
                _ => 384,
            });
            Ok(Self {
                model_name,
                dims,
                model: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => Err(Error::Configuration(format!(
                "Unknown local embedding model: '{}'. Supported models: all-minilm-l6-v2, \
                 bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, nomic-embed-text-v1.5",
                other
            ))),
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let kind = fastembed_model(&self.model_name)?;
            let slot = self.model.clone();
            let texts = texts.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut guard = slot
                    .lock()
                    .map_err(|_| Error::Embedding("local model lock poisoned".into()))?;
                if guard.is_none() {
                    let model = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(kind).with_show_download_progress(true),
                    )
                    .map_err(|e| {
                        Error::Embedding(format!("Failed to initialize local embedding model: {}", e))
                    })?;
                    *guard = Some(model);
                }
                let model = guard
                    .as_mut()
                    .ok_or_else(|| Error::Embedding("local model unavailable".into()))?;
                model
                    .embed(texts, None)
                    .map_err(|e| Error::Embedding(format!("Local embedding failed: {}", e)))
            })
            .await
            .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))?
        }
    }
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"huggingface"` | [`HuggingFaceEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
///
/// `key` is the provider credential resolved by
/// [`Credentials`](crate::config::Credentials).
pub fn create_embedder(
    config: &EmbeddingConfig,
    key: Option<&str>,
) -> Result<std::sync::Arc<dyn Embedder>> {
    let require_key = || {
        key.ok_or_else(|| {
            Error::Configuration(format!(
                "embedding provider '{}' requires an API key",
                config.provider
            ))
        })
    };
    match config.provider.as_str() {
        "huggingface" => Ok(std::sync::Arc::new(HuggingFaceEmbedder::new(
            config,
            require_key()?,
        )?)),
        "openai" => Ok(std::sync::Arc::new(OpenAiEmbedder::new(config, require_key()?)?)),
        "ollama" => Ok(std::sync::Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(std::sync::Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(Error::Configuration(
            "Local embedding provider requires --features local-embeddings-fastembed".into(),
        )),
        other => Err(Error::Configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use repo_qa::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched or
/// zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: Some("tiny".to_string()),
            dims: Some(3),
            url: Some(server.uri()),
            batch_size: 2,
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn hf_token_level_output_is_mean_pooled() {
        let json = json!([
            [[1.0, 0.0], [3.0, 2.0]],
            [0.5, 0.5]
        ]);
        let vectors = parse_hf_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![2.0, 1.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = json!({ "data": [
            { "index": 1, "embedding": [0.0, 1.0] },
            { "index": 0, "embedding": [1.0, 0.0] }
        ]});
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn huggingface_posts_inputs_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tiny/pipeline/feature-extraction"))
            .and(header("authorization", "Bearer hf-token"))
            .and(body_json(json!({ "inputs": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HuggingFaceEmbedder::new(&config_for(&server, "huggingface"), "hf-token").unwrap();
        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(embedder.dims(), 3);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server, "openai");
        config.max_retries = 3;
        let embedder = OpenAiEmbedder::new(&config, "sk-test").unwrap();
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(ref m) if m.contains("bad input")));
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2, 0.3]] })),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, "ollama");
        config.max_retries = 1;
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let v = embedder.embed_query("hello").await.unwrap();
        assert_eq!(v.len(), 3);
    }

    #[tokio::test]
    async fn default_config_sends_a_single_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            url: Some(server.uri()),
            ..Default::default()
        };
        let embedder = HuggingFaceEmbedder::new(&config, "hf-token").unwrap();
        let started = std::time::Instant::now();
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(ref m) if m.contains("503")));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unreachable_service_is_embedding_error() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            url: Some("http://127.0.0.1:1".to_string()),
            max_retries: 0,
            timeout_secs: 2,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&config_for(&server, "ollama")).unwrap();
        let texts: Vec<String> = (0..4).map(|i| format!("t{}", i)).collect();
        let vectors = embed_batched(&embedder, &texts, 2).await.unwrap();
        assert_eq!(vectors.len(), 4);
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let config = EmbeddingConfig::default();
        let err = create_embedder(&config, None).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
