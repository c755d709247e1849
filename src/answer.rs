//! Answer generation over a composed prompt.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::models::Query;
use crate::session::Session;

pub struct AnsweringService {
    model: Arc<dyn ChatModel>,
}

impl AnsweringService {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Sends `messages` to the model and, on success only, appends the
    /// query and the answer to `session`. On failure the session is left
    /// untouched.
    pub async fn answer(
        &self,
        session: &mut Session,
        query: &Query,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let text = match self.model.complete(messages).await {
            Ok(text) => text,
            Err(Error::Model(msg)) => return Err(Error::Model(msg)),
            Err(other) => return Err(Error::Model(other.to_string())),
        };
        session.push_exchange(query.text.clone(), text.clone());
        tracing::debug!(session = session.id(), turns = session.len(), "answer recorded");
        Ok(text)
    }
}
