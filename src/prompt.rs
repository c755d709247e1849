//! Prompt assembly for the answering model.
//!
//! The conversation sent to the model is, in order: the fixed
//! [`SYSTEM_PROMPT`], a system block with the retrieved context and a
//! transcript of the chat so far ([`SYSTEM_TEMPLATE`]), the prior turns as
//! messages, and finally the user query ([`HUMAN_TEMPLATE`]).

use crate::llm::ChatMessage;
use crate::models::{ChatTurn, Chunk, Role};

pub const SYSTEM_PROMPT: &str = "You are an AI assistant specializing in analyzing GitHub repositories. \
You have access to the contents of a repository, including code and text files, retrieved from a vector database.

Your role is to:
- Provide accurate, detailed explanations of the repository's content, including code functionality and documentation.
- Answer user queries based on the provided repository context.
- Explain technical concepts in clear, understandable language.
- Cite specific files from the repository when relevant.
- If the context is insufficient, state so and provide a general answer if possible.

Always base your responses on the provided repository context and be precise about which files support your claims.";

pub const SYSTEM_TEMPLATE: &str = "
---

## Context Snapshot:

- **Repository Files** (from vector DB):
{context}

- **Chat History**:
{chat_history}
";

pub const HUMAN_TEMPLATE: &str = "**User Query**: {query}";

/// `"Human: …"` / `"Assistant: …"` lines joined by newlines; empty for no turns.
pub fn render_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieved chunk contents separated by blank lines.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replaces each `{name}` placeholder in one left-to-right pass. Inserted
/// values are never scanned again, so braces in user text survive as-is.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((at, key, value)) = values
        .iter()
        .filter_map(|(key, value)| rest.find(key).map(|at| (at, *key, *value)))
        .min_by_key(|(at, _, _)| *at)
    {
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + key.len()..];
    }
    out.push_str(rest);
    out
}

pub fn compose(context: &str, history: &[ChatTurn], query: &str) -> Vec<ChatMessage> {
    let history_text = render_history(history);
    let snapshot = fill(
        SYSTEM_TEMPLATE,
        &[("{context}", context), ("{chat_history}", &history_text)],
    );

    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.push(ChatMessage::system(snapshot));
    messages.extend(history.iter().map(|turn| match turn.role {
        Role::Human => ChatMessage::user(turn.content.clone()),
        Role::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(fill(HUMAN_TEMPLATE, &[("{query}", query)])));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use crate::models::DocumentMetadata;

    fn chunk(content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: DocumentMetadata {
                path: "x.md".into(),
                repo: "a/b".into(),
                branch: "main".into(),
                sha: None,
                source_url: None,
            },
            chunk_index: 0,
            hash: String::new(),
        }
    }

    #[test]
    fn empty_history_renders_empty() {
        assert_eq!(render_history(&[]), "");
    }

    #[test]
    fn history_lines_are_prefixed_by_role() {
        let turns = vec![ChatTurn::human("What is this?"), ChatTurn::assistant("A CLI.")];
        assert_eq!(render_history(&turns), "Human: What is this?\nAssistant: A CLI.");
    }

    #[test]
    fn context_joins_with_blank_lines() {
        assert_eq!(format_context(&[chunk("one"), chunk("two")]), "one\n\ntwo");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn compose_orders_messages() {
        let history = vec![ChatTurn::human("q1"), ChatTurn::assistant("a1")];
        let messages = compose("CTX", &history, "q2");

        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert!(messages[1].content.contains("- **Repository Files** (from vector DB):\nCTX\n"));
        assert!(messages[1].content.contains("- **Chat History**:\nHuman: q1\nAssistant: a1\n"));
        assert_eq!(messages[2].content, "q1");
        assert_eq!(messages[3].content, "a1");
        assert_eq!(messages[4].content, "**User Query**: q2");
    }

    #[test]
    fn context_braces_are_not_reinterpreted() {
        let messages = compose("fn f() { {chat_history} }", &[ChatTurn::human("h")], "q");
        assert!(messages[1].content.contains("fn f() { {chat_history} }"));
    }

    #[test]
    fn history_braces_are_not_reinterpreted() {
        let messages = compose("RETRIEVED", &[ChatTurn::human("what is {context}?")], "q");
        assert!(messages[1].content.contains("- **Chat History**:\nHuman: what is {context}?\n"));
        assert_eq!(messages[1].content.matches("RETRIEVED").count(), 1);
    }

    #[test]
    fn query_braces_survive() {
        let messages = compose("", &[], "format!(\"{query}\")");
        assert_eq!(messages[2].content, "**User Query**: format!(\"{query}\")");
    }
}
