//! Per-user conversation state.
//!
//! A session owns the chat history for one user. It is passed explicitly
//! to the answering pipeline; nothing is global. History only grows, and
//! always by a complete Human/Assistant pair.

use uuid::Uuid;

use crate::models::ChatTurn;

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: Vec<ChatTurn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Records a completed exchange: the query, then the answer.
    pub fn push_exchange(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        self.history.push(ChatTurn::human(query));
        self.history.push(ChatTurn::assistant(answer));
    }
}
