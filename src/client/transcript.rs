//! Local message transcript with id-based deduplication

use std::collections::HashSet;

use crate::message::Message;

/// Ordered list of displayed messages
///
/// A message whose id has already been seen is ignored, which is what hides
/// the relay's echo of a participant's own messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message; returns `false` if its id was already present
    pub fn insert(&mut self, msg: Message) -> bool {
        if !self.seen.insert(msg.id.clone()) {
            return false;
        }
        self.messages.push(msg);
        true
    }

    /// Whether a message id has been seen
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Messages in arrival order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
