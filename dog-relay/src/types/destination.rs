use serde::{Deserialize, Serialize};

use super::OwnerId;

/// Delivery channel identifiers used to reach a requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Conversation the artifact and notices are sent to
    pub chat_id: i64,

    /// Status message to update in place, when the transport supports it
    pub message_id: Option<i64>,
}

impl Destination {
    pub fn new(chat_id: i64) -> Self {
        Self { chat_id, message_id: None }
    }

    /// Private conversation with the owner
    pub fn owner(owner: OwnerId) -> Self {
        Self::new(owner.get())
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }
}
