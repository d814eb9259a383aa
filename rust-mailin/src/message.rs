//! Inbound mail-in message.

use crate::entity::{Target, User};

/// A file attached to an inbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// An email routed to a mail-in address, with sender and target resolved.
///
/// Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    message_id: String,
    subject: String,
    text: String,
    sender: Option<User>,
    target: Option<Target>,
    recipient_token: Option<String>,
    attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Create a message with the given id, subject and body text.
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            subject: subject.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_sender(mut self, sender: Option<User>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_target(mut self, target: Option<Target>) -> Self {
        self.target = target;
        self
    }

    pub fn with_recipient_token(mut self, token: Option<String>) -> Self {
        self.recipient_token = token;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Plain text body.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Option<&User> {
        self.sender.as_ref()
    }

    /// Entity the mail-in address posts into.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Token from the plus part of the recipient address.
    pub fn recipient_token(&self) -> Option<&str> {
        self.recipient_token.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}
