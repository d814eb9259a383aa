//! Inbound payload types.
//!
//! This module defines:
//! - Provider payloads as received on the webhook endpoints
//! - `RawMail`, the provider-neutral email the dispatcher is fed from

use serde::{Deserialize, Serialize};

use crate::message::Attachment;

/// Mailgun inbound route payload.
///
/// Mailgun posts form data, urlencoded or (when the message has
/// attachments) multipart. Field names use hyphens, which are aliased here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailgunPayload {
    pub recipient: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "body-plain")]
    pub body_plain: Option<String>,
    #[serde(default, rename = "stripped-text")]
    pub stripped_text: Option<String>,
    #[serde(default, rename = "body-html")]
    pub body_html: Option<String>,
    #[serde(default, rename = "message-headers")]
    pub message_headers: Option<String>,
    #[serde(default, rename = "from")]
    pub from_field: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub signature: String,
    /// `attachment-1..N` parts of a multipart post
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
}

/// Cloudflare Email Worker payload (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflarePayload {
    /// Sender email address
    #[serde(rename = "from")]
    pub from_field: String,
    /// Recipient email address
    pub to: String,
    /// Email subject
    #[serde(default)]
    pub subject: String,
    /// Raw RFC 5322 email content (headers + body)
    pub raw_content: String,
}

/// An email as delivered by a relay provider, before sender and target
/// are resolved.
#[derive(Debug, Clone, Default)]
pub struct RawMail {
    pub message_id: String,
    /// Sender address, possibly with a display name
    pub sender: String,
    /// Mail-in recipient address
    pub recipient: String,
    pub subject: String,
    /// Plain text body
    pub text: String,
    pub attachments: Vec<Attachment>,
}
