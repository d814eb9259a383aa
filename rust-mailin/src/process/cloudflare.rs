//! Cloudflare Email Worker payload processing.
//!
//! Cloudflare provides raw RFC 5322 email content that needs to be parsed.

use tracing::{info, warn};

use crate::process::email_parser::{parse_raw_email, ParsedEmail};
use crate::process::mailgun::generate_fallback_id;
use crate::process::types::{CloudflarePayload, RawMail};

/// Convert a Cloudflare payload into a `RawMail`.
///
/// 1. Parse the raw email using mailparse
/// 2. Take Message-Id, Subject, text body and attachments from it
/// 3. Fall back to the payload's own subject when parsing fails
pub fn process_cloudflare(payload: CloudflarePayload) -> RawMail {
    info!(
        from = %payload.from_field,
        to = %payload.to,
        raw_content_length = payload.raw_content.len(),
        "cloudflare_process_start"
    );

    let parsed = match parse_raw_email(&payload.raw_content) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "cloudflare_email_parse_failed");
            ParsedEmail::default()
        }
    };

    let subject = parsed
        .subject
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| payload.subject.clone());

    let message_id = parsed
        .message_id
        .unwrap_or_else(|| generate_fallback_id(&subject, &payload.to));

    let text = parsed.text.unwrap_or_default();

    info!(
        message_id = %message_id,
        text_length = text.len(),
        attachment_count = parsed.attachments.len(),
        "cloudflare_process_complete"
    );

    RawMail {
        message_id,
        sender: payload.from_field,
        recipient: payload.to,
        subject,
        text,
        attachments: parsed.attachments,
    }
}
