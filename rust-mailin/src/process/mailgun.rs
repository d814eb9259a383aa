//! Mailgun inbound route processing.
//!
//! Mailgun provides pre-parsed email content, so no RFC 5322 parsing is
//! needed; the text body is picked from the form fields.

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::html::text_content;
use crate::process::types::{MailgunPayload, RawMail};

/// Convert a Mailgun payload into a `RawMail`.
///
/// 1. Extract Message-Id from the headers JSON (SHA-256 fallback)
/// 2. Pick the text body: body-plain, stripped-text, then body-html as text
/// 3. Pick the sender: envelope sender, else the From header
pub fn process_mailgun(payload: MailgunPayload) -> RawMail {
    info!(
        recipient = %payload.recipient,
        has_body_plain = payload.body_plain.is_some(),
        has_stripped_text = payload.stripped_text.is_some(),
        has_body_html = payload.body_html.is_some(),
        has_message_headers = payload.message_headers.is_some(),
        attachment_count = payload.attachments.len(),
        "mailgun_process_start"
    );

    let message_id = extract_message_id_from_headers(&payload.message_headers)
        .unwrap_or_else(|| generate_fallback_id(&payload.subject, &payload.recipient));

    let (text, text_source) = select_text(&payload);

    let sender = if payload.sender.trim().is_empty() {
        payload.from_field.clone()
    } else {
        payload.sender.clone()
    };

    info!(
        message_id = %message_id,
        text_source = text_source,
        text_length = text.len(),
        "mailgun_process_complete"
    );

    RawMail {
        message_id,
        sender,
        recipient: payload.recipient,
        subject: payload.subject,
        text,
        attachments: payload.attachments,
    }
}

/// Pick the text body and report where it came from.
fn select_text(payload: &MailgunPayload) -> (String, &'static str) {
    let non_empty = |value: &Option<String>| value.as_ref().filter(|s| !s.trim().is_empty()).cloned();

    if let Some(text) = non_empty(&payload.body_plain) {
        return (text, "body_plain");
    }
    if let Some(text) = non_empty(&payload.stripped_text) {
        return (text, "stripped_text");
    }
    if let Some(html) = non_empty(&payload.body_html) {
        return (text_content(&html), "body_html");
    }

    (String::new(), "none")
}

/// Extract Message-Id from Mailgun's message-headers JSON string.
///
/// Mailgun provides headers as a JSON array of [name, value] pairs, e.g.:
/// `[["Message-Id", "<abc123@example.com>"], ["Subject", "Hello"], ...]`
fn extract_message_id_from_headers(message_headers: &Option<String>) -> Option<String> {
    let headers = message_headers.as_ref()?;

    if headers.is_empty() {
        return None;
    }

    let parsed: Result<Vec<Vec<String>>, _> = serde_json::from_str(headers);

    match parsed {
        Ok(header_pairs) => {
            let message_id = header_pairs
                .iter()
                .filter(|pair| pair.len() >= 2 && pair[0].eq_ignore_ascii_case("message-id"))
                .map(|pair| pair[1].trim().trim_matches(|c| c == '<' || c == '>').to_string())
                .find(|id| !id.is_empty());

            if message_id.is_none() {
                warn!("mailgun_no_message_id_in_headers");
            }
            message_id
        }
        Err(e) => {
            warn!(
                error = %e,
                headers_length = headers.len(),
                "mailgun_headers_parse_failed"
            );
            None
        }
    }
}

/// Generate a fallback Message-Id using SHA256 hash.
pub(crate) fn generate_fallback_id(subject: &str, recipient: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}", subject, recipient).as_bytes());
    let hash = hex::encode(hasher.finalize());

    info!(generated_id = %hash, "mailin_message_id_fallback");

    hash
}
