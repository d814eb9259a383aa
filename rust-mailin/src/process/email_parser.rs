//! RFC 5322 Email Parser using mailparse.
//!
//! This module provides functions to parse raw RFC 5322 email content
//! and extract the Message-Id, Subject, plain text body and attachments.
//! Used to process Cloudflare's raw_content field.

use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::html::text_content;
use crate::message::Attachment;

/// Parsed email result.
#[derive(Debug, Default)]
pub struct ParsedEmail {
    /// Message-Id header value (without angle brackets)
    pub message_id: Option<String>,
    /// Subject header value
    pub subject: Option<String>,
    /// Plain text body
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Parse raw RFC 5322 email content.
///
/// # Arguments
///
/// * `raw_content` - Raw email string (headers + body)
///
/// # Returns
///
/// A `ParsedEmail` containing the Message-Id, Subject, text body and
/// attachments.
pub fn parse_raw_email(raw_content: &str) -> Result<ParsedEmail> {
    info!(
        raw_content_length = raw_content.len(),
        "email_parse_start"
    );

    let mail = parse_mail(raw_content.as_bytes())?;

    let message_id = mail
        .headers
        .get_first_value("Message-Id")
        .map(|id| id.trim().trim_matches(|c| c == '<' || c == '>').to_string())
        .filter(|id| !id.is_empty());

    let subject = mail.headers.get_first_value("Subject");

    let mut parts = Parts::default();
    collect_parts(&mail, &mut parts);

    // Prefer a plain text part, fall back to the text of an HTML part
    let text = parts
        .plain
        .or_else(|| parts.html.map(|html| text_content(&html)));

    let result = ParsedEmail {
        message_id,
        subject,
        text,
        attachments: parts.attachments,
    };

    info!(
        message_id = ?result.message_id,
        subject = ?result.subject,
        has_text = result.text.is_some(),
        attachment_count = result.attachments.len(),
        "email_parse_complete"
    );

    Ok(result)
}

#[derive(Default)]
struct Parts {
    plain: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

/// Walk the MIME tree, keeping the first text/plain and text/html bodies
/// and every attachment.
fn collect_parts(mail: &ParsedMail, parts: &mut Parts) {
    let content_type = mail.ctype.mimetype.to_ascii_lowercase();

    if content_type.starts_with("multipart/") {
        for (index, part) in mail.subparts.iter().enumerate() {
            debug!(
                part_index = index,
                part_type = %part.ctype.mimetype,
                subparts_count = part.subparts.len(),
                "email_examining_part"
            );
            collect_parts(part, parts);
        }
        return;
    }

    if let Some(attachment) = extract_attachment(mail) {
        parts.attachments.push(attachment);
        return;
    }

    match content_type.as_str() {
        "text/plain" if parts.plain.is_none() => parts.plain = extract_body_text(mail),
        "text/html" if parts.html.is_none() => parts.html = extract_body_text(mail),
        _ => {}
    }
}

/// Build an attachment from a part with an attachment disposition.
fn extract_attachment(mail: &ParsedMail) -> Option<Attachment> {
    let disposition = mail.get_content_disposition();
    if !matches!(disposition.disposition, DispositionType::Attachment) {
        return None;
    }

    let filename = disposition
        .params
        .get("filename")
        .or_else(|| mail.ctype.params.get("name"))
        .cloned()
        .unwrap_or_else(|| "attachment".to_string());

    match mail.get_body_raw() {
        Ok(data) => Some(Attachment {
            filename,
            content_type: mail.ctype.mimetype.clone(),
            data,
        }),
        Err(e) => {
            warn!(error = %e, filename = %filename, "email_attachment_decode_failed");
            None
        }
    }
}

/// Extract the body text from a mail part.
fn extract_body_text(mail: &ParsedMail) -> Option<String> {
    match mail.get_body() {
        Ok(body) => {
            if body.trim().is_empty() {
                None
            } else {
                Some(body)
            }
        }
        Err(e) => {
            warn!(error = %e, "email_body_extraction_failed");
            None
        }
    }
}
