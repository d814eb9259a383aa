//! Inbound payload processing module.
//!
//! This module turns provider webhook payloads into `InboundMessage`s for
//! the dispatcher.
//!
//! ## Processing Flow
//!
//! ```text
//! MailgunPayload    → process_mailgun()    ┐
//!                                          ├→ RawMail → resolve() → InboundMessage
//! CloudflarePayload → process_cloudflare() ┘
//! ```

pub mod cloudflare;
pub mod email_parser;
pub mod mailgun;
pub mod types;

use tracing::info;

use crate::address::{bare_address, recipient_token};
use crate::host::Directory;
use crate::message::InboundMessage;

pub use cloudflare::process_cloudflare;
pub use email_parser::{parse_raw_email, ParsedEmail};
pub use mailgun::process_mailgun;
pub use types::{CloudflarePayload, MailgunPayload, RawMail};

/// Resolve the sender and target of a raw mail against the directory.
///
/// The target is looked up by the recipient's plus-token; the sender by
/// the bare From address. Either may be absent, which the dispatcher
/// treats as "not applicable".
pub fn resolve<D>(mail: RawMail, directory: &D) -> InboundMessage
where
    D: Directory + ?Sized,
{
    let token = recipient_token(&mail.recipient);
    let target = token
        .as_deref()
        .and_then(|token| directory.target_by_token(token));
    let sender = directory.user_by_email(bare_address(&mail.sender));

    info!(
        message_id = %mail.message_id,
        has_token = token.is_some(),
        target_guid = ?target.as_ref().map(|t| t.guid()),
        sender_guid = ?sender.as_ref().map(|u| u.guid),
        attachment_count = mail.attachments.len(),
        "mailin_resolved"
    );

    InboundMessage::new(mail.message_id, mail.subject, mail.text)
        .with_sender(sender)
        .with_target(target)
        .with_recipient_token(token)
        .with_attachments(mail.attachments)
}
