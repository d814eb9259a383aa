//! Error types for the mail-in crate.
//!
//! Dispatch itself never fails: a message that cannot be turned into content
//! simply does not terminate processing. These errors cover the surrounding
//! plumbing: raw MIME parsing and host storage.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse email: {0}")]
    Parse(#[from] mailparse::MailParseError),
}

/// Errors reported by the host's content store.
///
/// Handlers log these and decline the message.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity could not be saved: {0}")]
    SaveFailed(String),

    #[error("Attachment could not be stored: {0}")]
    AttachmentFailed(String),

    #[error("Entity {0} not found")]
    NotFound(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
