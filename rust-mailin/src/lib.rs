//! Mailin - turn inbound email into site content.
//!
//! A member mails `BLOG: My title` with `DESCRIPTION:` and `TAGS:` lines in
//! the body to their personal (or a group's) mail-in address; the message
//! becomes a blog post, bookmark, file or discussion in that container.
//!
//! ## Architecture
//!
//! ```text
//! Mailgun / Cloudflare → web → process (RawMail) → resolve → Mailin::receive
//!     → token check → registry (match order) → parser → handler → ContentStore
//! ```
//!
//! The host site plugs in through the traits in [`host`].

pub mod address;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod host;
pub mod html;
pub mod message;
pub mod parser;
pub mod process;
pub mod registry;
pub mod token;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Capabilities, Config};
pub use dispatch::{Mailin, Outcome, SkipReason};
pub use entity::{Group, Target, User};
pub use error::{Error, Result, StoreError};
pub use host::{ContentStore, Directory, Host, TokenStore};
pub use message::{Attachment, InboundMessage};
pub use parser::FieldMap;
pub use registry::{ContentHandler, ContentKind, TypeDescriptor, TypeExtension, TypeRegistry};
pub use web::AppState;
