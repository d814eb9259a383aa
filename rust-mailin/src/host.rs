//! Collaborators provided by the host site.
//!
//! The mail-in core owns none of the site's data. Entity lookup, token
//! storage, permission checks and persistence are reached through these
//! traits, all of which are synchronous and must be shareable across
//! threads.

use crate::entity::{AccessId, Group, Guid, Target, User};
use crate::error::StoreError;
use crate::message::Attachment;
use crate::parser::FieldMap;

/// Looks up users and mail-in targets.
pub trait Directory: Send + Sync {
    /// Find the member owning an email address.
    fn user_by_email(&self, email: &str) -> Option<User>;

    fn user_by_username(&self, username: &str) -> Option<User>;

    /// Find the entity a recipient token was issued for.
    fn target_by_token(&self, token: &str) -> Option<Target>;

    /// Groups the user is a member of.
    fn groups_of(&self, user: &User) -> Vec<Group>;
}

/// Issues and stores notification tokens.
pub trait TokenStore: Send + Sync {
    /// Token bound to `target` for the given context, if one exists.
    fn notification_token(&self, target: &Target, context: &str) -> Option<String>;
}

/// Permission checks and persistence for created content.
pub trait ContentStore: Send + Sync {
    /// Can `user` create content of `subtype` inside `container`?
    fn can_write_to_container(&self, container: &Target, user: &User, subtype: &str) -> bool;

    /// Persist a new content object and return its guid.
    fn save(&self, content: NewContent) -> Result<Guid, StoreError>;

    /// Store email attachments as file entities.
    fn store_attachments(
        &self,
        attachments: &[Attachment],
        attributes: &FileAttributes,
    ) -> Result<Vec<Guid>, StoreError>;

    /// Link stored files to a content object.
    fn attach(&self, parent: Guid, files: &[Guid]) -> Result<(), StoreError>;

    /// Add an item to the activity stream.
    fn record_activity(&self, item: ActivityItem);
}

/// Everything the mail-in service needs from the host.
pub trait Host: Directory + TokenStore + ContentStore {
    fn as_content_store(&self) -> &dyn ContentStore;
}

impl<T> Host for T
where
    T: Directory + TokenStore + ContentStore,
{
    fn as_content_store(&self) -> &dyn ContentStore {
        self
    }
}

/// A content object about to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub access_id: AccessId,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub origin: String,
}

/// Attributes given to files created from attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: AccessId,
    pub origin: Vec<String>,
    /// Parsed fields applied to every file, when the files are the content
    pub fields: Option<FieldMap>,
}

/// An activity stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityItem {
    pub view: String,
    pub action_type: String,
    pub subject_guid: Guid,
    pub object_guid: Guid,
    pub target_guid: Option<Guid>,
}

impl ActivityItem {
    /// A "create" entry for an object of the given subtype.
    pub fn created(subtype: &str, subject_guid: Guid, object_guid: Guid) -> Self {
        Self {
            view: format!("river/object/{}/create", subtype),
            action_type: "create".to_string(),
            subject_guid,
            object_guid,
            target_guid: None,
        }
    }

    pub fn with_target(mut self, target_guid: Guid) -> Self {
        self.target_guid = Some(target_guid);
        self
    }
}
