//! Site entities a mail-in message can refer to.

use serde::{Deserialize, Serialize};

/// Entity identifier assigned by the host site.
pub type Guid = u64;

/// Access level identifier.
pub type AccessId = i64;

/// Access level visible to every logged-in user.
pub const ACCESS_LOGGED_IN: AccessId = 1;

/// A site member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub guid: Guid,
    pub username: String,
    pub display_name: String,
    pub email: String,
}

/// A group with its own access collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub guid: Guid,
    pub display_name: String,
    /// Access collection restricting content to group members
    pub acl: AccessId,
}

/// Any other container, e.g. a page content is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerObject {
    pub guid: Guid,
    pub display_name: String,
    pub access_id: AccessId,
}

/// The container a mail-in address posts into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    User(User),
    Group(Group),
    Object(ContainerObject),
}

impl Target {
    pub fn guid(&self) -> Guid {
        match self {
            Target::User(u) => u.guid,
            Target::Group(g) => g.guid,
            Target::Object(o) => o.guid,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Target::User(u) => &u.display_name,
            Target::Group(g) => &g.display_name,
            Target::Object(o) => &o.display_name,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Target::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Access level new content in this container gets.
    pub fn content_access_id(&self) -> AccessId {
        match self {
            Target::Group(g) => g.acl,
            Target::Object(o) => o.access_id,
            Target::User(_) => ACCESS_LOGGED_IN,
        }
    }
}
