//! In-memory host used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::entity::{Group, Guid, Target, User};
use crate::error::StoreError;
use crate::host::{ActivityItem, ContentStore, Directory, FileAttributes, NewContent, TokenStore};
use crate::message::Attachment;

pub fn sample_user() -> User {
    User {
        guid: 10,
        username: "jane".to_string(),
        display_name: "Jane Doe".to_string(),
        email: "jane@example.com".to_string(),
    }
}

pub fn sample_group() -> Group {
    Group {
        guid: 20,
        display_name: "Rustaceans".to_string(),
        acl: 55,
    }
}

pub struct MemoryHost {
    users: Vec<User>,
    targets: HashMap<String, Target>,
    tokens: HashMap<(Guid, String), String>,
    memberships: HashMap<Guid, Vec<Group>>,
    allow_writes: bool,
    fail_saves: bool,
    next_guid: AtomicU64,
    saved: Mutex<Vec<NewContent>>,
    stored_files: Mutex<Vec<(String, FileAttributes)>>,
    attached: Mutex<Vec<(Guid, Vec<Guid>)>>,
    activity: Mutex<Vec<ActivityItem>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            users: Vec::new(),
            targets: HashMap::new(),
            tokens: HashMap::new(),
            memberships: HashMap::new(),
            allow_writes: true,
            fail_saves: false,
            next_guid: AtomicU64::new(1000),
            saved: Mutex::new(Vec::new()),
            stored_files: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            activity: Mutex::new(Vec::new()),
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    /// Issue `token` for `target` in `context`; the token also resolves back
    /// to the target.
    pub fn with_token(mut self, target: Target, context: &str, token: &str) -> Self {
        self.tokens
            .insert((target.guid(), context.to_string()), token.to_string());
        self.targets.insert(token.to_string(), target);
        self
    }

    pub fn with_membership(mut self, user: &User, group: Group) -> Self {
        self.memberships.entry(user.guid).or_default().push(group);
        self
    }

    pub fn deny_writes(mut self) -> Self {
        self.allow_writes = false;
        self
    }

    pub fn fail_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn saved(&self) -> Vec<NewContent> {
        self.saved.lock().unwrap().clone()
    }

    pub fn stored_files(&self) -> Vec<(String, FileAttributes)> {
        self.stored_files.lock().unwrap().clone()
    }

    pub fn attached(&self) -> Vec<(Guid, Vec<Guid>)> {
        self.attached.lock().unwrap().clone()
    }

    pub fn activity(&self) -> Vec<ActivityItem> {
        self.activity.lock().unwrap().clone()
    }

    fn next_guid(&self) -> Guid {
        self.next_guid.fetch_add(1, Ordering::SeqCst)
    }
}

impl Directory for MemoryHost {
    fn user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    fn user_by_username(&self, username: &str) -> Option<User> {
        self.users.iter().find(|u| u.username == username).cloned()
    }

    fn target_by_token(&self, token: &str) -> Option<Target> {
        self.targets.get(token).cloned()
    }

    fn groups_of(&self, user: &User) -> Vec<Group> {
        self.memberships.get(&user.guid).cloned().unwrap_or_default()
    }
}

impl TokenStore for MemoryHost {
    fn notification_token(&self, target: &Target, context: &str) -> Option<String> {
        self.tokens
            .get(&(target.guid(), context.to_string()))
            .cloned()
    }
}

impl ContentStore for MemoryHost {
    fn can_write_to_container(&self, _container: &Target, _user: &User, _subtype: &str) -> bool {
        self.allow_writes
    }

    fn save(&self, content: NewContent) -> Result<Guid, StoreError> {
        if self.fail_saves {
            return Err(StoreError::SaveFailed("disk full".to_string()));
        }
        self.saved.lock().unwrap().push(content);
        Ok(self.next_guid())
    }

    fn store_attachments(
        &self,
        attachments: &[Attachment],
        attributes: &FileAttributes,
    ) -> Result<Vec<Guid>, StoreError> {
        let mut guids = Vec::new();
        let mut stored = self.stored_files.lock().unwrap();
        for attachment in attachments {
            stored.push((attachment.filename.clone(), attributes.clone()));
            guids.push(self.next_guid());
        }
        Ok(guids)
    }

    fn attach(&self, parent: Guid, files: &[Guid]) -> Result<(), StoreError> {
        self.attached.lock().unwrap().push((parent, files.to_vec()));
        Ok(())
    }

    fn record_activity(&self, item: ActivityItem) {
        self.activity.lock().unwrap().push(item);
    }
}
