//! Registry of mail-in content types.
//!
//! The registry is an ordered mapping from type name to its
//! [`TypeDescriptor`]. Order is match precedence. It is rebuilt from
//! [`Capabilities`] on every dispatch, then handed to each registered
//! [`TypeExtension`] which may add, drop or reshape entries.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::Capabilities;
use crate::message::InboundMessage;
use crate::parser::FieldMap;

/// Built-in content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Blog,
    Bookmark,
    File,
    Discussion,
}

impl ContentKind {
    /// Registration order of the built-in types.
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Blog,
        ContentKind::Bookmark,
        ContentKind::File,
        ContentKind::Discussion,
    ];

    /// Name used in subject lines (uppercased) and as registry key.
    pub fn type_name(self) -> &'static str {
        match self {
            ContentKind::Blog => "blog",
            ContentKind::Bookmark => "bookmark",
            ContentKind::File => "file",
            ContentKind::Discussion => "discussion",
        }
    }

    /// Capability that must be enabled for the type to be offered.
    pub fn capability(self) -> &'static str {
        match self {
            ContentKind::Blog => Capabilities::BLOG,
            ContentKind::Bookmark => Capabilities::BOOKMARKS,
            ContentKind::File => Capabilities::FILE,
            ContentKind::Discussion => Capabilities::DISCUSSIONS,
        }
    }

    /// Entity subtype of created content.
    pub fn subtype(self) -> &'static str {
        match self {
            ContentKind::Blog => "blog",
            ContentKind::Bookmark => "bookmarks",
            ContentKind::File => "file",
            ContentKind::Discussion => "discussion",
        }
    }

    /// Body fields recognized for the type.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            ContentKind::Blog => &["excerpt", "description", "tags"],
            ContentKind::Bookmark => &["description", "address", "tags"],
            ContentKind::File => &["description", "tags"],
            ContentKind::Discussion => &["description", "tags"],
        }
    }
}

/// Creates content for a type registered by an extension.
pub trait ContentHandler: Send + Sync {
    /// Returns `true` once content has been created.
    fn handle(&self, message: &InboundMessage, fields: &FieldMap) -> bool;
}

impl<F> ContentHandler for F
where
    F: Fn(&InboundMessage, &FieldMap) -> bool + Send + Sync,
{
    fn handle(&self, message: &InboundMessage, fields: &FieldMap) -> bool {
        self(message, fields)
    }
}

/// Handler bound to a type descriptor.
#[derive(Clone)]
pub enum TypeHandler {
    Builtin(ContentKind),
    Custom(Arc<dyn ContentHandler>),
}

impl fmt::Debug for TypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHandler::Builtin(kind) => f.debug_tuple("Builtin").field(kind).finish(),
            TypeHandler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Field schema and handler for one content type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    fields: Vec<String>,
    handler: TypeHandler,
}

impl TypeDescriptor {
    /// Create a descriptor. Field names are lowercased and deduplicated,
    /// keeping first-seen order.
    pub fn new<I, S>(name: impl Into<String>, fields: I, handler: TypeHandler) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut descriptor = Self {
            name: name.into(),
            fields: Vec::new(),
            handler,
        };
        for field in fields {
            descriptor.add_field(field.as_ref());
        }
        descriptor
    }

    pub fn builtin(name: impl Into<String>, fields: &[&str], kind: ContentKind) -> Self {
        Self::new(name, fields.iter().copied(), TypeHandler::Builtin(kind))
    }

    pub fn custom<I, S>(name: impl Into<String>, fields: I, handler: Arc<dyn ContentHandler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(name, fields, TypeHandler::Custom(handler))
    }

    /// Descriptor of a built-in type with its default fields.
    pub fn for_kind(kind: ContentKind) -> Self {
        Self::builtin(kind.type_name(), kind.fields(), kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn handler(&self) -> &TypeHandler {
        &self.handler
    }

    /// Is `field` (lowercase) one of the recognized body fields?
    pub fn recognizes(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn add_field(&mut self, field: &str) {
        let field = field.trim().to_ascii_lowercase();
        if !field.is_empty() && !self.recognizes(&field) {
            self.fields.push(field);
        }
    }

    pub fn remove_field(&mut self, field: &str) {
        let field = field.to_ascii_lowercase();
        self.fields.retain(|f| *f != field);
    }

    pub fn set_handler(&mut self, handler: TypeHandler) {
        self.handler = handler;
    }
}

/// Adjusts the registry after the built-in types are registered.
pub trait TypeExtension: Send + Sync {
    fn extend(&self, types: &mut TypeRegistry);
}

impl<F> TypeExtension for F
where
    F: Fn(&mut TypeRegistry) + Send + Sync,
{
    fn extend(&self, types: &mut TypeRegistry) {
        self(types)
    }
}

/// Ordered mapping of type name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: Vec<TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in types whose capability is enabled, then run
    /// the extensions in order.
    pub fn build(capabilities: &Capabilities, extensions: &[Arc<dyn TypeExtension>]) -> Self {
        let mut registry = Self::new();

        for kind in ContentKind::ALL {
            if capabilities.is_enabled(kind.capability()) {
                registry.register(TypeDescriptor::for_kind(kind));
            } else {
                debug!(
                    content_type = kind.type_name(),
                    capability = kind.capability(),
                    "mailin_type_disabled"
                );
            }
        }

        for extension in extensions {
            extension.extend(&mut registry);
        }

        debug!(
            types = ?registry.names().collect::<Vec<_>>(),
            "mailin_types_built"
        );

        registry
    }

    /// Register a descriptor. A descriptor with an already registered name
    /// replaces the previous one and keeps its position.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        match self.entries.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.entries.push(descriptor),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<TypeDescriptor> {
        let index = self.entries.iter().position(|d| d.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDescriptor> {
        self.entries.iter_mut().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|d| d.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a TypeRegistry {
    type Item = &'a TypeDescriptor;
    type IntoIter = std::slice::Iter<'a, TypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
