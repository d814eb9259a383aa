//! Built-in content handlers.
//!
//! Each handler turns parsed fields into a content object and returns
//! `true` once it is saved. Returning `false` means "this type does not
//! apply": the dispatcher then tries the next matching type.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::config::Capabilities;
use crate::entity::{Guid, Target, User};
use crate::host::{ActivityItem, ContentStore, FileAttributes, NewContent};
use crate::html::text_content;
use crate::message::InboundMessage;
use crate::parser::FieldMap;
use crate::registry::ContentKind;

/// Origin recorded on everything created from email.
pub const CONTENT_ORIGIN: &str = "mailgun";

/// Length of a generated blog excerpt, in characters.
pub const EXCERPT_LENGTH: usize = 137;

static ADDRESS_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^((ht|f)tps?:)?//").expect("Invalid address scheme pattern"));

/// What the built-in handlers need from the host.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub capabilities: &'a Capabilities,
    pub store: &'a dyn ContentStore,
}

/// Run the built-in handler for `kind`.
pub fn handle(
    kind: ContentKind,
    ctx: HandlerContext<'_>,
    message: &InboundMessage,
    fields: &FieldMap,
) -> bool {
    match kind {
        ContentKind::Blog => create_blog(ctx, message, fields),
        ContentKind::Bookmark => create_bookmark(ctx, message, fields),
        ContentKind::File => create_file(ctx, message, fields),
        ContentKind::Discussion => create_discussion(ctx, message, fields),
    }
}

/// Create a published blog post.
pub fn create_blog(ctx: HandlerContext<'_>, message: &InboundMessage, fields: &FieldMap) -> bool {
    if !ctx.capabilities.is_enabled(Capabilities::BLOG) {
        return false;
    }

    let subtype = ContentKind::Blog.subtype();
    let Some((sender, target)) = authorize(ctx, message, subtype) else {
        return false;
    };

    let description = autop(fields.get_or_empty("description"));
    let excerpt = match fields.get("excerpt").filter(|e| !e.is_empty()) {
        Some(excerpt) => excerpt.to_string(),
        None => excerpt(&description, EXCERPT_LENGTH),
    };

    let content = NewContent {
        subtype: subtype.to_string(),
        owner_guid: sender.guid,
        container_guid: target.guid(),
        title: escape_title(fields.title()),
        description,
        tags: tag_list(fields.get_or_empty("tags")),
        access_id: target.content_access_id(),
        excerpt: Some(excerpt),
        status: Some("published".to_string()),
        address: None,
        origin: CONTENT_ORIGIN.to_string(),
    };

    publish(ctx, message, sender, content, None).is_some()
}

/// Create a bookmark. Requires a title and a valid address.
pub fn create_bookmark(
    ctx: HandlerContext<'_>,
    message: &InboundMessage,
    fields: &FieldMap,
) -> bool {
    if !ctx.capabilities.is_enabled(Capabilities::BOOKMARKS) {
        return false;
    }

    let subtype = ContentKind::Bookmark.subtype();
    let Some((sender, target)) = authorize(ctx, message, subtype) else {
        return false;
    };

    let title = escape_title(fields.title());
    let address = normalize_address(fields.get_or_empty("address"));

    if title.is_empty() || address.is_empty() || !is_valid_url(&address) {
        info!(
            message_id = %message.message_id(),
            has_title = !title.is_empty(),
            address = %address,
            "mailin_bookmark_invalid"
        );
        return false;
    }

    let content = NewContent {
        subtype: subtype.to_string(),
        owner_guid: sender.guid,
        container_guid: target.guid(),
        title,
        description: autop(fields.get_or_empty("description")),
        tags: tag_list(fields.get_or_empty("tags")),
        access_id: target.content_access_id(),
        excerpt: None,
        status: None,
        address: Some(address),
        origin: CONTENT_ORIGIN.to_string(),
    };

    publish(ctx, message, sender, content, None).is_some()
}

/// Store every attachment of the message as a file.
///
/// Parsed fields are applied to each file. The message counts as handled
/// even when it carries no attachments.
pub fn create_file(ctx: HandlerContext<'_>, message: &InboundMessage, fields: &FieldMap) -> bool {
    let subtype = ContentKind::File.subtype();
    let Some((sender, target)) = authorize(ctx, message, subtype) else {
        return false;
    };

    let attributes = FileAttributes {
        subtype: subtype.to_string(),
        owner_guid: sender.guid,
        container_guid: target.guid(),
        access_id: target.content_access_id(),
        origin: attachment_origin(),
        fields: Some(fields.clone()),
    };

    let files = match ctx.store.store_attachments(message.attachments(), &attributes) {
        Ok(files) => files,
        Err(e) => {
            warn!(
                message_id = %message.message_id(),
                error = %e,
                "mailin_file_store_failed"
            );
            return false;
        }
    };

    for file in &files {
        ctx.store
            .record_activity(ActivityItem::created(subtype, sender.guid, *file));
    }

    info!(
        message_id = %message.message_id(),
        file_count = files.len(),
        container_guid = target.guid(),
        "mailin_file_created"
    );

    true
}

/// Start a discussion in a group.
pub fn create_discussion(
    ctx: HandlerContext<'_>,
    message: &InboundMessage,
    fields: &FieldMap,
) -> bool {
    if !ctx.capabilities.is_enabled(Capabilities::DISCUSSIONS) {
        return false;
    }

    // Discussions only live in groups
    let Some(group) = message.target().and_then(Target::as_group) else {
        return false;
    };

    let subtype = ContentKind::Discussion.subtype();
    let Some((sender, target)) = authorize(ctx, message, subtype) else {
        return false;
    };

    let content = NewContent {
        subtype: subtype.to_string(),
        owner_guid: sender.guid,
        container_guid: group.guid,
        title: escape_title(fields.title()),
        description: autop(fields.get_or_empty("description")),
        tags: tag_list(fields.get_or_empty("tags")),
        access_id: group.acl,
        excerpt: None,
        status: Some("open".to_string()),
        address: None,
        origin: CONTENT_ORIGIN.to_string(),
    };

    match publish(ctx, message, sender, content, Some(target.guid())) {
        Some(guid) => {
            info!(
                guid = guid,
                group_guid = group.guid,
                group_name = %group.display_name,
                "mailin_discussion_in_group"
            );
            true
        }
        None => false,
    }
}

/// Check sender, target and write permission.
fn authorize<'m>(
    ctx: HandlerContext<'_>,
    message: &'m InboundMessage,
    subtype: &str,
) -> Option<(&'m User, &'m Target)> {
    let sender = message.sender()?;
    let target = message.target()?;

    if !ctx.store.can_write_to_container(target, sender, subtype) {
        info!(
            message_id = %message.message_id(),
            sender_guid = sender.guid,
            container_guid = target.guid(),
            subtype = subtype,
            "mailin_write_denied"
        );
        return None;
    }

    Some((sender, target))
}

/// Save content, attach message files and record the activity item.
fn publish(
    ctx: HandlerContext<'_>,
    message: &InboundMessage,
    sender: &User,
    content: NewContent,
    activity_target: Option<Guid>,
) -> Option<Guid> {
    let subtype = content.subtype.clone();
    let container_guid = content.container_guid;
    let access_id = content.access_id;

    let guid = match ctx.store.save(content) {
        Ok(guid) => guid,
        Err(e) => {
            warn!(
                message_id = %message.message_id(),
                subtype = %subtype,
                error = %e,
                "mailin_save_failed"
            );
            return None;
        }
    };

    if ctx.capabilities.is_enabled(Capabilities::ATTACHMENTS) && !message.attachments().is_empty() {
        let attributes = FileAttributes {
            subtype: ContentKind::File.subtype().to_string(),
            owner_guid: sender.guid,
            container_guid,
            access_id,
            origin: attachment_origin(),
            fields: None,
        };

        let attached = ctx
            .store
            .store_attachments(message.attachments(), &attributes)
            .and_then(|files| ctx.store.attach(guid, &files));

        if let Err(e) = attached {
            warn!(
                message_id = %message.message_id(),
                guid = guid,
                error = %e,
                "mailin_attachments_failed"
            );
        }
    }

    let mut activity = ActivityItem::created(&subtype, sender.guid, guid);
    if let Some(target_guid) = activity_target {
        activity = activity.with_target(target_guid);
    }
    ctx.store.record_activity(activity);

    info!(
        message_id = %message.message_id(),
        subtype = %subtype,
        guid = guid,
        "mailin_content_created"
    );

    Some(guid)
}

fn attachment_origin() -> Vec<String> {
    vec![CONTENT_ORIGIN.to_string(), "attachments".to_string()]
}

/// Escape HTML special characters in a title.
pub fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Wrap plain text in paragraphs.
///
/// Blank lines separate paragraphs, single line breaks become `<br />`.
pub fn autop(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(format!("<p>{}</p>", current.join("<br />\n")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(format!("<p>{}</p>", current.join("<br />\n")));
    }

    paragraphs.join("\n")
}

/// Plain-text excerpt of at most `limit` characters, cut at a word boundary.
pub fn excerpt(html: &str, limit: usize) -> String {
    let text = text_content(html).replace('\n', " ");
    let text = text.trim();

    if text.chars().count() <= limit {
        return text.to_string();
    }

    let cut: String = text.chars().take(limit).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > 0 => &cut[..space],
        _ => cut.as_str(),
    };

    format!("{}...", cut)
}

/// Split a comma-separated tag string.
pub fn tag_list(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remove line breaks and spaces and default the scheme to `http://`.
pub fn normalize_address(address: &str) -> String {
    let address: String = address
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | ' '))
        .collect();

    if !address.is_empty() && !ADDRESS_SCHEME.is_match(&address) {
        return format!("http://{}", address);
    }

    address
}

/// Is the address an absolute URL with a host?
pub fn is_valid_url(address: &str) -> bool {
    match Url::parse(address) {
        Ok(url) => url.host_str().map(|h| !h.is_empty()).unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ContainerObject, Group, ACCESS_LOGGED_IN};
    use crate::message::Attachment;
    use crate::testing::{sample_group, sample_user, MemoryHost};

    fn ctx<'a>(capabilities: &'a Capabilities, host: &'a MemoryHost) -> HandlerContext<'a> {
        HandlerContext {
            capabilities,
            store: host,
        }
    }

    fn message_to(target: Target) -> InboundMessage {
        InboundMessage::new("msg-1", "subject", "body")
            .with_sender(Some(sample_user()))
            .with_target(Some(target))
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        let mut map = FieldMap::with_title(pairs[0].1);
        for (k, v) in &pairs[1..] {
            map.insert(*k, *v);
        }
        map
    }

    #[test]
    fn test_create_blog_personal() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));
        let fields = fields(&[
            ("title", "Tech <Talk>"),
            ("description", "First para\n\nSecond"),
            ("tags", "rust, email,,"),
        ]);

        assert!(create_blog(ctx(&caps, &host), &message, &fields));

        let saved = host.saved();
        assert_eq!(saved.len(), 1);
        let blog = &saved[0];
        assert_eq!(blog.subtype, "blog");
        assert_eq!(blog.title, "Tech &lt;Talk&gt;");
        assert_eq!(blog.description, "<p>First para</p>\n<p>Second</p>");
        assert_eq!(blog.tags, vec!["rust", "email"]);
        assert_eq!(blog.access_id, ACCESS_LOGGED_IN);
        assert_eq!(blog.status.as_deref(), Some("published"));
        assert_eq!(blog.excerpt.as_deref(), Some("First para Second"));
        assert_eq!(blog.origin, "mailgun");

        let activity = host.activity();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].view, "river/object/blog/create");
    }

    #[test]
    fn test_create_blog_explicit_excerpt_and_group_access() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::Group(sample_group()));
        let fields = fields(&[("title", "T"), ("excerpt", "Short")]);

        assert!(create_blog(ctx(&caps, &host), &message, &fields));

        let blog = &host.saved()[0];
        assert_eq!(blog.excerpt.as_deref(), Some("Short"));
        assert_eq!(blog.access_id, sample_group().acl);
        assert_eq!(blog.container_guid, sample_group().guid);
    }

    #[test]
    fn test_create_blog_capability_disabled() {
        let host = MemoryHost::new();
        let caps = Capabilities::from_names(["file"]);
        let message = message_to(Target::User(sample_user()));

        assert!(!create_blog(ctx(&caps, &host), &message, &fields(&[("title", "T")])));
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_create_blog_write_denied() {
        let host = MemoryHost::new().deny_writes();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));

        assert!(!create_blog(ctx(&caps, &host), &message, &fields(&[("title", "T")])));
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_create_blog_save_failure() {
        let host = MemoryHost::new().fail_saves();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));

        assert!(!create_blog(ctx(&caps, &host), &message, &fields(&[("title", "T")])));
        assert!(host.activity().is_empty());
    }

    #[test]
    fn test_create_blog_attachments_when_enabled() {
        let host = MemoryHost::new();
        let mut caps = Capabilities::default();
        caps.enable(Capabilities::ATTACHMENTS);
        let message = message_to(Target::User(sample_user())).with_attachments(vec![Attachment {
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: b"hello".to_vec(),
        }]);

        assert!(create_blog(ctx(&caps, &host), &message, &fields(&[("title", "T")])));

        let stored = host.stored_files();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.origin, vec!["mailgun", "attachments"]);
        assert_eq!(host.attached().len(), 1);
    }

    #[test]
    fn test_create_bookmark_normalizes_address() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));
        let fields = fields(&[("title", "Rust"), ("address", "www.rust-\nlang.org/learn ")]);

        assert!(create_bookmark(ctx(&caps, &host), &message, &fields));

        let bookmark = &host.saved()[0];
        assert_eq!(bookmark.subtype, "bookmarks");
        assert_eq!(
            bookmark.address.as_deref(),
            Some("http://www.rust-lang.org/learn")
        );
        assert_eq!(host.activity()[0].view, "river/object/bookmarks/create");
    }

    #[test]
    fn test_create_bookmark_requires_title_and_address() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));

        assert!(!create_bookmark(
            ctx(&caps, &host),
            &message,
            &fields(&[("title", ""), ("address", "example.com")])
        ));
        assert!(!create_bookmark(
            ctx(&caps, &host),
            &message,
            &fields(&[("title", "No address")])
        ));
        assert!(!create_bookmark(
            ctx(&caps, &host),
            &message,
            &fields(&[("title", "Bad"), ("address", "//")])
        ));
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_create_file_stores_attachments_with_fields() {
        let host = MemoryHost::new();
        // File does not depend on the capability flag
        let caps = Capabilities::none();
        let message = message_to(Target::Object(ContainerObject {
            guid: 40,
            display_name: "Docs".to_string(),
            access_id: 2,
        }))
        .with_attachments(vec![
            Attachment {
                filename: "a.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: vec![1, 2, 3],
            },
            Attachment {
                filename: "b.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: vec![4],
            },
        ]);
        let fields = fields(&[("title", "Slides"), ("tags", "talks")]);

        assert!(create_file(ctx(&caps, &host), &message, &fields));

        let stored = host.stored_files();
        assert_eq!(stored.len(), 2);
        let attrs = &stored[0].1;
        assert_eq!(attrs.access_id, 2);
        assert_eq!(attrs.container_guid, 40);
        assert_eq!(attrs.fields.as_ref().unwrap().title(), "Slides");
        assert_eq!(host.activity().len(), 2);
    }

    #[test]
    fn test_create_file_without_attachments_still_handled() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));

        assert!(create_file(ctx(&caps, &host), &message, &fields(&[("title", "")])));
        assert!(host.activity().is_empty());
    }

    #[test]
    fn test_create_discussion_requires_group() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let message = message_to(Target::User(sample_user()));

        assert!(!create_discussion(ctx(&caps, &host), &message, &fields(&[("title", "T")])));
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_create_discussion_in_group() {
        let host = MemoryHost::new();
        let caps = Capabilities::default();
        let group = Group {
            guid: 90,
            display_name: "Team".to_string(),
            acl: 12,
        };
        let message = message_to(Target::Group(group));

        assert!(create_discussion(
            ctx(&caps, &host),
            &message,
            &fields(&[("title", "Agenda"), ("description", "Items")])
        ));

        let discussion = &host.saved()[0];
        assert_eq!(discussion.status.as_deref(), Some("open"));
        assert_eq!(discussion.access_id, 12);
        assert_eq!(host.activity()[0].target_guid, Some(90));
    }

    #[test]
    fn test_escape_title() {
        assert_eq!(
            escape_title(r#"Tom & "Jerry's" <b>"#),
            "Tom &amp; &quot;Jerry&#039;s&quot; &lt;b&gt;"
        );
    }

    #[test]
    fn test_autop() {
        assert_eq!(autop(""), "");
        assert_eq!(autop("one\ntwo"), "<p>one<br />\ntwo</p>");
        assert_eq!(autop("a\r\n\r\n\r\nb"), "<p>a</p>\n<p>b</p>");
    }

    #[test]
    fn test_excerpt_cuts_at_word() {
        let text = "word ".repeat(40);
        let result = excerpt(&text, 12);
        assert_eq!(result, "word word...");

        assert_eq!(excerpt("<p>short</p>", 137), "short");
    }

    #[test]
    fn test_tag_list() {
        assert_eq!(tag_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(tag_list("").is_empty());
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("example.com"), "http://example.com");
        assert_eq!(normalize_address("HTTPS://example.com"), "HTTPS://example.com");
        assert_eq!(normalize_address("ftp://files.example.com"), "ftp://files.example.com");
        assert_eq!(normalize_address("//cdn.example.com"), "//cdn.example.com");
        assert_eq!(normalize_address(" \n"), "");
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("http://example.com/path?q=1"));
        assert!(!is_valid_url("//cdn.example.com"));
        assert!(!is_valid_url("http://"));
        assert!(!is_valid_url("mailto:someone@example.com"));
    }
}
