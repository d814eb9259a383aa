//! Mail-in dispatch.
//!
//! ## Processing Flow
//!
//! ```text
//! InboundMessage → token check → for each registered type (in order):
//!     subject match → body parse → handler → first success terminates
//! ```
//!
//! Every failure path is "not applicable": nothing is raised, the message
//! just does not terminate processing.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Capabilities;
use crate::entity::{Target, User};
use crate::handlers::{self, HandlerContext};
use crate::host::Host;
use crate::message::InboundMessage;
use crate::parser::{self, FieldMap};
use crate::registry::{TypeDescriptor, TypeExtension, TypeHandler, TypeRegistry};
use crate::token;

/// Token context for mail-in addresses.
pub const MAILIN_CONTEXT: &str = "mailin";

/// Why a message did not produce content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingTarget,
    MissingSender,
    TokenMismatch,
    NoMatchingType,
    NoHandlerSucceeded,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::MissingTarget => "missing_target",
            SkipReason::MissingSender => "missing_sender",
            SkipReason::TokenMismatch => "token_mismatch",
            SkipReason::NoMatchingType => "no_matching_type",
            SkipReason::NoHandlerSucceeded => "no_handler_succeeded",
        }
    }
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A handler created content; no other handler should run
    Created { content_type: String },
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Outcome::Created { .. })
    }
}

/// Token context for a target: personal and object addresses share one
/// token, group addresses get one per member.
pub fn token_context(target: &Target, sender: &User) -> String {
    match target {
        Target::Group(_) => format!("{}:{}", MAILIN_CONTEXT, sender.guid),
        _ => MAILIN_CONTEXT.to_string(),
    }
}

/// The mail-in service.
pub struct Mailin {
    capabilities: Capabilities,
    host: Arc<dyn Host>,
    extensions: Vec<Arc<dyn TypeExtension>>,
}

impl Mailin {
    pub fn new(capabilities: Capabilities, host: Arc<dyn Host>) -> Self {
        Self {
            capabilities,
            host,
            extensions: Vec::new(),
        }
    }

    /// Add a registry extension. Extensions run in the order added.
    pub fn with_extension(mut self, extension: Arc<dyn TypeExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Content types currently offered, in match order.
    pub fn get_types(&self) -> TypeRegistry {
        TypeRegistry::build(&self.capabilities, &self.extensions)
    }

    /// Process a message. Returns `true` when content was created and the
    /// inbound-mail event should not be handled any further.
    pub fn receive(&self, message: &InboundMessage) -> bool {
        self.process(message).is_terminated()
    }

    /// Process a message and report what happened.
    pub fn process(&self, message: &InboundMessage) -> Outcome {
        let message_id = message.message_id();

        let Some(target) = message.target() else {
            return skipped(message_id, SkipReason::MissingTarget);
        };
        let Some(sender) = message.sender() else {
            return skipped(message_id, SkipReason::MissingSender);
        };

        // Check that the recipient token belongs to the sender
        let context = token_context(target, sender);
        let expected = self
            .host
            .notification_token(target, &context)
            .filter(|t| !t.is_empty());
        let provided = message.recipient_token().unwrap_or("");

        let authorized = match expected {
            Some(expected) => token::tokens_equal(&expected, provided),
            None => false,
        };

        if !authorized {
            warn!(
                message_id = %message_id,
                target_guid = target.guid(),
                sender_guid = sender.guid,
                context = %context,
                "mailin_token_mismatch"
            );
            return Outcome::Skipped(SkipReason::TokenMismatch);
        }

        let types = self.get_types();
        let mut matched = false;

        for descriptor in &types {
            let Some(fields) = parser::parse(message.subject(), message.text(), descriptor) else {
                continue;
            };
            matched = true;

            info!(
                message_id = %message_id,
                content_type = %descriptor.name(),
                fields = ?fields.keys().collect::<Vec<_>>(),
                "mailin_type_matched"
            );

            if self.invoke(descriptor, message, &fields) {
                info!(
                    message_id = %message_id,
                    content_type = %descriptor.name(),
                    "mailin_message_handled"
                );
                return Outcome::Created {
                    content_type: descriptor.name().to_string(),
                };
            }

            info!(
                message_id = %message_id,
                content_type = %descriptor.name(),
                "mailin_handler_declined"
            );
        }

        let reason = if matched {
            SkipReason::NoHandlerSucceeded
        } else {
            SkipReason::NoMatchingType
        };
        skipped(message_id, reason)
    }

    fn invoke(&self, descriptor: &TypeDescriptor, message: &InboundMessage, fields: &FieldMap) -> bool {
        match descriptor.handler() {
            TypeHandler::Builtin(kind) => {
                let ctx = HandlerContext {
                    capabilities: &self.capabilities,
                    store: self.host.as_content_store(),
                };
                handlers::handle(*kind, ctx, message, fields)
            }
            TypeHandler::Custom(handler) => {
                // A failing extension handler only rules out its own type
                match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message, fields))) {
                    Ok(handled) => handled,
                    Err(_) => {
                        warn!(
                            message_id = %message.message_id(),
                            content_type = %descriptor.name(),
                            "mailin_handler_panicked"
                        );
                        false
                    }
                }
            }
        }
    }
}

fn skipped(message_id: &str, reason: SkipReason) -> Outcome {
    debug!(
        message_id = %message_id,
        reason = reason.as_str(),
        "mailin_message_skipped"
    );
    Outcome::Skipped(reason)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::ContentHandler;
    use crate::testing::{sample_group, sample_user, MemoryHost};

    const TOKEN: &str = "s3cr3t-token";

    fn personal_host() -> MemoryHost {
        MemoryHost::new().with_token(Target::User(sample_user()), "mailin", TOKEN)
    }

    fn personal_message(subject: &str, body: &str, token: &str) -> InboundMessage {
        InboundMessage::new("msg-1", subject, body)
            .with_sender(Some(sample_user()))
            .with_target(Some(Target::User(sample_user())))
            .with_recipient_token(Some(token.to_string()))
    }

    fn counting_handler(result: bool, calls: Arc<AtomicUsize>) -> Arc<dyn ContentHandler> {
        Arc::new(move |_: &InboundMessage, _: &FieldMap| {
            calls.fetch_add(1, Ordering::SeqCst);
            result
        })
    }

    #[test]
    fn test_receive_creates_blog() {
        let host = Arc::new(personal_host());
        let mailin = Mailin::new(Capabilities::default(), host.clone());
        let message = personal_message(
            "BLOG: Tech Talk",
            "DESCRIPTION: This is great.\nTAGS: foo, bar",
            TOKEN,
        );

        assert_eq!(
            mailin.process(&message),
            Outcome::Created {
                content_type: "blog".to_string()
            }
        );

        let saved = host.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Tech Talk");
        assert_eq!(saved[0].description, "<p>This is great.</p>");
        assert_eq!(saved[0].tags, vec!["foo", "bar"]);
    }

    #[test]
    fn test_receive_token_mismatch() {
        let host = Arc::new(personal_host());
        let mailin = Mailin::new(Capabilities::default(), host.clone());
        let message = personal_message("BLOG: Tech Talk", "DESCRIPTION: x", "wrong-token!");

        assert!(!mailin.receive(&message));
        assert_eq!(
            mailin.process(&message),
            Outcome::Skipped(SkipReason::TokenMismatch)
        );
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_receive_missing_token() {
        let mailin = Mailin::new(Capabilities::default(), Arc::new(personal_host()));
        let message = personal_message("BLOG: x", "", TOKEN).with_recipient_token(None);

        assert!(!mailin.receive(&message));
    }

    #[test]
    fn test_receive_empty_expected_token_never_matches() {
        let host = MemoryHost::new().with_token(Target::User(sample_user()), "mailin", "");
        let mailin = Mailin::new(Capabilities::default(), Arc::new(host));
        let message = personal_message("BLOG: x", "", "");

        assert_eq!(
            mailin.process(&message),
            Outcome::Skipped(SkipReason::TokenMismatch)
        );
    }

    #[test]
    fn test_receive_missing_sender_or_target() {
        let mailin = Mailin::new(Capabilities::default(), Arc::new(personal_host()));

        let no_sender = personal_message("BLOG: x", "", TOKEN).with_sender(None);
        assert_eq!(
            mailin.process(&no_sender),
            Outcome::Skipped(SkipReason::MissingSender)
        );

        let no_target = personal_message("BLOG: x", "", TOKEN).with_target(None);
        assert_eq!(
            mailin.process(&no_target),
            Outcome::Skipped(SkipReason::MissingTarget)
        );
    }

    #[test]
    fn test_receive_group_token_scoped_to_sender() {
        let group = Target::Group(sample_group());
        let sender = sample_user();

        // Token issued for the group without the member scope
        let host = MemoryHost::new().with_token(group.clone(), "mailin", TOKEN);
        let mailin = Mailin::new(Capabilities::default(), Arc::new(host));
        let message = InboundMessage::new("m", "DISCUSSION: Agenda", "")
            .with_sender(Some(sender.clone()))
            .with_target(Some(group.clone()))
            .with_recipient_token(Some(TOKEN.to_string()));
        assert!(!mailin.receive(&message));

        let host = Arc::new(MemoryHost::new().with_token(group, "mailin:10", TOKEN));
        let mailin = Mailin::new(Capabilities::default(), host.clone());
        assert!(mailin.receive(&message));
        assert_eq!(host.saved()[0].subtype, "discussion");
    }

    #[test]
    fn test_receive_no_matching_type() {
        let mailin = Mailin::new(Capabilities::default(), Arc::new(personal_host()));
        let message = personal_message("Hello there", "DESCRIPTION: x", TOKEN);

        assert_eq!(
            mailin.process(&message),
            Outcome::Skipped(SkipReason::NoMatchingType)
        );
    }

    #[test]
    fn test_receive_disabled_type_not_matched() {
        let mailin = Mailin::new(Capabilities::from_names(["file"]), Arc::new(personal_host()));
        let message = personal_message("BLOG: x", "", TOKEN);

        assert_eq!(
            mailin.process(&message),
            Outcome::Skipped(SkipReason::NoMatchingType)
        );
    }

    #[test]
    fn test_receive_falls_through_to_next_matching_type() {
        // Writes denied, so the built-in blog handler declines; "log" also
        // matches "BLOG:" and handles the message.
        let host = Arc::new(personal_host().deny_writes());
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(true, calls.clone());
        let extension: Arc<dyn TypeExtension> = Arc::new(move |types: &mut TypeRegistry| {
            types.register(TypeDescriptor::custom("log", ["tags"], handler.clone()));
        });

        let mailin = Mailin::new(Capabilities::default(), host.clone()).with_extension(extension);
        let message = personal_message("BLOG: Entry", "TAGS: a", TOKEN);

        assert_eq!(
            mailin.process(&message),
            Outcome::Created {
                content_type: "log".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(host.saved().is_empty());
    }

    #[test]
    fn test_receive_stops_at_first_success() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let first = counting_handler(true, first_calls.clone());
        let second = counting_handler(true, second_calls.clone());

        let extension: Arc<dyn TypeExtension> = Arc::new(move |types: &mut TypeRegistry| {
            types.register(TypeDescriptor::custom("note", Vec::<String>::new(), first.clone()));
            types.register(TypeDescriptor::custom("ote", Vec::<String>::new(), second.clone()));
        });

        let mailin =
            Mailin::new(Capabilities::none(), Arc::new(personal_host())).with_extension(extension);

        assert!(mailin.receive(&personal_message("NOTE: hi", "", TOKEN)));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_receive_all_handlers_decline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(false, calls.clone());
        let extension: Arc<dyn TypeExtension> = Arc::new(move |types: &mut TypeRegistry| {
            types.register(TypeDescriptor::custom("note", ["tags"], handler.clone()));
        });

        let mailin =
            Mailin::new(Capabilities::none(), Arc::new(personal_host())).with_extension(extension);

        assert_eq!(
            mailin.process(&personal_message("NOTE: hi", "", TOKEN)),
            Outcome::Skipped(SkipReason::NoHandlerSucceeded)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receive_panicking_handler_treated_as_decline() {
        let panicking: Arc<dyn ContentHandler> =
            Arc::new(|_: &InboundMessage, _: &FieldMap| -> bool { panic!("handler bug") });
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback = counting_handler(true, calls.clone());

        let extension: Arc<dyn TypeExtension> = Arc::new(move |types: &mut TypeRegistry| {
            types.register(TypeDescriptor::custom("note", Vec::<String>::new(), panicking.clone()));
            types.register(TypeDescriptor::custom("ote", Vec::<String>::new(), fallback.clone()));
        });

        let mailin =
            Mailin::new(Capabilities::none(), Arc::new(personal_host())).with_extension(extension);

        assert!(mailin.receive(&personal_message("NOTE: hi", "", TOKEN)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_types_follows_capabilities() {
        let mut mailin = Mailin::new(Capabilities::default(), Arc::new(personal_host()));
        assert_eq!(mailin.get_types().len(), 4);

        mailin.set_capabilities(Capabilities::from_names(["bookmarks"]));
        let names: Vec<String> = mailin.get_types().names().map(str::to_string).collect();
        assert_eq!(names, vec!["bookmark"]);
    }

    #[test]
    fn test_custom_handler_receives_parsed_fields() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_handler = seen.clone();
        let handler: Arc<dyn ContentHandler> =
            Arc::new(move |_: &InboundMessage, fields: &FieldMap| {
                *seen_in_handler.lock().unwrap() = Some(fields.clone());
                true
            });
        let extension: Arc<dyn TypeExtension> = Arc::new(move |types: &mut TypeRegistry| {
            types.register(TypeDescriptor::custom("event", ["date", "venue"], handler.clone()));
        });

        let mailin =
            Mailin::new(Capabilities::none(), Arc::new(personal_host())).with_extension(extension);
        let message = personal_message(
            "EVENT: Meetup",
            "DATE: August 18\nVENUE: Library\nDESCRIPTION: ignored",
            TOKEN,
        );

        assert!(mailin.receive(&message));

        let fields = seen.lock().unwrap().clone().unwrap();
        assert_eq!(fields.title(), "Meetup");
        assert_eq!(fields.get("date"), Some("August 18"));
        assert_eq!(fields.get("venue"), Some("Library"));
        assert!(!fields.contains("description"));
    }
}
