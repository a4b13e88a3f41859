// Automod domain models - data structures for the spam detection core.
//
// These are pure domain types with no chat-platform dependencies.
// The host adapter converts platform events/actions to and from these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by the configuration/state stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the host effect ports.
///
/// `NotFound` is how the host reports "message already deleted" /
/// "actor no longer present"; callers treat it as a benign skip.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("target not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AutoModError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

// ============================================================================
// EVENTS AND CATEGORIES
// ============================================================================

/// One inbound unit of activity, delivered by the host per message.
/// Immutable once constructed; downstream stages only borrow it.
#[derive(Debug, Clone)]
pub struct Event {
    pub scope_id: u64,
    pub actor_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub created_at: DateTime<Utc>,
    pub has_attachment: bool,
    /// Raw user mentions plus raw role mentions, duplicates counted each time.
    pub mention_count: u32,
    pub content: String,
    /// Role ids held by the actor, used for ignore-list checks.
    pub actor_role_ids: Vec<u64>,
    /// Set by the host for moderators and above; such actors bypass all checks.
    pub is_from_privileged_actor: bool,
}

/// The five moderation checks. Dispatch over this is always an exhaustive
/// match - no string keys anywhere in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    MentionSpam,
    MessageSpam,
    AttachmentSpam,
    FilterInvites,
    FilterMessages,
}

impl Category {
    /// Which sliding window this category counts against, if any.
    /// Mention spam is per-message; the filters don't use windows at all.
    pub fn window_category(self) -> Option<WindowCategory> {
        match self {
            Category::MessageSpam => Some(WindowCategory::Message),
            Category::AttachmentSpam => Some(WindowCategory::Attachment),
            Category::MentionSpam | Category::FilterInvites | Category::FilterMessages => None,
        }
    }

    /// Default embed colour when no per-category colour is configured.
    pub fn default_colour(self) -> u32 {
        match self {
            Category::MentionSpam => 0xA8_4300,    // dark orange
            Category::MessageSpam => 0x99_2D22,    // dark red
            Category::AttachmentSpam => 0xE9_1E63, // magenta
            Category::FilterInvites => 0xAD_1457,  // dark magenta
            Category::FilterMessages => 0x9B_59B6, // purple
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::MentionSpam => write!(f, "mention_spam"),
            Category::MessageSpam => write!(f, "message_spam"),
            Category::AttachmentSpam => write!(f, "attachment_spam"),
            Category::FilterInvites => write!(f, "filter_invites"),
            Category::FilterMessages => write!(f, "filter_messages"),
        }
    }
}

/// The two categories that keep sliding windows of recent message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowCategory {
    Message,
    Attachment,
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Per-category settings for the three spam checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySettings {
    pub enabled: bool,
    /// 0 = unset. An unset limit soft-disables the category even when
    /// `enabled` is true, so a half-configured guild never triggers.
    pub limit: u32,
    pub mute_on_trigger: bool,
    pub log_colour: Option<u32>,
}

impl CategorySettings {
    /// `enabled` alone is not enough - the limit must be set too.
    pub fn is_armed(&self) -> bool {
        self.enabled && self.limit > 0
    }
}

/// Invite filter settings. The allow-list holds scope (guild) ids whose
/// invites are permitted; the current scope is always permitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InviteFilterSettings {
    pub enabled: bool,
    pub allow_list: Vec<u64>,
    pub log_colour: Option<u32>,
}

/// Message filter settings. Patterns are stored as raw regex strings and
/// evaluated in order; the first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageFilterSettings {
    pub enabled: bool,
    pub patterns: Vec<String>,
    pub log_colour: Option<u32>,
}

/// Actors, channels and roles exempt from every check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreSet {
    pub role_ids: Vec<u64>,
    pub channel_ids: Vec<u64>,
    pub actor_ids: Vec<u64>,
}

impl IgnoreSet {
    /// Checked once per event, before any category evaluation.
    pub fn covers(&self, event: &Event) -> bool {
        if self.actor_ids.contains(&event.actor_id) {
            return true;
        }
        if self.channel_ids.contains(&event.channel_id) {
            return true;
        }
        event
            .actor_role_ids
            .iter()
            .any(|role| self.role_ids.contains(role))
    }
}

/// All automod settings for one conversation scope (guild).
/// Loaded fresh for every event; the core never caches it longer than that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSettings {
    /// Channel id the log records go to. Unset means log delivery is skipped
    /// (and reported once per triggering event).
    pub log_destination: Option<u64>,
    /// Sliding window length for message/attachment spam, in seconds.
    pub window_duration_secs: u64,
    pub mention_spam: CategorySettings,
    pub message_spam: CategorySettings,
    pub attachment_spam: CategorySettings,
    pub filter_invites: InviteFilterSettings,
    pub filter_messages: MessageFilterSettings,
    pub ignored: IgnoreSet,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            log_destination: None,
            window_duration_secs: 5, // matches the stock automod duration
            mention_spam: CategorySettings::default(),
            message_spam: CategorySettings::default(),
            attachment_spam: CategorySettings::default(),
            filter_invites: InviteFilterSettings::default(),
            filter_messages: MessageFilterSettings::default(),
            ignored: IgnoreSet::default(),
        }
    }
}

impl ScopeSettings {
    /// Configured colour for a category, falling back to the default palette.
    pub fn category_colour(&self, category: Category) -> u32 {
        let configured = match category {
            Category::MentionSpam => self.mention_spam.log_colour,
            Category::MessageSpam => self.message_spam.log_colour,
            Category::AttachmentSpam => self.attachment_spam.log_colour,
            Category::FilterInvites => self.filter_invites.log_colour,
            Category::FilterMessages => self.filter_messages.log_colour,
        };
        configured.unwrap_or_else(|| category.default_colour())
    }

    /// Apply one typed administrative mutation to a category.
    ///
    /// `Limit` and `MuteOnTrigger` only exist for the spam categories;
    /// asking for them on a filter category is a configuration error.
    pub fn apply_category_field(
        &mut self,
        category: Category,
        field: CategoryField,
    ) -> Result<(), AutoModError> {
        match field {
            CategoryField::Enabled(enabled) => {
                match category {
                    Category::MentionSpam => self.mention_spam.enabled = enabled,
                    Category::MessageSpam => self.message_spam.enabled = enabled,
                    Category::AttachmentSpam => self.attachment_spam.enabled = enabled,
                    Category::FilterInvites => self.filter_invites.enabled = enabled,
                    Category::FilterMessages => self.filter_messages.enabled = enabled,
                }
                Ok(())
            }
            CategoryField::Limit(limit) => match self.spam_settings_mut(category) {
                Some(settings) => {
                    settings.limit = limit;
                    Ok(())
                }
                None => Err(AutoModError::Config(format!(
                    "{category} does not take a limit"
                ))),
            },
            CategoryField::MuteOnTrigger(mute) => match self.spam_settings_mut(category) {
                Some(settings) => {
                    settings.mute_on_trigger = mute;
                    Ok(())
                }
                None => Err(AutoModError::Config(format!(
                    "{category} does not take a mute setting"
                ))),
            },
            CategoryField::LogColour(colour) => {
                match category {
                    Category::MentionSpam => self.mention_spam.log_colour = colour,
                    Category::MessageSpam => self.message_spam.log_colour = colour,
                    Category::AttachmentSpam => self.attachment_spam.log_colour = colour,
                    Category::FilterInvites => self.filter_invites.log_colour = colour,
                    Category::FilterMessages => self.filter_messages.log_colour = colour,
                }
                Ok(())
            }
        }
    }

    fn spam_settings_mut(&mut self, category: Category) -> Option<&mut CategorySettings> {
        match category {
            Category::MentionSpam => Some(&mut self.mention_spam),
            Category::MessageSpam => Some(&mut self.message_spam),
            Category::AttachmentSpam => Some(&mut self.attachment_spam),
            Category::FilterInvites | Category::FilterMessages => None,
        }
    }
}

/// A typed administrative mutation, replacing the original string-keyed
/// `set_raw(event, field, value)` calls.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryField {
    Enabled(bool),
    Limit(u32),
    MuteOnTrigger(bool),
    LogColour(Option<u32>),
}

// ============================================================================
// VERDICTS
// ============================================================================

/// Why a category fired, with enough context to build the log reason.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerDetail {
    MentionSpam {
        mentions: u32,
        limit: u32,
    },
    MessageSpam {
        total: usize,
        limit: u32,
        window_secs: u64,
    },
    AttachmentSpam {
        total: usize,
        limit: u32,
        window_secs: u64,
    },
    /// `resolved_scope_name` is present when the invite resolved to a
    /// non-allow-listed scope, absent when the code was unknown/unresolvable.
    BlockedInvite {
        code: String,
        resolved_scope_name: Option<String>,
    },
    FilteredMessage {
        pattern: String,
        matched: String,
    },
}

impl std::fmt::Display for TriggerDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerDetail::MentionSpam { mentions, limit } => {
                write!(f, "Mention Spam ({mentions} mentions, limit {limit} per message)")
            }
            TriggerDetail::MessageSpam {
                total,
                limit,
                window_secs,
            } => write!(
                f,
                "Message Spam ({total} messages, limit {limit}/{window_secs} secs)"
            ),
            TriggerDetail::AttachmentSpam {
                total,
                limit,
                window_secs,
            } => write!(
                f,
                "Attachment Spam ({total} attachments, limit {limit}/{window_secs} secs)"
            ),
            TriggerDetail::BlockedInvite {
                code,
                resolved_scope_name,
            } => match resolved_scope_name {
                Some(name) => write!(f, "Server Invite (Code: `{code}`, Server: `{name}`)"),
                None => write!(f, "Server Invite (Code: `{code}`)"),
            },
            TriggerDetail::FilteredMessage { matched, .. } => {
                write!(f, "Filtered Word (Match: `{matched}`)")
            }
        }
    }
}

/// Output of classification for one event. Transient - consumed immediately
/// by the action executor.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub category: Category,
    /// Exactly the ids in the snapshot the decision was made on, in arrival
    /// order. These are the messages the executor deletes and evicts.
    pub matched_message_ids: Vec<u64>,
    pub should_mute: bool,
    pub detail: TriggerDetail,
}

/// Structured log entry handed to the host's log delivery effect.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub scope_id: u64,
    pub actor_id: u64,
    pub channel_id: u64,
    pub category: Category,
    pub colour: u32,
    pub reason: String,
    pub content: String,
    pub deleted_messages: usize,
    /// When the offending message was created - log embeds are timestamped
    /// with the message's time, not the moment the record was built.
    pub created_at: DateTime<Utc>,
}
