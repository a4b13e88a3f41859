// Automod service - core spam/abuse classification for inbound events.
//
// This service handles:
// - Sliding-window rate checks (message spam, attachment spam)
// - Per-message mention spam
// - Invite-link filtering against an allow-list
// - The guild regex message filter
//
// NO chat-platform dependencies here - just pure domain logic. Settings come
// from a `ScopeConfigStore`, side effects go out through `ModEffects`, and
// the host adapter implements both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::action_executor::ActionExecutor;
use super::automod_models::{
    AutoModError, Category, CategoryField, EffectError, Event, IgnoreSet, LogRecord,
    ScopeSettings, StoreError, TriggerDetail, Verdict, WindowCategory,
};
use super::window_store::WindowStore;
use crate::core::filters::{InviteFilter, MessageFilter};

// ============================================================================
// PORTS
// ============================================================================

/// Durable per-scope configuration, provided by the host's config service.
///
/// Settings are loaded fresh for every event; the core never caches them.
#[async_trait]
pub trait ScopeConfigStore: Send + Sync {
    async fn get_scope_settings(&self, scope_id: u64) -> Result<ScopeSettings, StoreError>;

    async fn get_ignore_set(&self, scope_id: u64) -> Result<IgnoreSet, StoreError>;

    async fn set_scope_settings(
        &self,
        scope_id: u64,
        settings: ScopeSettings,
    ) -> Result<(), StoreError>;
}

/// What an invite code resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInvite {
    pub scope_id: u64,
    pub scope_name: Option<String>,
}

/// Host side effects. One implementation per host platform.
///
/// Every method is an outbound host API call and can fail for transient
/// reasons; callers treat failures per the error taxonomy (skip, log,
/// continue) rather than aborting the event.
#[async_trait]
pub trait ModEffects: Send + Sync {
    /// Delete one message. `NotFound` means it was already gone.
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), EffectError>;

    /// Mute an actor for `duration`. The host applies the mute role and
    /// records the temp-mute so the expiry sweep can reverse it later.
    async fn mute_actor(
        &self,
        scope_id: u64,
        actor_id: u64,
        duration: Duration,
    ) -> Result<(), EffectError>;

    /// Remove an expired mute. `NotFound` means the actor is already unmuted.
    async fn unmute_actor(&self, scope_id: u64, actor_id: u64) -> Result<(), EffectError>;

    /// Clear an expired per-actor slow-mode restriction on a channel.
    async fn lift_restriction(
        &self,
        scope_id: u64,
        channel_id: u64,
        actor_id: u64,
    ) -> Result<(), EffectError>;

    /// Deliver a structured log record to the scope's log destination.
    async fn send_log(&self, destination: u64, record: &LogRecord) -> Result<(), EffectError>;

    /// Resolve an invite code. `Ok(None)` means the code is unknown or
    /// revoked; errors are treated the same way by the classifier.
    async fn resolve_invite(&self, code: &str) -> Result<Option<ResolvedInvite>, EffectError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Spam/abuse detection core for one process.
///
/// Safe to share behind an `Arc` and invoke concurrently from many scopes;
/// same-actor races are resolved inside the window store.
pub struct AutoModService<S: ScopeConfigStore, E: ModEffects> {
    config: S,
    effects: Arc<E>,
    windows: Arc<WindowStore>,
    executor: ActionExecutor<E>,
    invite_filter: InviteFilter,
    message_filter: MessageFilter,
}

impl<S: ScopeConfigStore, E: ModEffects> AutoModService<S, E> {
    pub fn new(config: S, effects: Arc<E>) -> Self {
        let windows = Arc::new(WindowStore::new());
        let executor = ActionExecutor::new(Arc::clone(&effects), Arc::clone(&windows));
        Self {
            config,
            effects,
            windows,
            executor,
            invite_filter: InviteFilter::new(),
            message_filter: MessageFilter::new(),
        }
    }

    /// The window store, shared with the expiry sweeper.
    pub fn windows(&self) -> Arc<WindowStore> {
        Arc::clone(&self.windows)
    }

    /// Sole hot-path entry point, invoked once per inbound message event.
    ///
    /// Evaluation order is fixed: ignore checks, then the three spam
    /// categories first-match-wins, then the invite filter if none of them
    /// fired, and finally the message filter *independently* of the rest.
    /// One event can therefore produce two verdicts (a spam/invite one and a
    /// filter one); both are executed, and the second delete of the same
    /// message is a harmless no-op.
    pub async fn handle_event(&self, event: &Event) -> Result<(), AutoModError> {
        if event.is_from_privileged_actor {
            return Ok(());
        }

        let settings = self.config.get_scope_settings(event.scope_id).await?;
        let ignored = self.config.get_ignore_set(event.scope_id).await?;
        if ignored.covers(event) {
            return Ok(());
        }

        // Append before classifying so the decision snapshot includes this
        // event; the matched-id list handed to the executor is exactly that
        // snapshot.
        let ttl = Duration::from_secs(settings.window_duration_secs);
        self.windows
            .append(event.actor_id, WindowCategory::Message, event.message_id, ttl);
        if event.has_attachment {
            self.windows.append(
                event.actor_id,
                WindowCategory::Attachment,
                event.message_id,
                ttl,
            );
        }

        let mut verdict = self.classify_spam(event, &settings);
        if verdict.is_none() {
            verdict = self.classify_invite(event, &settings).await;
        }
        if let Some(verdict) = &verdict {
            tracing::info!(
                scope_id = event.scope_id,
                actor_id = event.actor_id,
                category = %verdict.category,
                matched = verdict.matched_message_ids.len(),
                "automod category triggered"
            );
            self.executor.execute(verdict, event, &settings).await;
        }

        // The message filter always runs, regardless of the outcome above.
        if let Some(verdict) = self.classify_filter(event, &settings) {
            tracing::info!(
                scope_id = event.scope_id,
                actor_id = event.actor_id,
                category = %verdict.category,
                "message filter triggered"
            );
            self.executor.execute(&verdict, event, &settings).await;
        }

        Ok(())
    }

    /// The three spam categories, mutually exclusive, first match wins.
    ///
    /// Threshold strictness differs on purpose: mention and message spam
    /// trigger on counts strictly *above* the limit, attachment spam on
    /// counts *at* the limit. With limit 3 that means the 4th message but
    /// the 3rd attachment.
    fn classify_spam(&self, event: &Event, settings: &ScopeSettings) -> Option<Verdict> {
        let mention = &settings.mention_spam;
        if mention.is_armed() && event.mention_count > mention.limit {
            return Some(Verdict {
                category: Category::MentionSpam,
                matched_message_ids: vec![event.message_id],
                should_mute: mention.mute_on_trigger,
                detail: TriggerDetail::MentionSpam {
                    mentions: event.mention_count,
                    limit: mention.limit,
                },
            });
        }

        if event.has_attachment {
            let attachment = &settings.attachment_spam;
            if attachment.is_armed() {
                let snapshot = self.windows.snapshot(event.actor_id, WindowCategory::Attachment);
                if snapshot.len() as u32 >= attachment.limit {
                    return Some(Verdict {
                        category: Category::AttachmentSpam,
                        should_mute: attachment.mute_on_trigger,
                        detail: TriggerDetail::AttachmentSpam {
                            total: snapshot.len(),
                            limit: attachment.limit,
                            window_secs: settings.window_duration_secs,
                        },
                        matched_message_ids: snapshot,
                    });
                }
            }
        }

        let message = &settings.message_spam;
        if message.is_armed() {
            let snapshot = self.windows.snapshot(event.actor_id, WindowCategory::Message);
            if snapshot.len() as u32 > message.limit {
                return Some(Verdict {
                    category: Category::MessageSpam,
                    should_mute: message.mute_on_trigger,
                    detail: TriggerDetail::MessageSpam {
                        total: snapshot.len(),
                        limit: message.limit,
                        window_secs: settings.window_duration_secs,
                    },
                    matched_message_ids: snapshot,
                });
            }
        }

        None
    }

    /// Invite filter: extract the last invite code and resolve it.
    ///
    /// An unresolvable code is treated conservatively as a violation; an
    /// invite back into the current scope or into an allow-listed scope
    /// passes.
    async fn classify_invite(&self, event: &Event, settings: &ScopeSettings) -> Option<Verdict> {
        let filter = &settings.filter_invites;
        if !filter.enabled {
            return None;
        }
        let code = self.invite_filter.last_invite_code(&event.content)?;

        let resolved = match self.effects.resolve_invite(code).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::debug!(code, error = %err, "invite lookup failed, treating as unknown");
                None
            }
        };

        match resolved {
            Some(invite)
                if invite.scope_id == event.scope_id
                    || filter.allow_list.contains(&invite.scope_id) =>
            {
                None
            }
            Some(invite) => Some(Verdict {
                category: Category::FilterInvites,
                matched_message_ids: vec![event.message_id],
                should_mute: false,
                detail: TriggerDetail::BlockedInvite {
                    code: code.to_string(),
                    resolved_scope_name: invite.scope_name,
                },
            }),
            None => Some(Verdict {
                category: Category::FilterInvites,
                matched_message_ids: vec![event.message_id],
                should_mute: false,
                detail: TriggerDetail::BlockedInvite {
                    code: code.to_string(),
                    resolved_scope_name: None,
                },
            }),
        }
    }

    fn classify_filter(&self, event: &Event, settings: &ScopeSettings) -> Option<Verdict> {
        let filter = &settings.filter_messages;
        if !filter.enabled {
            return None;
        }

        self.message_filter
            .first_match(&filter.patterns, &event.content)
            .map(|hit| Verdict {
                category: Category::FilterMessages,
                matched_message_ids: vec![event.message_id],
                should_mute: false,
                detail: TriggerDetail::FilteredMessage {
                    pattern: hit.pattern,
                    matched: hit.matched,
                },
            })
    }

    // ========================================================================
    // ADMINISTRATIVE SURFACE (outside the hot path)
    // ========================================================================

    pub async fn scope_settings(&self, scope_id: u64) -> Result<ScopeSettings, AutoModError> {
        Ok(self.config.get_scope_settings(scope_id).await?)
    }

    /// Typed mutation of one category field, replacing the original
    /// string-keyed settings writes.
    pub async fn set_category_field(
        &self,
        scope_id: u64,
        category: Category,
        field: CategoryField,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        settings.apply_category_field(category, field)?;
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn set_log_destination(
        &self,
        scope_id: u64,
        destination: Option<u64>,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        settings.log_destination = destination;
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn set_window_duration(
        &self,
        scope_id: u64,
        duration_secs: u64,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        settings.window_duration_secs = duration_secs;
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn ignore(&self, scope_id: u64, target: IgnoreTarget) -> Result<(), AutoModError> {
        self.update_ignored(scope_id, target, true).await
    }

    /// Removing something that was never ignored is fine.
    pub async fn unignore(&self, scope_id: u64, target: IgnoreTarget) -> Result<(), AutoModError> {
        self.update_ignored(scope_id, target, false).await
    }

    async fn update_ignored(
        &self,
        scope_id: u64,
        target: IgnoreTarget,
        add: bool,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        let (list, id) = match target {
            IgnoreTarget::Role(id) => (&mut settings.ignored.role_ids, id),
            IgnoreTarget::Actor(id) => (&mut settings.ignored.actor_ids, id),
            IgnoreTarget::Channel(id) => (&mut settings.ignored.channel_ids, id),
        };
        if add {
            if !list.contains(&id) {
                list.push(id);
            }
        } else {
            list.retain(|existing| *existing != id);
        }
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn allow_invite_scope(
        &self,
        scope_id: u64,
        invited_scope: u64,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        if !settings.filter_invites.allow_list.contains(&invited_scope) {
            settings.filter_invites.allow_list.push(invited_scope);
        }
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn disallow_invite_scope(
        &self,
        scope_id: u64,
        invited_scope: u64,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        settings
            .filter_invites
            .allow_list
            .retain(|existing| *existing != invited_scope);
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    pub async fn add_filter_pattern(
        &self,
        scope_id: u64,
        pattern: String,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        settings.filter_messages.patterns.push(pattern);
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }

    /// Remove a stored pattern by position (1-based, matching how moderators
    /// see the list).
    pub async fn remove_filter_pattern(
        &self,
        scope_id: u64,
        number: usize,
    ) -> Result<(), AutoModError> {
        let mut settings = self.config.get_scope_settings(scope_id).await?;
        let index = number
            .checked_sub(1)
            .filter(|i| *i < settings.filter_messages.patterns.len())
            .ok_or_else(|| AutoModError::Config(format!("no filter pattern #{number}")))?;
        settings.filter_messages.patterns.remove(index);
        self.config.set_scope_settings(scope_id, settings).await?;
        Ok(())
    }
}

/// What an ignore-list mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreTarget {
    Role(u64),
    Actor(u64),
    Channel(u64),
}

// ============================================================================
// TESTS
// ============================================================================
