// Applies a verdict's side effects through the host ports.
//
// Effect order is fixed: delete matched messages, then mute (if the category
// asks for it), then emit the log record. Tests and the log format depend on
// the deleted messages being gone before the record that references them is
// delivered. Every step is best-effort; a failed delete or mute never stops
// the later steps.

use std::sync::Arc;
use std::time::Duration;

use super::automod_models::{EffectError, Event, LogRecord, ScopeSettings, Verdict};
use super::automod_service::ModEffects;
use super::window_store::WindowStore;

/// Mute length applied when a spam category fires with `mute_on_trigger`.
/// Matches the stock "5h" automatic spam mute.
const SPAM_MUTE_DURATION: Duration = Duration::from_secs(5 * 60 * 60);

pub struct ActionExecutor<E: ModEffects> {
    effects: Arc<E>,
    windows: Arc<WindowStore>,
}

impl<E: ModEffects> ActionExecutor<E> {
    pub fn new(effects: Arc<E>, windows: Arc<WindowStore>) -> Self {
        Self { effects, windows }
    }

    /// Apply one verdict. Idempotent per event: the matched-id list is the
    /// exact snapshot the classifier decided on, each id is deleted and
    /// evicted once, and the mute is issued at most once no matter how many
    /// messages were matched.
    pub async fn execute(&self, verdict: &Verdict, event: &Event, settings: &ScopeSettings) {
        for &message_id in &verdict.matched_message_ids {
            match self.effects.delete_message(event.channel_id, message_id).await {
                Ok(()) => {}
                Err(EffectError::NotFound) => {
                    // Already gone - deleted by a concurrent trigger or by hand.
                    tracing::debug!(message_id, "message already deleted, skipping");
                }
                Err(err) => {
                    tracing::warn!(message_id, error = %err, "failed to delete message");
                }
            }

            if let Some(window) = verdict.category.window_category() {
                self.windows.evict(event.actor_id, window, message_id);
            }
        }

        if verdict.should_mute {
            if let Err(err) = self
                .effects
                .mute_actor(event.scope_id, event.actor_id, SPAM_MUTE_DURATION)
                .await
            {
                // The deletions stand; the mute alone is lost.
                tracing::warn!(
                    scope_id = event.scope_id,
                    actor_id = event.actor_id,
                    error = %err,
                    "failed to mute actor for spam"
                );
            }
        }

        let record = LogRecord {
            scope_id: event.scope_id,
            actor_id: event.actor_id,
            channel_id: event.channel_id,
            category: verdict.category,
            colour: settings.category_colour(verdict.category),
            reason: verdict.detail.to_string(),
            content: event.content.clone(),
            deleted_messages: verdict.matched_message_ids.len(),
            created_at: event.created_at,
        };

        match settings.log_destination {
            Some(destination) => {
                if let Err(err) = self.effects.send_log(destination, &record).await {
                    tracing::warn!(
                        scope_id = event.scope_id,
                        destination,
                        error = %err,
                        "failed to deliver automod log record"
                    );
                }
            }
            None => {
                // Reported once per triggering event, never retried.
                tracing::error!(
                    scope_id = event.scope_id,
                    "could not log automod event: no log destination set"
                );
            }
        }
    }
}
