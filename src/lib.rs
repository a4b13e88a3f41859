// Automod core - sliding-window spam classification for chat moderation bots.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (in-memory, SQLite)
//
// There is no transport layer here. The host chat framework drives this crate
// through `AutoModService::handle_event` for every inbound message-like event
// and through the `ExpirySweeper` ticks, and supplies the side-effect ports
// (message deletion, mutes, log delivery, invite resolution) behind the
// `ModEffects` trait.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub use crate::core::automod::{
    AutoModError, AutoModService, Category, CategoryField, CategorySettings, EffectError, Event,
    IgnoreSet, IgnoreTarget, InviteFilterSettings, LogRecord, MessageFilterSettings, ModEffects,
    ResolvedInvite, ScopeConfigStore, ScopeSettings, StoreError, TriggerDetail, Verdict,
    WindowCategory, WindowStore,
};
pub use crate::core::scheduler::{
    ExpirySweeper, ModerationStateStore, SlowmodeRestriction, SweeperHandle, TempMute,
};
