// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "automod/mod.rs"]
pub mod automod;

#[path = "filters/mod.rs"]
pub mod filters;

#[path = "scheduler/expiry_sweeper.rs"]
pub mod scheduler;
