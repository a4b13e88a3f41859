// Core automod module - windowed spam classification and action execution.

pub mod action_executor;
pub mod automod_models;
pub mod automod_service;
pub mod window_store;

pub use action_executor::*;
pub use automod_models::*;
pub use automod_service::*;
pub use window_store::*;
