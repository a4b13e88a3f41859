// Pattern filters - invite extraction and the guild message filter.

pub mod invite_filter;
pub mod message_filter;

pub use invite_filter::*;
pub use message_filter::*;
