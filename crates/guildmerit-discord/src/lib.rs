pub mod client;
pub mod error;

pub use client::{DiscordClient, MEMBER_PAGE_LIMIT};
pub use error::{DiscordError, DiscordResult};
