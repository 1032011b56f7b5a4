//! Discord REST API access

pub mod client;
mod messages;

pub use client::DiscordClient;
pub use messages::ChannelMessages;
