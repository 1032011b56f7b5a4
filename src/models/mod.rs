//! Data models for Discord entities

mod message;
mod snowflake;
mod user;

pub use message::*;
pub use snowflake::*;
pub use user::*;
