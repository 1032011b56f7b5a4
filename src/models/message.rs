//! Message-related models

use serde::{Deserialize, Serialize};

use super::{Snowflake, User};

/// File attached to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Snowflake,
    pub filename: String,
    /// Absent for some legacy uploads
    #[serde(default)]
    pub content_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

/// Channel message as returned by the REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    #[serde(default)]
    pub content: String,
    pub author: User,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}
