//! User-related models

use serde::{Deserialize, Serialize};

use super::Snowflake;

/// Message author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
}
