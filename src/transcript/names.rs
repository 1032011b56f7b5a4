//! Author id → display name table

use serde::de;
use std::collections::HashMap;

use crate::models::Snowflake;

/// Display names used for block headers and mention rewriting.
///
/// Seeded from configuration and extended during assembly with the
/// usernames of authors that have no override, so that later mentions of
/// those authors still resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameOverrides {
    names: HashMap<Snowflake, String>,
}

impl NameOverrides {
    /// Parse a JSON object of `"<user id>": "<name>"` pairs.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let mut names = HashMap::with_capacity(raw.len());
        for (id, name) in raw {
            let id = id.parse::<Snowflake>().map_err(|e| {
                <serde_json::Error as de::Error>::custom(format!("bad user id {:?}: {}", id, e))
            })?;
            names.insert(id, name);
        }
        Ok(Self { names })
    }

    pub fn get(&self, id: Snowflake) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Return the override for `id`, recording `fallback` if there is none.
    pub fn resolve_or_insert(&mut self, id: Snowflake, fallback: &str) -> String {
        self.names
            .entry(id)
            .or_insert_with(|| fallback.to_string())
            .clone()
    }

    pub fn insert(&mut self, id: Snowflake, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
