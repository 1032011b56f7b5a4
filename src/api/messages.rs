//! Backwards pagination over a channel's message history

use anyhow::Result;
use url::Url;

use super::client::DiscordClient;
use crate::models::{Message, Snowflake};
use crate::transcript::MessagePages;

/// Pages of channel history, walking backwards from an anchor message.
///
/// The first page holds the messages immediately before the anchor; each
/// later page continues before the oldest message of the previous one.
pub struct ChannelMessages<'a> {
    client: &'a DiscordClient,
    channel_id: Snowflake,
    before: Snowflake,
    limit: u32,
    exhausted: bool,
}

impl<'a> ChannelMessages<'a> {
    pub fn new(
        client: &'a DiscordClient,
        channel_id: Snowflake,
        before: Snowflake,
        limit: u32,
    ) -> Self {
        Self {
            client,
            channel_id,
            before,
            limit,
            exhausted: false,
        }
    }

    fn page_url(&self) -> Result<Url> {
        self.client.endpoint(
            &["channels", &self.channel_id.to_string(), "messages"],
            &[
                ("before", self.before.to_string()),
                ("limit", self.limit.to_string()),
            ],
        )
    }

    /// Move the cursor past `page`. Returns `false` when no page should follow it.
    fn advance(&mut self, page: &[Message]) -> bool {
        match page.iter().map(|m| m.id).min() {
            Some(oldest) => self.before = oldest,
            None => return false,
        }
        page.len() >= self.limit as usize
    }
}

impl MessagePages for ChannelMessages<'_> {
    async fn next_page(&mut self) -> Result<Option<Vec<Message>>> {
        if self.exhausted {
            return Ok(None);
        }

        let url = self.page_url()?;
        let page: Vec<Message> = self.client.get_json(&url).await?;
        tracing::debug!("Fetched {} messages before {}", page.len(), self.before);

        if !self.advance(&page) {
            self.exhausted = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }
}
