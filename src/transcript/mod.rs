//! Transcript assembly
//!
//! Messages arrive from the channel history newest-first. They are grouped
//! into per-speaker blocks as they arrive, put back into chronological order
//! and cut off at the configured end message.

mod names;
mod render;
mod stats;

pub use names::NameOverrides;
pub use render::{format_file_name, preview, AttachmentTransfer, Rendered, Renderer};
pub use stats::Stats;

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::{HashSet, VecDeque};

use crate::models::{Attachment, Message, Snowflake};

/// Source of message pages, newest page first and newest message first
/// within a page.
#[allow(async_fn_in_trait)]
pub trait MessagePages {
    /// Fetch the next page, or `None` once the history is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<Message>>>;
}

/// One message inside a block
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: Snowflake,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Ingestion order, used to break timestamp ties when sorting
    seq: u64,
}

/// Run of consecutive messages from one author, oldest first
#[derive(Debug, Clone)]
pub struct Block {
    pub author_id: Snowflake,
    pub name: String,
    pub messages: VecDeque<Entry>,
}

impl Block {
    fn first(&self) -> Option<&Entry> {
        self.messages.front()
    }
}

/// Transcript of a bounded range of channel history
#[derive(Debug)]
pub struct Transcript {
    blocks: VecDeque<Block>,
    start_msg_id: Snowflake,
    end_msg_id: Snowflake,
    names: NameOverrides,
    next_seq: u64,
}

impl Transcript {
    pub fn new(start_msg_id: Snowflake, end_msg_id: Snowflake, names: NameOverrides) -> Self {
        Self {
            blocks: VecDeque::new(),
            start_msg_id,
            end_msg_id,
            names,
            next_seq: 0,
        }
    }

    /// Add one message. Messages must be added newest-first: each one is
    /// older than everything already in the transcript.
    pub fn add_message(&mut self, message: Message) {
        let entry = Entry {
            id: message.id,
            content: message.content,
            attachments: message.attachments,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        // Front block is the most recently created one
        if let Some(block) = self.blocks.front_mut() {
            if block.author_id == message.author.id {
                block.messages.push_front(entry);
                return;
            }
        }

        let name = self
            .names
            .resolve_or_insert(message.author.id, &message.author.username);

        let mut messages = VecDeque::new();
        messages.push_front(entry);
        self.blocks.push_front(Block {
            author_id: message.author.id,
            name,
            messages,
        });
    }

    /// Drain every page from `pages`, then sort and trim.
    ///
    /// Returns the number of pages processed.
    pub async fn add_messages_page<P: MessagePages>(&mut self, pages: &mut P) -> Result<usize> {
        let mut count = 0;

        while let Some(page) = pages.next_page().await? {
            count += 1;
            tracing::info!("Processing page {}...", count);

            for message in page {
                self.add_message(message);
            }
        }

        self.sort();
        self.remove_excess_messages();

        Ok(count)
    }

    /// Order blocks by the creation time of their first message.
    ///
    /// Corrects block order when pages were not delivered strictly
    /// newest-first. Ties go to the block whose first message was ingested
    /// later, since later ingestion means older.
    pub fn sort(&mut self) {
        self.blocks.make_contiguous().sort_by_key(|block| {
            let first = block.first();
            (
                first.map(|e| e.id.unix_millis()).unwrap_or(u64::MAX),
                Reverse(first.map(|e| e.seq).unwrap_or(0)),
            )
        });
    }

    /// Drop everything after the end message.
    ///
    /// Returns `false`, leaving the transcript untouched, when the end
    /// message is not part of the transcript.
    pub fn remove_excess_messages(&mut self) -> bool {
        let end = self.end_msg_id;
        let found = self.blocks.iter().enumerate().find_map(|(i, block)| {
            block
                .messages
                .iter()
                .position(|m| m.id == end)
                .map(|j| (i, j))
        });

        match found {
            Some((i, j)) => {
                self.blocks[i].messages.truncate(j + 1);
                self.blocks.truncate(i + 1);
                true
            }
            None => {
                tracing::warn!("End message {} not found, transcript not trimmed", end);
                false
            }
        }
    }

    /// Summary of the assembled transcript, `None` when it holds no messages.
    pub fn stats(&self) -> Option<Stats> {
        let first = self.blocks.front()?.messages.front()?;
        let last = self.blocks.back()?.messages.back()?;

        let total_messages = self.blocks.iter().map(|b| b.messages.len()).sum();
        let total_users = self
            .blocks
            .iter()
            .map(|b| b.author_id)
            .collect::<HashSet<_>>()
            .len();

        Some(Stats::new(total_messages, total_users, first.id, last.id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn names(&self) -> &NameOverrides {
        &self.names
    }

    pub fn start_msg_id(&self) -> Snowflake {
        self.start_msg_id
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.messages.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::User;

    /// Id whose creation time is `n` milliseconds after the epoch.
    pub fn id(n: u64) -> Snowflake {
        Snowflake(n << 22)
    }

    pub fn msg(n: u64, author: u64, content: &str) -> Message {
        Message {
            id: id(n),
            content: content.to_string(),
            author: User {
                id: Snowflake(author),
                username: format!("user{}", author),
            },
            attachments: Vec::new(),
        }
    }

    /// In-memory page source
    pub struct StaticPages(pub VecDeque<Vec<Message>>);

    impl MessagePages for StaticPages {
        async fn next_page(&mut self) -> Result<Option<Vec<Message>>> {
            Ok(self.0.pop_front())
        }
    }

    fn flatten(t: &Transcript) -> Vec<Snowflake> {
        t.blocks()
            .flat_map(|b| b.messages.iter().map(|m| m.id))
            .collect()
    }

    fn authors(t: &Transcript) -> Vec<u64> {
        t.blocks().map(|b| b.author_id.0).collect()
    }

    #[test]
    fn test_add_message_groups_consecutive_authors() {
        let mut t = Transcript::new(id(100), id(4), NameOverrides::default());
        // newest first
        for m in [msg(4, 2, "d"), msg(3, 1, "c"), msg(2, 1, "b"), msg(1, 2, "a")] {
            t.add_message(m);
        }

        assert_eq!(authors(&t), vec![2, 1, 2]);
        assert_eq!(flatten(&t), vec![id(1), id(2), id(3), id(4)]);
        let middle = t.blocks().nth(1).unwrap();
        assert_eq!(middle.messages.len(), 2);
        assert_eq!(middle.messages[0].content, "b");
    }

    #[test]
    fn test_add_message_records_username_fallback() {
        let mut names = NameOverrides::default();
        names.insert(Snowflake(1), "Alice");
        let mut t = Transcript::new(id(100), id(2), names);
        t.add_message(msg(2, 2, "hi"));
        t.add_message(msg(1, 1, "hello"));

        let names: Vec<&str> = t.blocks().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "user2"]);
        assert_eq!(t.names().get(Snowflake(2)), Some("user2"));
    }

    #[test]
    fn test_add_messages_page_scenario() {
        // Chronological: A(1) B(2) B(3) C(4, end) D(5)
        let pages = vec![
            vec![msg(5, 4, "after"), msg(4, 3, "end")],
            vec![msg(3, 2, "b2"), msg(2, 2, "b1")],
            vec![msg(1, 1, "a")],
        ];
        let mut source = StaticPages(pages.into());
        let mut t = Transcript::new(id(6), id(4), NameOverrides::default());

        let count = tokio_test::block_on(t.add_messages_page(&mut source)).unwrap();

        assert_eq!(count, 3);
        assert_eq!(authors(&t), vec![1, 2, 3]);
        assert_eq!(flatten(&t), vec![id(1), id(2), id(3), id(4)]);
    }

    #[test]
    fn test_sort_fixes_pages_delivered_out_of_order() {
        // Older page delivered first
        let pages = vec![
            vec![msg(2, 1, "a2"), msg(1, 1, "a1")],
            vec![msg(4, 2, "b2"), msg(3, 2, "b1")],
        ];
        let mut source = StaticPages(pages.into());
        let mut t = Transcript::new(id(10), id(4), NameOverrides::default());

        tokio_test::block_on(t.add_messages_page(&mut source)).unwrap();

        assert_eq!(authors(&t), vec![1, 2]);
        assert_eq!(flatten(&t), vec![id(1), id(2), id(3), id(4)]);
    }

    #[test]
    fn test_sort_breaks_ties_by_ingestion_order() {
        let mut t = Transcript::new(id(100), id(100), NameOverrides::default());
        // Same millisecond, different low bits
        let mut newer = msg(10, 1, "x");
        newer.id = Snowflake((10 << 22) | 5);
        let mut older = msg(10, 2, "y");
        older.id = Snowflake((10 << 22) | 1);

        t.add_message(newer);
        t.add_message(older);
        t.blocks.make_contiguous().reverse();
        t.sort();

        assert_eq!(authors(&t), vec![2, 1]);
    }

    #[test]
    fn test_new_block_for_returning_author() {
        let mut t = Transcript::new(id(100), id(3), NameOverrides::default());
        for m in [msg(3, 1, "c"), msg(2, 2, "b"), msg(1, 1, "a")] {
            t.add_message(m);
        }
        assert_eq!(authors(&t), vec![1, 2, 1]);
        assert_eq!(t.stats().unwrap().total_users, 2);
    }

    #[test]
    fn test_remove_excess_messages_inside_block() {
        let mut t = Transcript::new(id(100), id(3), NameOverrides::default());
        for m in [
            msg(6, 3, "f"),
            msg(5, 2, "e"),
            msg(4, 2, "d"),
            msg(3, 2, "c"),
            msg(2, 1, "b"),
            msg(1, 1, "a"),
        ] {
            t.add_message(m);
        }

        assert!(t.remove_excess_messages());
        assert_eq!(flatten(&t), vec![id(1), id(2), id(3)]);
        assert_eq!(authors(&t), vec![1, 2]);
    }

    #[test]
    fn test_remove_excess_messages_missing_end_is_noop() {
        let mut t = Transcript::new(id(100), id(42), NameOverrides::default());
        for m in [msg(2, 2, "b"), msg(1, 1, "a")] {
            t.add_message(m);
        }

        assert!(!t.remove_excess_messages());
        assert_eq!(flatten(&t), vec![id(1), id(2)]);
    }

    #[test]
    fn test_stats() {
        let mut t = Transcript::new(id(100), id(3), NameOverrides::default());
        let base = 1_700_000_000_000 - crate::models::DISCORD_EPOCH_MS;
        for m in [msg(base + 3_600_000, 2, "c"), msg(base + 1000, 1, "b"), msg(base, 1, "a")] {
            t.add_message(m);
        }

        let stats = t.stats().unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.start_date, "Tue, 14 Nov 2023 22:13:20 UTC");
        assert_eq!(stats.end_date, "Tue, 14 Nov 2023 23:13:20 UTC");
    }

    #[test]
    fn test_stats_empty_transcript() {
        let t = Transcript::new(id(1), id(2), NameOverrides::default());
        assert!(t.is_empty());
        assert!(t.stats().is_none());
    }
}
