//! Markdown rendering of an assembled transcript

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write;

use super::{NameOverrides, Transcript};
use crate::models::{Attachment, Snowflake};

const CASE_PLACEHOLDER: &str = "_REPLACE ME: need a summary of the case here_";

/// An attachment to copy next to the document
#[derive(Debug, Clone)]
pub struct AttachmentTransfer<'a> {
    pub attachment: &'a Attachment,
    /// File name inside the output directory
    pub file_name: String,
}

/// Rendered document plus the attachments it links to
#[derive(Debug)]
pub struct Rendered<'a> {
    pub document: String,
    pub transfers: Vec<AttachmentTransfer<'a>>,
}

/// Renders transcripts as markdown
pub struct Renderer {
    title: String,
    slug: String,
    asset_prefix: String,
}

impl Renderer {
    /// `slug` names the asset folder that attachment links point into.
    pub fn new(title: &str, slug: &str, asset_prefix: &str) -> Self {
        Self {
            title: title.to_string(),
            slug: slug.to_string(),
            asset_prefix: asset_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn render<'a>(&self, transcript: &'a Transcript) -> Rendered<'a> {
        let mut doc = String::new();
        let mut transfers = Vec::new();
        let mut used_names = HashSet::new();

        line(&mut doc, &format!("# {}", self.title));
        line(&mut doc, "## Case");
        line(&mut doc, CASE_PLACEHOLDER);
        line(&mut doc, "## Proceedings");

        for block in transcript.blocks() {
            line(&mut doc, &format!("**{}**:", block.name));
            line(&mut doc, "");

            for entry in &block.messages {
                let mut links = String::new();

                for attachment in &entry.attachments {
                    let file_name = unique_file_name(&mut used_names, attachment);
                    // Embed images, link everything else
                    let bang = if is_image(attachment) { "!" } else { "" };
                    let _ = writeln!(
                        links,
                        "{}[{}]({}/{}/{})",
                        bang, attachment.filename, self.asset_prefix, self.slug, file_name
                    );
                    transfers.push(AttachmentTransfer {
                        attachment,
                        file_name,
                    });
                }

                let quoted = entry.content.replace('\n', "\n> ");
                let content = replace_mentions(&quoted, transcript.names());
                line(&mut doc, &format!("> {}", content));

                if !links.is_empty() {
                    line(&mut doc, "");
                    line(&mut doc, &links);
                }
            }

            line(&mut doc, "");
        }

        Rendered {
            document: doc,
            transfers,
        }
    }
}

/// Attachments without a content type are assumed to be images.
fn is_image(attachment: &Attachment) -> bool {
    attachment
        .content_type
        .as_deref()
        .map_or(true, |t| t.starts_with("image/"))
}

fn line(doc: &mut String, text: &str) {
    doc.push_str(text);
    doc.push('\n');
}

/// Attachment file name, prefixed with the attachment id when an earlier
/// attachment already took the plain name.
fn unique_file_name(used: &mut HashSet<String>, attachment: &Attachment) -> String {
    let name = attachment.filename.clone();
    if used.insert(name.clone()) {
        return name;
    }
    let name = format!("{}_{}", attachment.id, attachment.filename);
    used.insert(name.clone());
    name
}

/// Rewrite `<@id>`, `<@!id>` and `<@&id>` tokens into `` `@Name` ``.
///
/// Tokens for ids without a known name are left as they are.
pub fn replace_mentions<'a>(content: &'a str, names: &NameOverrides) -> Cow<'a, str> {
    lazy_static! {
        static ref MENTION: Regex = Regex::new(r"<@!*&*([0-9]+)>").unwrap();
    }

    MENTION.replace_all(content, |caps: &Captures| {
        caps[1]
            .parse::<Snowflake>()
            .ok()
            .and_then(|id| names.get(id))
            .map(|name| format!("`@{}`", name))
            .unwrap_or_else(|| caps[0].to_string())
    })
}

/// Turn a title into a file system friendly name.
pub fn format_file_name(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ':' | ';'))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Plain console rendering
pub fn preview(transcript: &Transcript) -> String {
    let mut out = String::new();
    line(&mut out, "----------------- Transcript -----------------");
    for block in transcript.blocks() {
        line(&mut out, &block.name);
        for entry in &block.messages {
            line(&mut out, &entry.content);
        }
        line(&mut out, "---");
    }
    out
}
