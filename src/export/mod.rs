//! Export pipeline: fetch history, assemble, render and write to disk

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::api::{ChannelMessages, DiscordClient};
use crate::config::Settings;
use crate::models::Snowflake;
use crate::transcript::{format_file_name, AttachmentTransfer, Rendered, Renderer, Transcript};

/// Fetches attachment bytes
#[allow(async_fn_in_trait)]
pub trait AttachmentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl AttachmentFetcher for DiscordClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.download(url).await
    }
}

/// A single attachment that could not be saved
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("failed to download {file}: {reason}")]
    Download { file: String, reason: String },
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of writing a transcript
#[derive(Debug, Default)]
pub struct ExportReport {
    pub document: PathBuf,
    pub attachments_saved: usize,
    pub failures: Vec<AttachmentError>,
}

/// Where a transcript is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// Folder and document name
    pub slug: String,
    pub dir: PathBuf,
}

impl OutputLocation {
    /// Pick the output folder for `title` under `base`.
    ///
    /// A folder already holding a document for a different title is left
    /// alone; the slug gets the start message id appended instead.
    pub fn resolve(base: &Path, title: &str, start: Snowflake) -> Self {
        let slug = format_file_name(title);
        let dir = base.join(&slug);

        let existing = fs::read_to_string(dir.join(format!("{}.md", slug))).ok();
        let taken = existing
            .as_deref()
            .and_then(|doc| doc.lines().next())
            .map_or(false, |first| first != format!("# {}", title));

        if taken {
            let slug = format!("{}_{}", slug, start);
            tracing::warn!(
                "{} holds another transcript, writing to {} instead",
                dir.display(),
                slug
            );
            return Self {
                dir: base.join(&slug),
                slug,
            };
        }

        Self { slug, dir }
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(format!("{}.md", self.slug))
    }
}

/// Fetch the configured range of history and assemble it.
pub async fn collect(client: &DiscordClient, settings: &Settings) -> Result<Transcript> {
    let mut transcript = Transcript::new(
        settings.start_msg_id,
        settings.end_msg_id,
        settings.name_override.clone(),
    );
    let mut pages = ChannelMessages::new(
        client,
        settings.channel_id,
        settings.start_msg_id,
        settings.page_size,
    );

    if !settings.name_override.is_empty() {
        tracing::debug!("{} name overrides loaded", settings.name_override.len());
    }

    let count = transcript.add_messages_page(&mut pages).await?;
    tracing::info!("Done getting messages ({} pages)", count);

    if transcript.is_empty() {
        bail!(
            "No messages found in channel {} before {}",
            settings.channel_id,
            transcript.start_msg_id()
        );
    }

    if let Some(stats) = transcript.stats() {
        for line in stats.to_string().lines() {
            tracing::info!("{}", line);
        }
    }

    Ok(transcript)
}

/// Full export run: fetch, render and save.
pub async fn run(settings: &Settings) -> Result<ExportReport> {
    tracing::info!("Starting {}...", settings.trial_name);

    let client = DiscordClient::new(settings)?;
    let transcript = collect(&client, settings).await?;

    tracing::info!("Saving transcript...");
    let location = OutputLocation::resolve(
        &settings.output_dir,
        &settings.trial_name,
        settings.start_msg_id,
    );
    let renderer = Renderer::new(&settings.trial_name, &location.slug, &settings.asset_prefix);
    let rendered = renderer.render(&transcript);

    let report = save(&rendered, &location, &client).await?;
    tracing::info!("Transcript saved to {}", report.document.display());

    Ok(report)
}

/// Write the document, then copy attachments one at a time.
///
/// Failing to create the folder or the document is fatal. Attachment
/// failures are logged and collected in the report.
pub async fn save<F: AttachmentFetcher>(
    rendered: &Rendered<'_>,
    location: &OutputLocation,
    fetcher: &F,
) -> Result<ExportReport> {
    fs::create_dir_all(&location.dir)
        .with_context(|| format!("Failed to create folder {}", location.dir.display()))?;

    let document = location.document_path();
    fs::write(&document, &rendered.document)
        .with_context(|| format!("Failed to write {}", document.display()))?;

    let mut report = ExportReport {
        document,
        ..Default::default()
    };

    for transfer in &rendered.transfers {
        match save_attachment(transfer, &location.dir, fetcher).await {
            Ok(size) => {
                tracing::debug!("Saved attachment: {} ({})", transfer.file_name, size);
                report.attachments_saved += 1;
            }
            Err(e) => {
                tracing::error!("{}", e);
                report.failures.push(e);
            }
        }
    }

    Ok(report)
}

async fn save_attachment<F: AttachmentFetcher>(
    transfer: &AttachmentTransfer<'_>,
    dir: &Path,
    fetcher: &F,
) -> Result<usize, AttachmentError> {
    let attachment = transfer.attachment;
    let bytes = fetcher
        .fetch(&attachment.url)
        .await
        .map_err(|e| AttachmentError::Download {
            file: attachment.filename.clone(),
            reason: format!("{:#}", e),
        })?;

    if bytes.len() as u64 != attachment.size && attachment.size != 0 {
        tracing::warn!(
            "{}: expected {} bytes, got {}",
            attachment.filename,
            attachment.size,
            bytes.len()
        );
    }

    let path = dir.join(&transfer.file_name);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|source| AttachmentError::Create {
            path: path.clone(),
            source,
        })?;

    let write = async {
        file.write_all(&bytes).await?;
        file.flush().await
    };
    write
        .await
        .map_err(|source| AttachmentError::Write { path, source })?;

    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;
    use crate::transcript::tests::{id, msg};
    use crate::transcript::NameOverrides;
    use std::collections::HashMap;

    /// Serves canned bodies; unknown URLs fail.
    struct FakeFetcher(HashMap<String, Vec<u8>>);

    impl AttachmentFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            match self.0.get(url) {
                Some(body) => Ok(body.clone()),
                None => bail!("HTTP 404 for {}", url),
            }
        }
    }

    fn attachment(n: u64, filename: &str) -> Attachment {
        Attachment {
            id: Snowflake(n),
            filename: filename.to_string(),
            content_type: None,
            url: format!("https://cdn.example.com/{}", n),
            size: 3,
        }
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new(id(10), id(2), NameOverrides::default());
        let mut second = msg(2, 1, "see attached");
        second.attachments = vec![attachment(1, "ok.png"), attachment(2, "missing.png")];
        t.add_message(second);
        t.add_message(msg(1, 1, "opening"));
        t
    }

    #[test]
    fn test_save_writes_document_and_skips_failed_attachments() {
        let tmp = tempfile::tempdir().unwrap();
        let t = transcript();
        let location = OutputLocation::resolve(tmp.path(), "Trial One", id(10));
        let rendered = Renderer::new("Trial One", &location.slug, "assets").render(&t);
        let fetcher = FakeFetcher(
            [("https://cdn.example.com/1".to_string(), b"png".to_vec())]
                .into_iter()
                .collect(),
        );

        let report = tokio_test::block_on(save(&rendered, &location, &fetcher)).unwrap();

        assert_eq!(report.document, tmp.path().join("trial_one/trial_one.md"));
        assert_eq!(report.attachments_saved, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            AttachmentError::Download { file, .. } if file == "missing.png"
        ));

        let doc = fs::read_to_string(&report.document).unwrap();
        assert!(doc.starts_with("# Trial One\n"));
        assert!(doc.contains("![ok.png](assets/trial_one/ok.png)"));
        assert_eq!(fs::read(tmp.path().join("trial_one/ok.png")).unwrap(), b"png");
        assert!(!tmp.path().join("trial_one/missing.png").exists());
    }

    #[test]
    fn test_resolve_reuses_folder_for_same_title() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("trial_one");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("trial_one.md"), "# Trial One\n## Case\n").unwrap();

        let location = OutputLocation::resolve(tmp.path(), "Trial One", Snowflake(77));
        assert_eq!(location.slug, "trial_one");
        assert_eq!(location.dir, dir);
    }

    #[test]
    fn test_resolve_disambiguates_colliding_title() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("trial_one");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("trial_one.md"), "# Trial: One\n").unwrap();

        let location = OutputLocation::resolve(tmp.path(), "Trial One", Snowflake(77));
        assert_eq!(location.slug, "trial_one_77");
        assert_eq!(location.dir, tmp.path().join("trial_one_77"));
        assert_eq!(
            location.document_path(),
            tmp.path().join("trial_one_77/trial_one_77.md")
        );
    }

    #[test]
    fn test_save_fails_when_folder_cannot_be_created() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let location = OutputLocation {
            slug: "t".to_string(),
            dir: blocker.join("t"),
        };
        let t = transcript();
        let rendered = Renderer::new("T", "t", "assets").render(&t);
        let fetcher = FakeFetcher(HashMap::new());

        assert!(tokio_test::block_on(save(&rendered, &location, &fetcher)).is_err());
    }
}
