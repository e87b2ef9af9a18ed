use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Local, NaiveDate, Offset, TimeZone};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::infer::{detect_meeting_type, MeetingType, Platform, WatchedFile};
use crate::notion::NotionApi;

/// Notion caps a rich-text item at 2000 characters.
pub const CHUNK_SIZE: usize = 2000;
pub const TRANSCRIPT_HEADING: &str = "Meeting Transcript";
pub const SUMMARY_PLACEHOLDER: &str = "Placeholder summary to trigger AI.";

const BASE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { page_id: String, chunks: usize },
    /// The file could not be read; nothing was sent.
    Unreadable,
    /// The page was accepted but the response carried no id, so no body was appended.
    MissingPageId,
}

/// Split into contiguous pieces of at most `size` characters, in order.
pub fn chunk_text(content: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        let split = rest
            .char_indices()
            .nth(size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(split);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Midday on `date` at `offset`, e.g. `2024-03-05T12:00:00+02:00`.
///
/// A bare date would be read as UTC midnight and could shift a day.
pub fn format_meeting_date(date: NaiveDate, offset: FixedOffset) -> String {
    format!("{}T12:00:00{}", date.format("%Y-%m-%d"), offset)
}

/// Local UTC offset in effect at midday on `date`.
pub fn local_offset_on(date: NaiveDate) -> FixedOffset {
    date.and_hms_opt(12, 0, 0)
        .and_then(|noon| Local.from_local_datetime(&noon).earliest())
        .map(|dt| dt.offset().fix())
        .unwrap_or_else(|| Local::now().offset().fix())
}

pub fn page_properties(
    title: &str,
    meeting_date: &str,
    platform: Platform,
    meeting_type: MeetingType,
) -> Value {
    json!({
        "Name": {
            "title": [{ "text": { "content": title } }]
        },
        "Date of Meeting": {
            "date": { "start": meeting_date }
        },
        "Platform": {
            "select": { "name": platform.as_str() }
        },
        "Meeting Type": {
            "select": { "name": meeting_type.as_str() }
        },
        "AI summary": {
            "rich_text": [{ "text": { "content": SUMMARY_PLACEHOLDER } }]
        }
    })
}

/// Heading block followed by one paragraph per chunk.
pub fn transcript_blocks(content: &str) -> Vec<Value> {
    let mut blocks = vec![json!({
        "object": "block",
        "type": "heading_2",
        "heading_2": {
            "rich_text": [{ "text": { "content": TRANSCRIPT_HEADING } }]
        }
    })];

    blocks.extend(chunk_text(content, CHUNK_SIZE).into_iter().map(|chunk| {
        json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": {
                "rich_text": [{
                    "type": "text",
                    "text": { "content": chunk }
                }]
            }
        })
    }));
    blocks
}

/// Turns watched files into Notion pages.
pub struct Publisher<A> {
    api: Arc<A>,
    database_id: String,
    page_ready_timeout: Duration,
}

impl<A: NotionApi> Publisher<A> {
    pub fn new(api: Arc<A>, database_id: String, page_ready_timeout: Duration) -> Self {
        Self {
            api,
            database_id,
            page_ready_timeout,
        }
    }

    pub async fn create_page(
        &self,
        title: &str,
        date: NaiveDate,
        platform: Platform,
        meeting_type: MeetingType,
    ) -> Result<Option<PageHandle>, ApiError> {
        let meeting_date = format_meeting_date(date, local_offset_on(date));
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(title, &meeting_date, platform, meeting_type),
        });

        let response = self.api.create_page(&body).await.map_err(|e| {
            e.log("create a page");
            e
        })?;

        let page = response
            .get("id")
            .and_then(Value::as_str)
            .map(|id| PageHandle { id: id.to_string() });
        if page.is_none() {
            warn!("Create page response has no id: {}", response);
        }
        Ok(page)
    }

    /// Append the transcript body; returns the number of paragraph blocks sent.
    ///
    /// Everything goes out in one request. Notion accepts at most 100 children
    /// per append, so transcripts past roughly 198,000 characters are rejected.
    pub async fn append_body(&self, page: &PageHandle, content: &str) -> Result<usize, ApiError> {
        let children = transcript_blocks(content);
        let paragraphs = children.len() - 1;
        let body = json!({ "children": children });

        self.api
            .append_children(&page.id, &body)
            .await
            .map_err(|e| {
                e.log("append the transcript");
                e
            })?;
        Ok(paragraphs)
    }

    /// Poll until the new page is readable, backing off while it answers 404.
    ///
    /// Returns false if the deadline passed first or the lookup failed some other way.
    pub async fn wait_until_visible(&self, page: &PageHandle) -> bool {
        let deadline = Instant::now() + self.page_ready_timeout;
        let mut backoff = Duration::from_millis(BASE_BACKOFF_MS);
        loop {
            match self.api.retrieve_page(&page.id).await {
                Ok(_) => return true,
                Err(ApiError::Status { status: 404, .. }) => {
                    debug!(page_id = %page.id, "page not readable yet")
                }
                Err(e) => {
                    warn!(page_id = %page.id, "Could not confirm page, appending anyway: {}", e);
                    return false;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    page_id = %page.id,
                    "Page not readable after {:?}, appending anyway",
                    self.page_ready_timeout
                );
                return false;
            }
            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff *= 2;
        }
    }

    pub async fn publish(&self, file: &WatchedFile) -> Result<PublishOutcome, ApiError> {
        let content = match tokio::fs::read_to_string(&file.path).await {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read file content of {}: {}", file.path.display(), e);
                return Ok(PublishOutcome::Unreadable);
            }
        };

        let meeting_type = detect_meeting_type(&content);
        info!(
            title = file.title(),
            date = %file.meeting_date,
            platform = %file.platform,
            meeting_type = %meeting_type,
            "Creating Notion page"
        );

        let Some(page) = self
            .create_page(file.title(), file.meeting_date, file.platform, meeting_type)
            .await?
        else {
            return Ok(PublishOutcome::MissingPageId);
        };

        self.wait_until_visible(&page).await;

        let chunks = self.append_body(&page, &content).await?;
        Ok(PublishOutcome::Published {
            page_id: page.id,
            chunks,
        })
    }
}

// ── Tests ──
