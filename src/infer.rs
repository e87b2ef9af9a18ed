use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Zoom,
    GoogleMeet,
    Slack,
}

impl Platform {
    /// Select option name in the Notion database.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Zoom => "Zoom",
            Platform::GoogleMeet => "Google Meet",
            Platform::Slack => "Slack",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingType {
    Standup,
    ClientMeeting,
    CodeReview,
    GeneralMeeting,
}

impl MeetingType {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingType::Standup => "Standup",
            MeetingType::ClientMeeting => "Client Meeting",
            MeetingType::CodeReview => "Code Review",
            MeetingType::GeneralMeeting => "General Meeting",
        }
    }
}

impl fmt::Display for MeetingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Scanned in order; the first keyword found wins.
const PLATFORM_KEYWORDS: &[(&str, Platform)] = &[
    ("zoom", Platform::Zoom),
    ("meet", Platform::GoogleMeet),
    ("slack", Platform::Slack),
    ("teams", Platform::Zoom),
    ("webex", Platform::Zoom),
];

const MEETING_TYPE_KEYWORDS: &[(&str, MeetingType)] = &[
    ("standup", MeetingType::Standup),
    ("client", MeetingType::ClientMeeting),
    ("review", MeetingType::CodeReview),
];

pub fn detect_platform(file_name: &str) -> Platform {
    let lower = file_name.to_lowercase();
    PLATFORM_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Zoom)
}

pub fn detect_meeting_type(content: &str) -> MeetingType {
    let lower = content.to_lowercase();
    MEETING_TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, kind)| *kind)
        .unwrap_or(MeetingType::GeneralMeeting)
}

// ── Timestamps ──

/// Timestamp capabilities of a file, queried in order of preference.
pub trait TimestampSource {
    fn native_creation_time(&self) -> io::Result<SystemTime>;
    fn change_time(&self) -> io::Result<SystemTime>;
    fn modified_time(&self) -> io::Result<SystemTime>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampOrigin {
    Creation,
    Change,
    Modified,
    Now,
}

impl TimestampSource for Metadata {
    fn native_creation_time(&self) -> io::Result<SystemTime> {
        self.created()
    }

    #[cfg(unix)]
    fn change_time(&self) -> io::Result<SystemTime> {
        use std::os::unix::fs::MetadataExt;
        use std::time::{Duration, UNIX_EPOCH};

        let secs = u64::try_from(self.ctime())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "ctime before epoch"))?;
        let nanos = u32::try_from(self.ctime_nsec()).unwrap_or(0);
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }

    #[cfg(not(unix))]
    fn change_time(&self) -> io::Result<SystemTime> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "inode change time is not available on this platform",
        ))
    }

    fn modified_time(&self) -> io::Result<SystemTime> {
        self.modified()
    }
}

/// First timestamp the source can provide, falling back to the current time.
pub fn resolve_timestamp<S: TimestampSource + ?Sized>(source: &S) -> (SystemTime, TimestampOrigin) {
    if let Ok(t) = source.native_creation_time() {
        return (t, TimestampOrigin::Creation);
    }
    if let Ok(t) = source.change_time() {
        return (t, TimestampOrigin::Change);
    }
    if let Ok(t) = source.modified_time() {
        return (t, TimestampOrigin::Modified);
    }
    (SystemTime::now(), TimestampOrigin::Now)
}

/// Local calendar date the meeting file was created on.
pub fn meeting_date(path: &Path) -> NaiveDate {
    let (timestamp, origin) = match std::fs::metadata(path) {
        Ok(metadata) => resolve_timestamp(&metadata),
        Err(e) => {
            warn!("Failed to get file date, using today: {}", e);
            (SystemTime::now(), TimestampOrigin::Now)
        }
    };
    match origin {
        TimestampOrigin::Creation => {}
        TimestampOrigin::Now => warn!(
            "No timestamp available for {}, using today",
            path.display()
        ),
        other => warn!(
            "Creation time unavailable for {}, using {:?} time",
            path.display(),
            other
        ),
    }
    DateTime::<Local>::from(timestamp).date_naive()
}

/// A transcript file seen on disk, with the metadata inferred from its name and timestamps.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub meeting_date: NaiveDate,
    pub platform: Platform,
}

impl WatchedFile {
    pub fn inspect(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let platform = detect_platform(page_title(&file_name));
        Some(Self {
            meeting_date: meeting_date(path),
            platform,
            path: path.to_path_buf(),
            file_name,
        })
    }

    pub fn title(&self) -> &str {
        page_title(&self.file_name)
    }
}

/// File name with the `.txt` suffix stripped.
pub fn page_title(file_name: &str) -> &str {
    file_name.strip_suffix(".txt").unwrap_or(file_name)
}
