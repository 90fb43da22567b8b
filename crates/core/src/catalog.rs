//! The frame catalog: an ordered, id-addressable view of the frame images in
//! an output directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Extensions recognized as frame images (compared case-insensitively).
pub const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const FRAME_NAME_PATTERN: &str = r"(?i)^frame_(\d+)\.(jpg|jpeg|png)$";

static FRAME_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FRAME_NAME_PATTERN).expect("valid regex"));

/// A single extracted frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    /// File name as written by the extractor, e.g. `frame_12.jpg`.
    pub id: String,
    /// Number embedded in the file name. Never renumbered.
    pub ordinal: u64,
    pub size_bytes: u64,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Frames of one extraction result, sorted by ascending ordinal.
#[derive(Debug, Clone, Default)]
pub struct FrameCatalog {
    frames: Vec<FrameRecord>,
    index: HashMap<String, usize>,
}

impl FrameCatalog {
    /// Build a catalog from records in any order.
    ///
    /// Records are sorted numerically by ordinal; a repeated id keeps the
    /// first occurrence.
    pub fn from_records(records: impl IntoIterator<Item = FrameRecord>) -> Self {
        let mut frames: Vec<FrameRecord> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for record in records {
            if seen.insert(record.id.clone()) {
                frames.push(record);
            }
        }
        frames.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));

        let index = frames
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();

        Self { frames, index }
    }

    /// Scan `dir` for frame images. A missing directory is an empty catalog.
    pub async fn scan(dir: &Path) -> std::io::Result<Self> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(ordinal) = parse_ordinal(name) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            records.push(FrameRecord {
                id: name.to_string(),
                ordinal,
                size_bytes: metadata.len(),
                path: entry.path(),
            });
        }

        Ok(Self::from_records(records))
    }

    pub fn list(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(|f| f.id.as_str())
    }

    pub fn resolve(&self, id: &str) -> Option<&FrameRecord> {
        self.index.get(id).map(|&i| &self.frames[i])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.frames.iter().map(|f| f.size_bytes).sum()
    }
}

/// Ordinal of a catalog file name such as `frame_7.jpg`, or `None` when the
/// name does not follow the frame naming convention.
pub fn parse_ordinal(name: &str) -> Option<u64> {
    FRAME_NAME_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether `name` carries a frame image extension, regardless of the rest
/// of the name. Used when purging a directory.
pub fn is_frame_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
