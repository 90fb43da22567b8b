//! Assembling zip bundles from a selection of cataloged frames.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::{FrameCatalog, FrameRecord};
use crate::error::CoreError;

/// MIME type of an assembled bundle.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A caller's frame selection, de-duplicated with first-seen order kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveRequest {
    ids: Vec<String>,
}

impl ArchiveRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let ids = ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| seen.insert(id.clone()))
            .collect();
        Self { ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The requested frames that exist in `catalog`. Unknown ids are dropped.
    ///
    /// Fails with [`CoreError::NoFramesSelected`] for an empty request and
    /// [`CoreError::NoValidFrames`] when nothing matches.
    pub fn validate<'a>(&self, catalog: &'a FrameCatalog) -> Result<Vec<&'a FrameRecord>, CoreError> {
        if self.is_empty() {
            return Err(CoreError::NoFramesSelected);
        }

        let mut frames = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            match catalog.resolve(id) {
                Some(frame) => frames.push(frame),
                None => tracing::debug!(id = %id, "Dropping unknown frame from archive request"),
            }
        }

        if frames.is_empty() {
            return Err(CoreError::NoValidFrames);
        }
        Ok(frames)
    }
}

/// A finished in-memory zip, ready to be streamed once.
#[derive(Debug, Clone)]
pub struct ArchiveBundle {
    pub file_name: String,
    pub frames: Vec<String>,
    pub bytes: Vec<u8>,
}

/// `frames_YYYYMMDD_HHMMSS.zip` for the given creation time.
pub fn archive_file_name(now: DateTime<Utc>) -> String {
    format!("frames_{}.zip", now.format("%Y%m%d_%H%M%S"))
}

/// Validate `request` against `catalog`, read the selected frame files, and
/// zip them under their bare ids.
///
/// The caller must keep the catalog's files stable (no purge) until this
/// returns.
pub async fn assemble(
    catalog: &FrameCatalog,
    request: &ArchiveRequest,
    now: DateTime<Utc>,
) -> Result<ArchiveBundle, CoreError> {
    let frames = request.validate(catalog)?;

    let mut entries = Vec::with_capacity(frames.len());
    for frame in frames {
        let data = tokio::fs::read(&frame.path).await?;
        entries.push((frame.id.clone(), data));
    }

    let frame_ids: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
    let bytes = tokio::task::spawn_blocking(move || write_zip(entries))
        .await
        .map_err(|e| CoreError::Archive(format!("archive task failed: {e}")))??;

    let file_name = archive_file_name(now);
    tracing::info!(file_name = %file_name, frames = frame_ids.len(), size_bytes = bytes.len(), "Assembled frame archive");

    Ok(ArchiveBundle {
        file_name,
        frames: frame_ids,
        bytes,
    })
}

/// Write `(name, data)` pairs into a flat zip held in memory.
fn write_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, CoreError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::path::Path;

    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    async fn catalog_with(dir: &Path, names: &[&str]) -> FrameCatalog {
        for name in names {
            std::fs::write(dir.join(name), format!("pixels of {name}")).expect("write frame");
        }
        FrameCatalog::scan(dir).await.expect("scan")
    }

    fn member_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open zip");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn request_deduplicates_keeping_first_order() {
        let request = ArchiveRequest::new(["frame_2.jpg", "frame_1.jpg", "frame_2.jpg"]);
        assert_eq!(request.ids(), ["frame_2.jpg", "frame_1.jpg"]);
    }

    #[test]
    fn file_name_embeds_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(archive_file_name(now), "frames_20240305_070809.zip");
    }

    #[tokio::test]
    async fn empty_request_is_no_selection() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let catalog = catalog_with(dir.path(), &["frame_1.jpg"]).await;

        let result = assemble(&catalog, &ArchiveRequest::default(), Utc::now()).await;
        assert_matches!(result, Err(CoreError::NoFramesSelected));
    }

    #[tokio::test]
    async fn unknown_ids_only_is_no_match() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let catalog = catalog_with(dir.path(), &["frame_1.jpg"]).await;

        let result = assemble(&catalog, &ArchiveRequest::new(["frame_999.jpg"]), Utc::now()).await;
        assert_matches!(result, Err(CoreError::NoValidFrames));
    }

    #[tokio::test]
    async fn unknown_ids_are_dropped() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let catalog = catalog_with(dir.path(), &["frame_1.jpg", "frame_2.jpg"]).await;

        let bundle = assemble(
            &catalog,
            &ArchiveRequest::new(["frame_1.jpg", "bogus.jpg"]),
            Utc::now(),
        )
        .await
        .expect("assemble");

        assert_eq!(bundle.frames, ["frame_1.jpg"]);
        assert_eq!(member_names(&bundle.bytes), ["frame_1.jpg"]);

        let mut archive = zip::ZipArchive::new(Cursor::new(&bundle.bytes)).expect("open zip");
        let mut content = String::new();
        archive
            .by_name("frame_1.jpg")
            .expect("member")
            .read_to_string(&mut content)
            .expect("read member");
        assert_eq!(content, "pixels of frame_1.jpg");
    }

    #[tokio::test]
    async fn same_selection_gives_same_members() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let catalog = catalog_with(dir.path(), &["frame_1.jpg", "frame_2.jpg", "frame_10.jpg"]).await;
        let request = ArchiveRequest::new(["frame_10.jpg", "frame_2.jpg", "frame_10.jpg"]);

        let first = assemble(&catalog, &request, Utc::now()).await.expect("first");
        let second = assemble(&catalog, &request, Utc::now()).await.expect("second");

        assert_eq!(member_names(&first.bytes), ["frame_10.jpg", "frame_2.jpg"]);
        assert_eq!(member_names(&first.bytes), member_names(&second.bytes));
    }
}
