//! Media file store
//!
//! Images and videos live in `images/` and `videos/` under one root. Names are
//! timestamped at capture time and validated on every lookup so requests can
//! never leave the kind's directory.

use super::{MediaError, MediaKind, MediaResult};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One stored file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Open the store, creating the kind directories if needed
    pub fn open(root: impl Into<PathBuf>) -> MediaResult<Self> {
        let store = Self { root: root.into() };
        for kind in [MediaKind::Image, MediaKind::Video] {
            fs::create_dir_all(store.dir(kind))?;
        }
        tracing::info!("Media store at {:?}", store.root);
        Ok(store)
    }

    pub fn dir(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Reserve a fresh timestamped path for a new capture, without extension
    pub fn allocate_stem(&self, kind: MediaKind) -> PathBuf {
        let dir = self.dir(kind);
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let base = format!("{}_{}", kind.prefix(), stamp);

        let taken = |stem: &str| {
            kind.extensions()
                .iter()
                .any(|ext| dir.join(format!("{stem}.{ext}")).exists())
        };

        let mut stem = base.clone();
        let mut counter = 1;
        while taken(&stem) {
            stem = format!("{base}_{counter}");
            counter += 1;
        }
        dir.join(stem)
    }

    /// Persist encoded bytes as a new capture and return its path
    pub fn save(&self, kind: MediaKind, bytes: &[u8]) -> MediaResult<PathBuf> {
        let path = self
            .allocate_stem(kind)
            .with_extension(kind.default_extension());
        fs::write(&path, bytes)?;
        tracing::debug!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(path)
    }

    /// Files of a kind, newest first
    pub fn list(&self, kind: MediaKind) -> MediaResult<Vec<MediaEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.dir(kind))? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with('.') {
                continue;
            }
            let time = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(MediaEntry {
                filename,
                size: metadata.len(),
                created_at: DateTime::<Utc>::from(time),
            });
        }

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(entries)
    }

    /// Path of an existing file, after validating the name
    pub fn resolve(&self, kind: MediaKind, filename: &str) -> MediaResult<PathBuf> {
        validate_filename(filename)?;
        let path = self.dir(kind).join(filename);
        if !path.is_file() {
            return Err(MediaError::NotFound(format!("{kind}/{filename}")));
        }
        Ok(path)
    }

    pub fn delete(&self, kind: MediaKind, filename: &str) -> MediaResult<()> {
        let path = self.resolve(kind, filename)?;
        fs::remove_file(&path)?;
        tracing::info!("Deleted {:?}", path);
        Ok(())
    }

    /// Zip every file of a kind into memory
    pub fn archive(&self, kind: MediaKind) -> MediaResult<Vec<u8>> {
        let entries = self.list(kind)?;
        let dir = self.dir(kind);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            let bytes = fs::read(dir.join(&entry.filename))?;
            zip.start_file(entry.filename.as_str(), options)?;
            zip.write_all(&bytes)?;
        }
        let buffer = zip.finish()?.into_inner();

        tracing::info!(
            "Archived {} {} ({} bytes)",
            entries.len(),
            kind,
            buffer.len()
        );
        Ok(buffer)
    }
}

/// Reject anything that is not a plain file name
fn validate_filename(filename: &str) -> MediaResult<()> {
    let invalid = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.contains("..");
    if invalid {
        return Err(MediaError::InvalidName(filename.to_string()));
    }
    Ok(())
}
