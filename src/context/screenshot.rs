use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::agent::error::EngineError;
use crate::context::history::BoundedHistory;

/// Ephemeral, bounded home for screenshot artifacts.
///
/// Files live in a private temporary directory removed on drop. At most
/// `capacity` files exist at once; registering one more deletes the oldest.
/// Consuming a screenshot encodes it and deletes the file.
pub struct ScreenshotStore {
    dir: TempDir,
    files: BoundedHistory<PathBuf>,
    counter: u64,
}

impl ScreenshotStore {
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        let dir = tempfile::Builder::new()
            .prefix("aria-pilot-shots-")
            .tempdir()
            .map_err(|e| EngineError::io("creating screenshot directory", e))?;

        Ok(Self {
            dir,
            files: BoundedHistory::new(capacity),
            counter: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Next path to write a screenshot to. Not tracked until registered.
    pub fn next_path(&mut self) -> PathBuf {
        self.counter += 1;
        self.dir.path().join(format!("shot-{:05}.png", self.counter))
    }

    pub fn register(&mut self, path: PathBuf) {
        if let Some(evicted) = self.files.push(path) {
            remove_quietly(&evicted);
        }
    }

    /// Read, base64-encode and delete a screenshot.
    pub fn consume(&mut self, path: &Path) -> Result<String, EngineError> {
        let bytes = fs::read(path).map_err(|e| EngineError::io(format!("reading {}", path.display()), e))?;
        let encoded = STANDARD.encode(&bytes);
        drop(bytes);

        self.discard(path);
        debug!(path = %path.display(), "screenshot consumed");
        Ok(encoded)
    }

    /// Delete a screenshot without reading it.
    pub fn discard(&mut self, path: &Path) {
        remove_quietly(path);
        let kept: Vec<PathBuf> = self.files.iter().filter(|p| p.as_path() != path).cloned().collect();
        self.files.clear();
        for p in kept {
            self.files.push(p);
        }
    }

    /// Tracked files that still exist on disk.
    pub fn len(&self) -> usize {
        self.files.iter().filter(|p| p.exists()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove screenshot");
        }
    }
}
