//! Local directory backend.
//!
//! Layout under the configured directory:
//!
//! ```text
//! CURRENT                      <- committed generation id
//! state-<gen>.ndjson.gz
//! meta-<gen>.json
//! ```
//!
//! Every file is written to a temp file in the same directory and renamed
//! into place, so readers never observe a partially written file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{codec, generation_date, restore, stale_objects, Generation};
use crate::config::POINTER_FILE;
use crate::error::{Result, TrackerError};
use crate::models::{RollingState, RunMeta};

/// Stores state in a local directory.
pub struct LocalPathBackend {
    dir: PathBuf,
    /// Pointer value seen by the last load/save: `None` = not yet observed.
    observed: Option<Option<String>>,
}

impl LocalPathBackend {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            observed: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the committed state and meta files, if any generation is committed.
    pub fn committed_paths(&self) -> Result<Option<(PathBuf, PathBuf)>> {
        let Some(pointer) = self.read_pointer()? else {
            return Ok(None);
        };
        let generation = Generation::from_pointer(&pointer)?;
        Ok(Some((
            self.dir.join(generation.state_object()),
            self.dir.join(generation.meta_object()),
        )))
    }

    pub fn load(&mut self) -> Result<(RollingState, RunMeta)> {
        let pointer = self.read_pointer()?;
        self.observed = Some(pointer.clone());

        let Some(pointer) = pointer else {
            info!(dir = %self.dir.display(), "no committed state found; starting empty");
            return Ok((RollingState::default(), RunMeta::default()));
        };

        let generation = Generation::from_pointer(&pointer)?;
        let state_bytes = self.read_object(&generation.state_object())?;
        let meta_bytes = self.read_object(&generation.meta_object())?;
        let (state, meta) = restore(&state_bytes, &meta_bytes)?;

        info!(
            dir = %self.dir.display(),
            generation = %generation,
            keys = state.len(),
            rows = state.row_count(),
            "loaded state"
        );
        Ok((state, meta))
    }

    pub fn save(&mut self, state: &RollingState, meta: &RunMeta) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(unavailable)?;

        let state_bytes = codec::encode_state(state)?;
        let meta_bytes = codec::encode_meta(meta)?;
        let generation = Generation::new(generation_date(meta));

        let staged = [
            (generation.state_object(), state_bytes),
            (generation.meta_object(), meta_bytes),
        ];
        for (name, bytes) in &staged {
            if let Err(e) = self.write_atomic(name, bytes) {
                self.discard(&generation);
                return Err(unavailable(e));
            }
        }

        let current = self.read_pointer()?;
        if let Some(expected) = &self.observed {
            if *expected != current {
                self.discard(&generation);
                return Err(TrackerError::Conflict(format!(
                    "{} changed since load (expected {:?}, found {:?})",
                    self.dir.join(POINTER_FILE).display(),
                    expected,
                    current
                )));
            }
        }

        if let Err(e) = self.write_atomic(POINTER_FILE, generation.as_str().as_bytes()) {
            self.discard(&generation);
            return Err(unavailable(e));
        }
        self.observed = Some(Some(generation.as_str().to_string()));
        info!(
            dir = %self.dir.display(),
            generation = %generation,
            rows = state.row_count(),
            "committed state"
        );

        // An unparseable previous pointer keeps nothing but the new generation.
        let previous = current.as_deref().and_then(|g| Generation::from_pointer(g).ok());
        let mut keep = vec![&generation];
        if let Some(previous) = &previous {
            keep.push(previous);
        }
        self.prune(&keep);
        Ok(())
    }

    fn read_pointer(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(POINTER_FILE)) {
            Ok(s) if s.trim().is_empty() => Err(TrackerError::StateCorrupt(format!(
                "{} is empty",
                self.dir.join(POINTER_FILE).display()
            ))),
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn read_object(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TrackerError::StateCorrupt(
                format!("committed object {} is missing", path.display()),
            )),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Best-effort removal of a generation that was never promoted.
    fn discard(&self, generation: &Generation) {
        for name in [generation.state_object(), generation.meta_object()] {
            let _ = fs::remove_file(self.dir.join(name));
        }
    }

    fn prune(&self, keep: &[&Generation]) {
        let names: Vec<String> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot list state directory for pruning");
                return;
            }
        };
        for name in stale_objects(&names, keep) {
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => debug!(object = %name, "pruned old state object"),
                Err(e) => warn!(object = %name, error = %e, "failed to prune old state object"),
            }
        }
    }
}

fn unavailable(e: io::Error) -> TrackerError {
    TrackerError::BackendUnavailable(e.to_string())
}
