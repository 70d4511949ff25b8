//! Scratch files for fetched and decoded artifacts
//!
//! The latest playlist, segment and decoded PCM are written to fixed names
//! inside one directory and overwritten every cycle. Nothing reads them
//! back; they exist for inspecting what the player last saw.

use crate::error::Result;
use piradio_common::PlayerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Kind of staged artifact, one file each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Playlist,
    Segment,
    Pcm,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Playlist => "piradio.m3u8",
            Artifact::Segment => "piradio.ts",
            Artifact::Pcm => "piradio.pcm",
        }
    }
}

/// Directory holding staged artifacts; disabled when `dir` is None
#[derive(Debug, Clone, Default)]
pub struct ScratchArea {
    dir: Option<PathBuf>,
}

impl ScratchArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A scratch area that writes nothing
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        if config.stage_artifacts {
            Self::new(config.resolved_scratch_dir())
        } else {
            Self::disabled()
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn path(&self, artifact: Artifact) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(artifact.file_name()))
    }

    /// Create the directory
    pub fn prepare(&self) -> Result<()> {
        if let Some(dir) = &self.dir {
            fs::create_dir_all(dir)?;
            debug!("Scratch directory ready: {}", dir.display());
        }
        Ok(())
    }

    /// Overwrite the artifact's file with `bytes`
    ///
    /// Failures are logged, never returned: playback does not depend on
    /// staging.
    pub fn stage(&self, artifact: Artifact, bytes: &[u8]) {
        let Some(path) = self.path(artifact) else {
            return;
        };
        if let Err(e) = fs::write(&path, bytes) {
            warn!("Failed to stage {}: {}", path.display(), e);
        }
    }
}
