//! Per-request workspace directories.
//!
//! Every analysis request gets a uniquely named directory tree under the
//! response root. All later stages resolve paths through the handle, so
//! requests can never write into each other's areas.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::info;

use crate::error::{PipelineError, Result};

const SUB_AREAS: [&str; 6] = ["code", "data", "graphs", "stats", "description", "output"];

/// Handle to one request's directory tree. Cloning is cheap; the handle
/// carries paths only, never open file descriptors.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace with a collision-resistant name
    /// (`request_<timestamp>_<random hex>`), including all six sub-areas.
    ///
    /// On any creation failure the partially created tree is removed and
    /// no handle is returned.
    pub fn create(base: &Path) -> Result<Self> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix: u32 = rand::thread_rng().gen();
        let name = format!("request_{}_{:08x}", timestamp, suffix);
        let root = base.join(name);

        fs::create_dir_all(&root)
            .map_err(|e| PipelineError::storage_io(format!("create {}", root.display()), e))?;

        for sub in SUB_AREAS {
            if let Err(e) = fs::create_dir_all(root.join(sub)) {
                // Do not leave a half-built workspace behind as "current".
                let _ = fs::remove_dir_all(&root);
                return Err(PipelineError::storage_io(
                    format!("create sub-area {} in {}", sub, root.display()),
                    e,
                ));
            }
        }

        info!(workspace = %root.display(), "created request workspace");
        Ok(Self { root })
    }

    /// The workspace id is its directory name.
    pub fn id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn graphs_dir(&self) -> PathBuf {
        self.root.join("graphs")
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.root.join("stats")
    }

    pub fn description_dir(&self) -> PathBuf {
        self.root.join("description")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Path of the single generated artifact for this request.
    pub fn artifact_path(&self) -> PathBuf {
        self.code_dir().join("generated_analysis_code.py")
    }
}

/// Remove every file in `dir` whose name ends with `suffix`. A deletion
/// failure aborts: a partial purge must not silently proceed.
pub fn purge_by_suffix(dir: &Path, suffix: &str) -> Result<usize> {
    let entries = fs::read_dir(dir)
        .map_err(|e| PipelineError::storage_io(format!("read {}", dir.display()), e))?;
    let mut removed = 0;
    for entry in entries {
        let entry =
            entry.map_err(|e| PipelineError::storage_io(format!("read {}", dir.display()), e))?;
        let path = entry.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(suffix))
            .unwrap_or(false);
        if is_match && path.is_file() {
            fs::remove_file(&path)
                .map_err(|e| PipelineError::storage_io(format!("remove {}", path.display()), e))?;
            removed += 1;
        }
    }
    Ok(removed)
}
