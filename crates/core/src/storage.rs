//! Per-job working directory tree.
//!
//! Each job owns `<root>/<job_id>/` exclusively:
//!
//! ```text
//! <root>/<job_id>/original/<uploaded file>
//! <root>/<job_id>/converted/<stem>.html
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::types::JobId;

/// Subdirectory holding the uploaded source document.
pub const ORIGINAL_DIR: &str = "original";

/// Subdirectory the converter writes into.
pub const CONVERTED_DIR: &str = "converted";

/// Extension of the converter's output artifact.
pub const ARTIFACT_EXTENSION: &str = "html";

/// Mode applied to the output directory so it is externally readable.
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Mode applied to the output artifact.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Root of all job working directories.
#[derive(Debug, Clone)]
pub struct JobStorage {
    root: PathBuf,
}

impl JobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Paths of the tree owned by `job_id`. Nothing is touched on disk.
    pub fn job(&self, job_id: JobId) -> JobPaths {
        let job_dir = self.root.join(job_id.to_string());
        JobPaths {
            original_dir: job_dir.join(ORIGINAL_DIR),
            converted_dir: job_dir.join(CONVERTED_DIR),
            job_dir,
        }
    }
}

/// The working directory tree of a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub job_dir: PathBuf,
    pub original_dir: PathBuf,
    pub converted_dir: PathBuf,
}

impl JobPaths {
    /// Create `original/` and `converted/`, including the job directory.
    pub async fn create(&self) -> io::Result<()> {
        for dir in [&self.original_dir, &self.converted_dir] {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(DIR_MODE);
            builder.create(dir).await?;
        }
        Ok(())
    }

    /// Where the uploaded document is stored, keeping its original name.
    pub fn original_file(&self, filename: &str) -> PathBuf {
        self.original_dir.join(filename)
    }

    /// Stream `content` into `original/<filename>` and return the path.
    pub async fn save_original<R>(&self, filename: &str, content: &mut R) -> io::Result<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.original_file(filename);
        let mut file = tokio::fs::File::create(&path).await?;
        tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        Ok(path)
    }

    /// The artifact the converter is expected to produce for `filename`:
    /// `converted/<name without its last extension>.html`. Inner dots are
    /// kept, so `q3.summary.docx` maps to `q3.summary.html`.
    pub fn expected_artifact(&self, filename: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.converted_dir.join(format!("{stem}.{ARTIFACT_EXTENSION}"))
    }

    /// Make the output directory and artifact readable by other processes.
    pub async fn normalize_permissions(&self, artifact: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;

            tokio::fs::set_permissions(&self.converted_dir, Permissions::from_mode(DIR_MODE))
                .await?;
            tokio::fs::set_permissions(artifact, Permissions::from_mode(FILE_MODE)).await?;
        }
        #[cfg(not(unix))]
        {
            tokio::fs::metadata(artifact).await?;
        }
        Ok(())
    }

    /// Remove the whole job tree. A tree that was never created counts as removed.
    pub async fn remove(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.job_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
