use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::types::JudgeError;
use crate::utils::gen_random_id;

/// Allocates one isolated directory per execution request under a shared
/// temp root. No other module touches the filesystem.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        WorkspaceManager { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a uniquely named empty directory scoped to one request.
    pub async fn acquire(&self) -> Result<Workspace, JudgeError> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            JudgeError::Filesystem(format!(
                "failed to create workspace root {}: {e}",
                self.root.display()
            ))
        })?;

        for _ in 0..4 {
            let dir = self.root.join(gen_random_id(12));
            match fs::create_dir(&dir).await {
                Ok(()) => {
                    return Ok(Workspace {
                        dir,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(JudgeError::Filesystem(format!(
                        "failed to create workspace {}: {e}",
                        dir.display()
                    )));
                }
            }
        }
        Err(JudgeError::Filesystem(
            "could not allocate a unique workspace directory".to_string(),
        ))
    }
}

/// An acquired workspace. Removed on `release`; the `Drop` impl covers every
/// other exit path (error return, panic, cancelled request) so no directory
/// outlives its request.
pub struct Workspace {
    dir: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes a source file inside the workspace. Filenames come from the
    /// toolchain table, but language-mandated names are still validated so
    /// nothing can escape the directory.
    pub async fn write(&self, filename: &str, content: &str) -> Result<PathBuf, JudgeError> {
        validate_filename(filename)?;
        let path = self.dir.join(filename);
        fs::write(&path, content).await.map_err(|e| {
            JudgeError::Filesystem(format!("failed to write {}: {e}", path.display()))
        })?;
        Ok(path)
    }

    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = fs::remove_dir_all(&self.dir).await {
            tracing::warn!("failed to remove workspace {}: {e}", self.dir.display());
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

fn validate_filename(filename: &str) -> Result<(), JudgeError> {
    let mut components = Path::new(filename).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !filename.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(JudgeError::Filesystem(format!(
            "refusing to write outside workspace: {filename:?}"
        )))
    }
}
