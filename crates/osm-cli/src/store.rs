use std::path::{Path, PathBuf};

use osm_driver::{DriverConfig, DriverState};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{CliError, Result};

const RECORD_FILE: &str = "config.json";
const KEY_FILE: &str = "id_rsa";

/// What the CLI remembers about one machine between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub name: String,
    pub driver: String,
    pub config: DriverConfig,
    #[serde(default)]
    pub state: DriverState,
}

/// Machine records under `<root>/machines/<name>/`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Records carry credentials; keep them readable by the owner only.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(contents).await?;
    file.flush().await
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.root.join("machines").join(name)
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(KEY_FILE)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(RECORD_FILE)
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.record_path(name))
            .await
            .unwrap_or(false)
    }

    /// Create the owner-only machine directory ahead of key generation.
    pub async fn prepare(&self, name: &str) -> Result<PathBuf> {
        let dir = self.machine_dir(name);
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&dir).await.map_err(io_err(&dir))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(io_err(&dir))?;
        }
        Ok(dir)
    }

    pub async fn load(&self, name: &str) -> Result<MachineRecord> {
        let path = self.record_path(name);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::NotFound(name.to_string()));
            }
            Err(e) => return Err(io_err(&path)(e)),
        };
        let record: MachineRecord =
            serde_json::from_slice(&raw).map_err(|source| CliError::Record { path, source })?;
        record.config.validate()?;
        Ok(record)
    }

    pub async fn save(&self, record: &MachineRecord) -> Result<()> {
        let dir = self.prepare(&record.name).await?;
        let path = dir.join(RECORD_FILE);
        let raw = serde_json::to_vec_pretty(record).map_err(|source| CliError::Record {
            path: path.clone(),
            source,
        })?;
        write_private(&path, &raw).await.map_err(io_err(&path))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&dir)(e)),
        }
    }
}
