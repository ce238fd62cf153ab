use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::client::CloudClient;
use crate::config::{DriverConfig, ExistingKeyPair};
use crate::types::KeyPairState;
use crate::{Error, Result};

/// Creates a local SSH key pair: private key at `path`, public key at `path.pub`.
#[async_trait]
pub trait KeyGenerator: Send + Sync + 'static {
    async fn generate(&self, path: &Path) -> Result<()>;
}

/// Generates keys with the system `ssh-keygen`.
pub struct SshKeygen;

#[async_trait]
impl KeyGenerator for SshKeygen {
    async fn generate(&self, path: &Path) -> Result<()> {
        for stale in [path.to_path_buf(), public_key_path(path)] {
            match tokio::fs::remove_file(&stale).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "2048", "-N", "", "-q", "-f"])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::KeyGeneration(format!("failed to run ssh-keygen: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::KeyGeneration(format!(
                "ssh-keygen exited with {}: {stderr}",
                output.status
            )));
        }

        Ok(())
    }
}

/// `<private>.pub`
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = private_key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Key pair names may not contain dots.
pub fn sanitize_key_pair_name(name: &str) -> String {
    name.replace('.', "_")
}

fn random_id() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Unique, sanitized key pair name for a machine.
pub fn generate_key_pair_name(machine_name: &str) -> String {
    sanitize_key_pair_name(&format!("{machine_name}-{}", random_id()))
}

/// Write key material readable by the owner only.
async fn write_key(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;

    // Mode only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

/// Copy an existing key pair into the machine directory.
pub async fn import_key_pair(
    client: &dyn CloudClient,
    config: &DriverConfig,
    existing: &ExistingKeyPair,
) -> Result<KeyPairState> {
    debug!(name = %existing.name, "loading key pair");
    client.init_compute(config.auth()).await?;

    debug!(path = %existing.private_key_file.display(), "loading private key");
    let private_key = tokio::fs::read(&existing.private_key_file).await?;
    let public_key = client.public_key(&existing.name).await?;

    write_key(config.ssh_key_path(), &private_key).await?;
    write_key(&public_key_path(config.ssh_key_path()), public_key.as_bytes()).await?;

    Ok(KeyPairState {
        name: existing.name.clone(),
        existing: true,
    })
}

/// Generate a fresh key pair and register its public half.
pub async fn generate_key_pair(
    client: &dyn CloudClient,
    keygen: &dyn KeyGenerator,
    config: &DriverConfig,
) -> Result<KeyPairState> {
    let name = generate_key_pair_name(config.machine_name());
    debug!(name = %name, "creating key pair");

    keygen.generate(config.ssh_key_path()).await?;
    let public_key = tokio::fs::read_to_string(public_key_path(config.ssh_key_path())).await?;

    client.init_compute(config.auth()).await?;
    client.create_key_pair(&name, public_key.trim()).await?;
    info!(name = %name, "openstack: key pair registered");

    Ok(KeyPairState {
        name,
        existing: false,
    })
}

/// Import the configured key pair, or generate one when none is configured.
pub async fn provision_key_pair(
    client: &dyn CloudClient,
    keygen: &dyn KeyGenerator,
    config: &DriverConfig,
) -> Result<KeyPairState> {
    match config.existing_key_pair() {
        Some(existing) => import_key_pair(client, config, existing).await,
        None => generate_key_pair(client, keygen, config).await,
    }
}
