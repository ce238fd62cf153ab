use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::address::{PollPolicy, locate_ip};
use crate::client::CloudClient;
use crate::config::DriverConfig;
use crate::floating_ip::assign_floating_ip;
use crate::instance::{create_instance, instance_request, wait_for_active};
use crate::keypair::{KeyGenerator, SshKeygen, provision_key_pair};
use crate::openstack::OpenStackClient;
use crate::resolve::resolve_ids;
use crate::types::{
    AddressKind, CreateStage, DriverState, FloatingIpPool, MachineId, MachineState, ResolvedIds,
};
use crate::{Error, Result};

/// Port the container engine listens on inside the machine.
pub const ENGINE_PORT: u16 = 2376;

/// Lifecycle contract a host tool drives for one machine.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    fn driver_name(&self) -> &'static str;

    /// Provision the machine. On failure after the instance exists, the
    /// instance and any owned key pair are removed before returning.
    async fn create(&mut self) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn restart(&mut self) -> Result<()>;

    /// Same as [`MachineDriver::stop`]; there is no forced power-off.
    async fn kill(&mut self) -> Result<()>;

    /// Delete the instance and the key pair the driver created.
    /// A missing instance is not an error.
    async fn remove(&mut self) -> Result<()>;

    async fn state(&self) -> Result<MachineState>;

    async fn ip(&self) -> Result<String>;

    /// `tcp://<ip>:2376`, only while running.
    async fn url(&self) -> Result<String>;

    async fn ssh_hostname(&self) -> Result<String> {
        self.ip().await
    }

    fn ssh_port(&self) -> u16;

    fn ssh_user(&self) -> &str;

    fn ssh_key_path(&self) -> &Path;
}

/// Drives a single OpenStack instance through its lifecycle.
pub struct OpenStackDriver {
    config: DriverConfig,
    state: DriverState,
    stage: CreateStage,
    client: Arc<dyn CloudClient>,
    keygen: Arc<dyn KeyGenerator>,
    ip_poll: PollPolicy,
}

impl OpenStackDriver {
    /// Driver backed by the real OpenStack APIs.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_client(config, Arc::new(OpenStackClient::new()))
    }

    pub fn with_client(config: DriverConfig, client: Arc<dyn CloudClient>) -> Self {
        Self {
            config,
            state: DriverState::default(),
            stage: CreateStage::default(),
            client,
            keygen: Arc::new(SshKeygen),
            ip_poll: PollPolicy::default(),
        }
    }

    pub fn with_key_generator(mut self, keygen: Arc<dyn KeyGenerator>) -> Self {
        self.keygen = keygen;
        self
    }

    pub fn with_ip_poll(mut self, policy: PollPolicy) -> Self {
        self.ip_poll = policy;
        self
    }

    /// Restore state persisted by an earlier process.
    pub fn with_state(mut self, state: DriverState) -> Self {
        self.stage = if state.machine_id.is_some() {
            CreateStage::Ready
        } else {
            CreateStage::Uninitialized
        };
        self.state = state;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// State to persist between invocations.
    pub fn driver_state(&self) -> &DriverState {
        &self.state
    }

    pub fn stage(&self) -> CreateStage {
        self.stage
    }

    fn machine_id(&self) -> Result<&MachineId> {
        self.state.machine_id.as_ref().ok_or(Error::NotCreated)
    }

    fn floating_ip_pool(&self, resolved: &ResolvedIds) -> Option<FloatingIpPool> {
        self.config.floating_ip_pool().map(|name| FloatingIpPool {
            name: name.to_string(),
            id: resolved.floating_ip_pool_id.clone(),
            nova_network: self.config.nova_network(),
        })
    }

    async fn run_create(&mut self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let keygen = Arc::clone(&self.keygen);

        self.stage = CreateStage::Resolving;
        let resolved = resolve_ids(client.as_ref(), &self.config).await?;
        self.state.resolved = Some(resolved.clone());

        self.stage = CreateStage::ProvisioningKey;
        let key_pair = provision_key_pair(client.as_ref(), keygen.as_ref(), &self.config).await?;
        self.state.key_pair = Some(key_pair.clone());

        self.stage = CreateStage::Creating;
        let request = instance_request(&self.config, &resolved, &key_pair);
        let id = match create_instance(client.as_ref(), &self.config, &request).await {
            Ok(id) => id,
            Err(e) => {
                self.discard_key_pair().await;
                return Err(e);
            }
        };
        self.state.machine_id = Some(id.clone());

        self.stage = CreateStage::WaitingActive;
        wait_for_active(client.as_ref(), &id, self.config.active_timeout()).await?;

        if let Some(pool) = self.floating_ip_pool(&resolved) {
            self.stage = CreateStage::AssigningFloatingIp;
            let ip = assign_floating_ip(client.as_ref(), &self.config, &pool, &id).await?;
            self.state.ip_address = Some(ip);
        }

        self.stage = CreateStage::LocatingIp;
        let ip = self.ip().await?;
        self.state.ip_address = Some(ip);

        Ok(())
    }

    /// Best-effort delete of an owned key pair when no instance was created.
    async fn discard_key_pair(&mut self) {
        let Some(key_pair) = self.state.key_pair.take_if(|k| !k.existing) else {
            return;
        };
        debug!(name = %key_pair.name, "deleting key pair after failed instance creation");
        if let Err(e) = self.client.delete_key_pair(&key_pair.name).await {
            warn!(name = %key_pair.name, error = %e, "failed to delete key pair");
        }
    }

    /// Roll back a partially created machine.
    async fn failed_to_create(&mut self, err: Error) -> Error {
        if self.state.machine_id.is_none() {
            self.stage = CreateStage::FailedCreate;
            return err;
        }

        warn!(error = %err, "openstack: create failed, removing the instance");
        let cleanup = self.remove().await;
        self.stage = CreateStage::FailedCreate;

        match cleanup {
            Ok(()) => err,
            Err(cleanup) => Error::CleanupFailed {
                source: Box::new(err),
                cleanup: Box::new(cleanup),
            },
        }
    }
}

#[async_trait]
impl MachineDriver for OpenStackDriver {
    fn driver_name(&self) -> &'static str {
        "openstack"
    }

    async fn create(&mut self) -> Result<()> {
        info!(name = %self.config.machine_name(), "openstack: creating machine");
        match self.run_create().await {
            Ok(()) => {
                self.stage = CreateStage::Ready;
                Ok(())
            }
            Err(e) => Err(self.failed_to_create(e).await),
        }
    }

    async fn start(&mut self) -> Result<()> {
        let id = self.machine_id()?;
        self.client.init_compute(self.config.auth()).await?;
        self.client.start_instance(id).await?;
        info!(machine_id = %id, "openstack: instance started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let id = self.machine_id()?;
        self.client.init_compute(self.config.auth()).await?;
        self.client.stop_instance(id).await?;
        info!(machine_id = %id, "openstack: instance stopped");
        Ok(())
    }

    async fn restart(&mut self) -> Result<()> {
        let id = self.machine_id()?;
        self.client.init_compute(self.config.auth()).await?;
        self.client.restart_instance(id).await?;
        info!(machine_id = %id, "openstack: instance restarted");
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        self.stop().await
    }

    async fn remove(&mut self) -> Result<()> {
        self.client.init_compute(self.config.auth()).await?;

        if let Some(id) = &self.state.machine_id {
            debug!(machine_id = %id, "deleting instance");
            match self.client.delete_instance(id).await {
                Ok(()) => info!(machine_id = %id, "openstack: instance deleted"),
                Err(e) if e.is_not_found() => {
                    warn!(machine_id = %id, "openstack: instance already gone, removing local reference");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(key_pair) = self.state.key_pair.as_ref().filter(|k| !k.existing) {
            debug!(name = %key_pair.name, "deleting key pair");
            match self.client.delete_key_pair(&key_pair.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(name = %key_pair.name, "openstack: key pair already gone");
                }
                Err(e) => return Err(e),
            }
        }

        self.state.machine_id = None;
        self.state.key_pair = None;
        self.state.ip_address = None;
        self.state.resolved = None;
        self.stage = CreateStage::Removed;
        Ok(())
    }

    async fn state(&self) -> Result<MachineState> {
        let Some(id) = &self.state.machine_id else {
            return Ok(MachineState::None);
        };
        self.client.init_compute(self.config.auth()).await?;
        let status = self.client.instance_status(id).await?;
        debug!(machine_id = %id, status = %status, "instance status");
        Ok(MachineState::from_status(&status))
    }

    async fn ip(&self) -> Result<String> {
        if let Some(ip) = &self.state.ip_address {
            return Ok(ip.clone());
        }

        let id = self.machine_id()?;
        self.client.init_compute(self.config.auth()).await?;

        let kind = if self.config.floating_ip_pool().is_some() {
            AddressKind::Floating
        } else {
            AddressKind::Fixed
        };
        debug!(machine_id = %id, kind = ?kind, version = self.config.ip_version(), "looking for the IP address");

        locate_ip(
            self.client.as_ref(),
            id,
            kind,
            self.config.ip_version(),
            self.ip_poll,
        )
        .await
    }

    async fn url(&self) -> Result<String> {
        let state = MachineDriver::state(self).await?;
        if state != MachineState::Running {
            return Err(Error::NotRunning(state));
        }
        let ip = self.ip().await?;
        Ok(engine_url(&ip))
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port()
    }

    fn ssh_user(&self) -> &str {
        self.config.ssh_user()
    }

    fn ssh_key_path(&self) -> &Path {
        self.config.ssh_key_path()
    }
}

fn engine_url(ip: &str) -> String {
    if ip.contains(':') {
        format!("tcp://[{ip}]:{ENGINE_PORT}")
    } else {
        format!("tcp://{ip}:{ENGINE_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_url_brackets_ipv6() {
        assert_eq!(engine_url("192.0.2.10"), "tcp://192.0.2.10:2376");
        assert_eq!(engine_url("2001:db8::5"), "tcp://[2001:db8::5]:2376");
    }
}
