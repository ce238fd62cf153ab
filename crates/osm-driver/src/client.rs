use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::config::AuthOptions;
use crate::types::{Address, FloatingIp, FloatingIpPool, InstanceRequest, MachineId};

/// Capability set the driver needs from the cloud.
///
/// [`crate::OpenStackClient`] talks to a real OpenStack deployment. Session
/// initialization is expected to be idempotent: the driver re-initializes
/// before every operation.
#[async_trait]
pub trait CloudClient: Send + Sync + 'static {
    /// Obtain (or reuse) an identity token.
    async fn authenticate(&self, auth: &AuthOptions) -> Result<()>;

    /// Bind a compute-scoped session. Requires a prior `authenticate`.
    async fn init_compute_client(&self, auth: &AuthOptions) -> Result<()>;

    /// Bind a network-scoped session. Requires a prior `authenticate`.
    async fn init_network_client(&self, auth: &AuthOptions) -> Result<()>;

    // Name resolution. `Ok(None)` means the provider knows no such name.

    async fn network_id(&self, name: &str) -> Result<Option<String>>;

    async fn flavor_id(&self, name: &str) -> Result<Option<String>>;

    async fn image_id(&self, name: &str) -> Result<Option<String>>;

    async fn floating_ip_pool_id(&self, name: &str) -> Result<Option<String>>;

    // Instances

    async fn create_instance(&self, req: &InstanceRequest) -> Result<MachineId>;

    async fn start_instance(&self, id: &MachineId) -> Result<()>;

    async fn stop_instance(&self, id: &MachineId) -> Result<()>;

    async fn restart_instance(&self, id: &MachineId) -> Result<()>;

    async fn delete_instance(&self, id: &MachineId) -> Result<()>;

    async fn instance_status(&self, id: &MachineId) -> Result<String>;

    /// Block until the instance reports `status`, fails, or `timeout` passes.
    async fn wait_for_instance_status(
        &self,
        id: &MachineId,
        status: &str,
        timeout: Duration,
    ) -> Result<()>;

    async fn instance_addresses(&self, id: &MachineId) -> Result<Vec<Address>>;

    // Floating IPs

    async fn floating_ips(&self, pool: &FloatingIpPool) -> Result<Vec<FloatingIp>>;

    async fn allocate_floating_ip(&self, pool: &FloatingIpPool) -> Result<FloatingIp>;

    async fn assign_floating_ip(
        &self,
        id: &MachineId,
        pool: &FloatingIpPool,
        ip: &FloatingIp,
    ) -> Result<()>;

    // Key pairs

    async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()>;

    async fn public_key(&self, name: &str) -> Result<String>;

    async fn delete_key_pair(&self, name: &str) -> Result<()>;

    /// Authenticate and bind the compute session.
    async fn init_compute(&self, auth: &AuthOptions) -> Result<()> {
        self.authenticate(auth).await?;
        self.init_compute_client(auth).await
    }

    /// Authenticate and bind the network session.
    async fn init_network(&self, auth: &AuthOptions) -> Result<()> {
        self.authenticate(auth).await?;
        self.init_network_client(auth).await
    }
}
