use std::time::Duration;

use tracing::{debug, info};

use crate::Result;
use crate::client::CloudClient;
use crate::config::DriverConfig;
use crate::types::{InstanceRequest, KeyPairState, MachineId, ResolvedIds};

/// Nova status of a booted instance.
pub const ACTIVE_STATUS: &str = "ACTIVE";

/// Assemble the boot request from configuration and resolved IDs.
pub fn instance_request(
    config: &DriverConfig,
    resolved: &ResolvedIds,
    key_pair: &KeyPairState,
) -> InstanceRequest {
    InstanceRequest {
        name: config.machine_name.clone(),
        flavor_id: resolved.flavor_id.clone(),
        image_id: resolved.image_id.clone(),
        key_pair_name: key_pair.name.clone(),
        network_ids: resolved.network_ids.clone(),
        security_groups: config.security_groups.clone(),
        user_data: config.user_data.clone(),
        config_drive: config.config_drive,
        availability_zone: config.availability_zone.clone(),
    }
}

/// Submit the instance. Provider errors are returned as-is.
pub async fn create_instance(
    client: &dyn CloudClient,
    config: &DriverConfig,
    request: &InstanceRequest,
) -> Result<MachineId> {
    debug!(
        flavor_id = %request.flavor_id,
        image_id = %request.image_id,
        "creating openstack instance"
    );

    client.init_compute(config.auth()).await?;
    let id = client.create_instance(request).await?;

    info!(machine_id = %id, "openstack: instance created");
    Ok(id)
}

/// Block until the instance is ACTIVE.
pub async fn wait_for_active(
    client: &dyn CloudClient,
    id: &MachineId,
    timeout: Duration,
) -> Result<()> {
    debug!(machine_id = %id, "waiting for the openstack instance to be ACTIVE");
    client
        .wait_for_instance_status(id, ACTIVE_STATUS, timeout)
        .await
}
