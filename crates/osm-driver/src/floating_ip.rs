use tracing::{debug, info};

use crate::Result;
use crate::client::CloudClient;
use crate::config::DriverConfig;
use crate::types::{FloatingIp, FloatingIpPool, MachineId};

/// First unattached IP in listing order.
pub fn pick_available(ips: &[FloatingIp]) -> Option<&FloatingIp> {
    ips.iter().find(|ip| ip.is_available())
}

/// Attach a floating IP from `pool` to the instance, reusing a free one
/// when possible. Returns the attached address.
pub async fn assign_floating_ip(
    client: &dyn CloudClient,
    config: &DriverConfig,
    pool: &FloatingIpPool,
    id: &MachineId,
) -> Result<String> {
    if pool.nova_network {
        client.init_compute(config.auth()).await?;
    } else {
        client.init_network(config.auth()).await?;
    }

    debug!(machine_id = %id, pool = %pool.name, "looking for an available floating IP");
    let ips = client.floating_ips(pool).await?;

    let ip = match pick_available(&ips) {
        Some(ip) => {
            debug!(machine_id = %id, ip = %ip.ip, "available floating IP found");
            ip.clone()
        }
        None => {
            debug!(machine_id = %id, "no available floating IP found, allocating a new one");
            client.allocate_floating_ip(pool).await?
        }
    };

    client.assign_floating_ip(id, pool, &ip).await?;
    info!(machine_id = %id, ip = %ip.ip, "openstack: floating IP assigned");

    Ok(ip.ip)
}
