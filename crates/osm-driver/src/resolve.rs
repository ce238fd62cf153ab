use tracing::debug;

use crate::client::CloudClient;
use crate::config::{DriverConfig, NetworkSelector, Selector};
use crate::types::ResolvedIds;
use crate::{Error, ResourceKind, Result};

fn found(kind: ResourceKind, name: &str, id: Option<String>) -> Result<String> {
    let id = id.ok_or_else(|| Error::UnknownResourceName {
        kind,
        name: name.to_string(),
    })?;
    debug!(kind = %kind, name, id = %id, "found id using its name");
    Ok(id)
}

/// Turn every name-based selector into a provider ID.
///
/// Network names and the floating IP pool are only looked up through
/// neutron; in nova-network mode they are passed through unresolved.
pub async fn resolve_ids(client: &dyn CloudClient, config: &DriverConfig) -> Result<ResolvedIds> {
    let auth = config.auth();

    let network_ids = match config.networks() {
        Some(NetworkSelector::Ids(ids)) => ids.clone(),
        Some(NetworkSelector::Names(names)) if !config.nova_network() => {
            client.init_network(auth).await?;
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                let id = client.network_id(name).await?;
                ids.push(found(ResourceKind::Network, name, id)?);
            }
            ids
        }
        Some(NetworkSelector::Names(_)) | None => Vec::new(),
    };

    let flavor_id = match config.flavor() {
        Selector::Id(id) => id.clone(),
        Selector::Name(name) => {
            client.init_compute(auth).await?;
            let id = client.flavor_id(name).await?;
            found(ResourceKind::Flavor, name, id)?
        }
    };

    let image_id = match config.image() {
        Selector::Id(id) => id.clone(),
        Selector::Name(name) => {
            client.init_compute(auth).await?;
            let id = client.image_id(name).await?;
            found(ResourceKind::Image, name, id)?
        }
    };

    let floating_ip_pool_id = match config.floating_ip_pool() {
        Some(pool) if !config.nova_network() => {
            client.init_network(auth).await?;
            let id = client.floating_ip_pool_id(pool).await?;
            Some(found(ResourceKind::FloatingIpPool, pool, id)?)
        }
        _ => None,
    };

    Ok(ResolvedIds {
        flavor_id,
        image_id,
        network_ids,
        floating_ip_pool_id,
    })
}
