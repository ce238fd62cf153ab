use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque provider-side instance identifier (Nova server ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(pub String);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Machine state as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    None,
    Running,
    Paused,
    Saved,
    Stopped,
    Starting,
    Error,
}

impl MachineState {
    /// Map a Nova server status. Transitional and unknown statuses map to `None`.
    pub fn from_status(status: &str) -> Self {
        match status {
            "ACTIVE" => Self::Running,
            "PAUSED" => Self::Paused,
            "SUSPENDED" => Self::Saved,
            "SHUTOFF" => Self::Stopped,
            "BUILDING" => Self::Starting,
            "ERROR" => Self::Error,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Saved => "Saved",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the create sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreateStage {
    #[default]
    Uninitialized,
    Resolving,
    ProvisioningKey,
    Creating,
    WaitingActive,
    AssigningFloatingIp,
    LocatingIp,
    Ready,
    FailedCreate,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    Fixed,
    Floating,
}

/// One address attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub address: String,
    pub kind: AddressKind,
    pub version: u8,
}

/// A floating IP as listed in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: String,
    pub ip: String,
    /// Port (neutron) or instance (nova-network) the IP is attached to.
    pub port_id: Option<String>,
}

impl FloatingIp {
    /// Unattached IPs can be reused.
    pub fn is_available(&self) -> bool {
        self.port_id.as_deref().is_none_or(str::is_empty)
    }
}

/// Floating IP pool a driver allocates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIpPool {
    pub name: String,
    /// External network ID; unset in nova-network mode.
    pub id: Option<String>,
    pub nova_network: bool,
}

/// Key pair used by the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairState {
    pub name: String,
    /// Imported key pairs are never deleted by the driver.
    pub existing: bool,
}

/// Provider IDs resolved from the configured selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIds {
    pub flavor_id: String,
    pub image_id: String,
    pub network_ids: Vec<String>,
    pub floating_ip_pool_id: Option<String>,
}

/// Everything Nova needs to boot the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    pub key_pair_name: String,
    pub network_ids: Vec<String>,
    pub security_groups: Vec<String>,
    pub user_data: Option<Vec<u8>>,
    pub config_drive: bool,
    pub availability_zone: Option<String>,
}

/// Mutable driver state the host persists between invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverState {
    #[serde(default)]
    pub machine_id: Option<MachineId>,
    #[serde(default)]
    pub key_pair: Option<KeyPairState>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub resolved: Option<ResolvedIds>,
}
