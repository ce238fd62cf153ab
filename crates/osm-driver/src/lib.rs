//! OpenStack machine driver.
//!
//! Provisions and manages exactly one Nova instance: resolves names to IDs,
//! provisions an SSH key pair, boots the instance, waits for it to become
//! active, optionally attaches a floating IP and discovers its address.
//! Everything remote goes through the [`CloudClient`] seam.

pub mod address;
pub mod client;
pub mod config;
pub mod driver;
pub mod floating_ip;
pub mod instance;
pub mod keypair;
pub mod openstack;
pub mod resolve;
pub mod types;

use std::fmt;
use std::time::Duration;

pub use address::PollPolicy;
pub use client::CloudClient;
pub use config::{DriverConfig, DriverOptions};
pub use driver::{MachineDriver, OpenStackDriver};
pub use keypair::{KeyGenerator, SshKeygen};
pub use openstack::OpenStackClient;
pub use types::{DriverState, MachineId, MachineState};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("failed to read user data file {path}: {source}")]
    UserData {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to find {kind} named {name}")]
    UnknownResourceName { kind: ResourceKind, name: String },

    #[error("openstack api error: {0}")]
    Api(#[from] openstack_api::Error),

    #[error("no {0} session initialized")]
    NoSession(&'static str),

    #[error("timed out after {timeout:?} waiting for instance {id} to become {status}")]
    Timeout {
        id: MachineId,
        status: String,
        timeout: Duration,
    },

    #[error("instance {0} is in ERROR state")]
    InstanceFailed(MachineId),

    #[error("instance {0} has no network port")]
    NoPort(MachineId),

    #[error("no IP found for the machine")]
    NoIpFound,

    #[error("machine is not running (state: {0})")]
    NotRunning(MachineState),

    #[error("machine has not been created")]
    NotCreated,

    #[error("ssh key generation failed: {0}")]
    KeyGeneration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Create failed and the compensating remove failed too.
    #[error("{source}: {cleanup}")]
    CleanupFailed {
        source: Box<Error>,
        cleanup: Box<Error>,
    },
}

impl Error {
    /// Whether the provider reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resources looked up by name before the instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Flavor,
    Image,
    FloatingIpPool,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Flavor => "flavor",
            Self::Image => "image",
            Self::FloatingIpPool => "floating IP pool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
