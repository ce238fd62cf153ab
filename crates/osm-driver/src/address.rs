use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::client::CloudClient;
use crate::types::{AddressKind, MachineId};
use crate::{Error, Result};

/// Fixed-interval retry budget for address discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    /// 200 attempts, 2 seconds apart.
    fn default() -> Self {
        Self {
            attempts: 200,
            interval: Duration::from_secs(2),
        }
    }
}

impl PollPolicy {
    /// Worst-case time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Poll the instance until it reports an address of the wanted kind and
/// IP version. Request errors end the poll immediately.
pub async fn locate_ip(
    client: &dyn CloudClient,
    id: &MachineId,
    kind: AddressKind,
    version: u8,
    policy: PollPolicy,
) -> Result<String> {
    for attempt in 1..=policy.attempts {
        let addresses = client.instance_addresses(id).await?;
        if let Some(found) = addresses
            .into_iter()
            .find(|a| a.kind == kind && a.version == version)
        {
            debug!(machine_id = %id, ip = %found.address, attempt, "IP address found");
            return Ok(found.address);
        }

        if attempt < policy.attempts {
            sleep(policy.interval).await;
        }
    }

    Err(Error::NoIpFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_about_six_and_a_half_minutes() {
        let policy = PollPolicy::default();
        assert_eq!(policy.attempts, 200);
        assert_eq!(policy.max_wait(), Duration::from_secs(398));
    }
}
