use crate::types::*;
use crate::{AUTH_HEADER, Result, check};

/// Client for the Neutron network API, bound to one token and endpoint.
#[derive(Clone)]
pub struct NetworkClient {
    token: String,
    endpoint: String,
    http: reqwest::Client,
}

impl NetworkClient {
    pub fn new(http: reqwest::Client, token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The catalog usually lists neutron without its version prefix.
    fn url(&self, path: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if base.ends_with("/v2.0") {
            format!("{base}{path}")
        } else {
            format!("{base}/v2.0{path}")
        }
    }

    // ── Networks ────────────────────────────────────────────────────

    pub async fn list_networks(&self, name: Option<&str>) -> Result<Vec<Network>> {
        let query: Vec<(&str, &str)> = name.map(|n| vec![("name", n)]).unwrap_or_default();

        let resp = self
            .http
            .get(self.url("/networks"))
            .header(AUTH_HEADER, &self.token)
            .query(&query)
            .send()
            .await?;

        let list: NetworkList = check(resp, "list networks").await?.json().await?;
        Ok(list.networks)
    }

    // ── Ports ───────────────────────────────────────────────────────

    pub async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>> {
        let resp = self
            .http
            .get(self.url("/ports"))
            .header(AUTH_HEADER, &self.token)
            .query(&[("device_id", device_id)])
            .send()
            .await?;

        let list: PortList = check(resp, "list ports").await?.json().await?;
        Ok(list.ports)
    }

    // ── Floating IPs ────────────────────────────────────────────────

    pub async fn list_floating_ips(&self, floating_network_id: &str) -> Result<Vec<FloatingIp>> {
        let resp = self
            .http
            .get(self.url("/floatingips"))
            .header(AUTH_HEADER, &self.token)
            .query(&[("floating_network_id", floating_network_id)])
            .send()
            .await?;

        let list: FloatingIpList = check(resp, "list floating ips").await?.json().await?;
        Ok(list.floatingips)
    }

    pub async fn create_floating_ip(&self, req: &CreateFloatingIp) -> Result<FloatingIp> {
        let resp = self
            .http
            .post(self.url("/floatingips"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateFloatingIpBody { floatingip: req })
            .send()
            .await?;

        let body: FloatingIpBody = check(resp, "create floating ip").await?.json().await?;
        Ok(body.floatingip)
    }

    /// Associate (`Some(port)`) or disassociate (`None`) a floating IP.
    pub async fn update_floating_ip(&self, id: &str, port_id: Option<&str>) -> Result<FloatingIp> {
        let resp = self
            .http
            .put(self.url(&format!("/floatingips/{id}")))
            .header(AUTH_HEADER, &self.token)
            .json(&UpdateFloatingIpBody {
                floatingip: UpdateFloatingIp { port_id },
            })
            .send()
            .await?;

        let body: FloatingIpBody = check(resp, "update floating ip").await?.json().await?;
        Ok(body.floatingip)
    }
}
