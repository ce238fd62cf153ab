use serde_json::json;

use crate::types::*;
use crate::{AUTH_HEADER, Result, check};

/// Client for the Nova compute API, bound to one token and endpoint.
#[derive(Clone)]
pub struct ComputeClient {
    token: String,
    endpoint: String,
    http: reqwest::Client,
}

impl ComputeClient {
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

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }

    async fn action(&self, server_id: &str, body: serde_json::Value, endpoint: &'static str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/servers/{server_id}/action")))
            .header(AUTH_HEADER, &self.token)
            .json(&body)
            .send()
            .await?;

        check(resp, endpoint).await?;
        Ok(())
    }

    // ── Flavors & images ────────────────────────────────────────────

    pub async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let resp = self
            .http
            .get(self.url("/flavors"))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let list: FlavorList = check(resp, "list flavors").await?.json().await?;
        Ok(list.flavors)
    }

    pub async fn list_images(&self, name: Option<&str>) -> Result<Vec<Image>> {
        let query: Vec<(&str, &str)> = name.map(|n| vec![("name", n)]).unwrap_or_default();

        let resp = self
            .http
            .get(self.url("/images"))
            .header(AUTH_HEADER, &self.token)
            .query(&query)
            .send()
            .await?;

        let list: ImageList = check(resp, "list images").await?.json().await?;
        Ok(list.images)
    }

    // ── Servers ─────────────────────────────────────────────────────

    pub async fn create_server(&self, req: &CreateServer) -> Result<ServerRef> {
        let resp = self
            .http
            .post(self.url("/servers"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateServerBody { server: req })
            .send()
            .await?;

        let body: ServerRefBody = check(resp, "create server").await?.json().await?;
        Ok(body.server)
    }

    pub async fn get_server(&self, server_id: &str) -> Result<Server> {
        let resp = self
            .http
            .get(self.url(&format!("/servers/{server_id}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let body: ServerBody = check(resp, "get server").await?.json().await?;
        Ok(body.server)
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/servers/{server_id}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        check(resp, "delete server").await?;
        Ok(())
    }

    pub async fn start_server(&self, server_id: &str) -> Result<()> {
        self.action(server_id, json!({ "os-start": null }), "start server")
            .await
    }

    pub async fn stop_server(&self, server_id: &str) -> Result<()> {
        self.action(server_id, json!({ "os-stop": null }), "stop server")
            .await
    }

    /// Soft reboot.
    pub async fn reboot_server(&self, server_id: &str) -> Result<()> {
        self.action(
            server_id,
            json!({ "reboot": { "type": "SOFT" } }),
            "reboot server",
        )
        .await
    }

    // ── Key pairs ───────────────────────────────────────────────────

    pub async fn create_keypair(&self, name: &str, public_key: &str) -> Result<Keypair> {
        let resp = self
            .http
            .post(self.url("/os-keypairs"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateKeypairBody {
                keypair: CreateKeypair { name, public_key },
            })
            .send()
            .await?;

        let body: KeypairBody = check(resp, "create keypair").await?.json().await?;
        Ok(body.keypair)
    }

    pub async fn get_keypair(&self, name: &str) -> Result<Keypair> {
        let resp = self
            .http
            .get(self.url(&format!("/os-keypairs/{name}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let body: KeypairBody = check(resp, "get keypair").await?.json().await?;
        Ok(body.keypair)
    }

    pub async fn delete_keypair(&self, name: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/os-keypairs/{name}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        check(resp, "delete keypair").await?;
        Ok(())
    }

    // ── Floating IPs (nova-network) ─────────────────────────────────

    pub async fn list_floating_ips(&self) -> Result<Vec<NovaFloatingIp>> {
        let resp = self
            .http
            .get(self.url("/os-floating-ips"))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let list: NovaFloatingIpList = check(resp, "list floating ips").await?.json().await?;
        Ok(list.floating_ips)
    }

    pub async fn allocate_floating_ip(&self, pool: &str) -> Result<NovaFloatingIp> {
        let resp = self
            .http
            .post(self.url("/os-floating-ips"))
            .header(AUTH_HEADER, &self.token)
            .json(&json!({ "pool": pool }))
            .send()
            .await?;

        let body: NovaFloatingIpBody = check(resp, "allocate floating ip").await?.json().await?;
        Ok(body.floating_ip)
    }

    pub async fn add_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        self.action(
            server_id,
            json!({ "addFloatingIp": { "address": address } }),
            "add floating ip",
        )
        .await
    }
}
