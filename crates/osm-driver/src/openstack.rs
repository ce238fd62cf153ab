use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openstack_api::{
    AuthMethod, AuthRequest, ComputeClient, CreateFloatingIp, CreateServer, DomainRef,
    HttpClient, IdentityClient, Interface, NetworkClient, ProjectRef, Scope, SecurityGroupRef,
    ServerNetwork, TlsOptions, Token, UserRef,
};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::client::CloudClient;
use crate::config::{AuthOptions, Credentials, EndpointType, Scoping};
use crate::types::{Address, AddressKind, FloatingIp, FloatingIpPool, InstanceRequest, MachineId};
use crate::{Error, ResourceKind, Result};

/// Tokens this close to expiry are renewed.
const TOKEN_RENEW_MARGIN_MINUTES: i64 = 5;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Session {
    http: Option<HttpClient>,
    token: Option<Token>,
    compute: Option<ComputeClient>,
    network: Option<NetworkClient>,
}

/// [`CloudClient`] backed by the OpenStack REST APIs.
///
/// Holds the identity token and the compute/network clients bound to it.
/// The token is reused until it gets close to expiry.
#[derive(Default)]
pub struct OpenStackClient {
    session: Mutex<Session>,
}

impl OpenStackClient {
    pub fn new() -> Self {
        Self::default()
    }

    async fn compute(&self) -> Result<ComputeClient> {
        self.session
            .lock()
            .await
            .compute
            .clone()
            .ok_or(Error::NoSession("compute"))
    }

    async fn network(&self) -> Result<NetworkClient> {
        self.session
            .lock()
            .await
            .network
            .clone()
            .ok_or(Error::NoSession("network"))
    }

    /// Endpoint for `service_type` bound to the current token.
    async fn bind(&self, auth: &AuthOptions, service_type: &str) -> Result<(HttpClient, String, String)> {
        let session = self.session.lock().await;
        let token = session.token.as_ref().ok_or(Error::NoSession("identity"))?;
        let http = session.http.clone().ok_or(Error::NoSession("identity"))?;
        let endpoint = token.endpoint(
            service_type,
            interface(auth.endpoint_type),
            auth.region.as_deref(),
        )?;
        Ok((http, token.id.clone(), endpoint))
    }

    /// Resolve the external network backing a neutron pool.
    fn pool_network_id(pool: &FloatingIpPool) -> Result<&str> {
        pool.id
            .as_deref()
            .ok_or_else(|| Error::UnknownResourceName {
                kind: ResourceKind::FloatingIpPool,
                name: pool.name.clone(),
            })
    }
}

fn interface(endpoint_type: EndpointType) -> Interface {
    match endpoint_type {
        EndpointType::Public => Interface::Public,
        EndpointType::Admin => Interface::Admin,
        EndpointType::Internal => Interface::Internal,
    }
}

fn user_domain(s: &Scoping) -> Option<DomainRef> {
    DomainRef::from_parts(s.user_domain_id.as_deref(), s.user_domain_name.as_deref())
        .or_else(|| DomainRef::from_parts(s.domain_id.as_deref(), s.domain_name.as_deref()))
}

fn project_domain(s: &Scoping) -> Option<DomainRef> {
    DomainRef::from_parts(
        s.project_domain_id.as_deref(),
        s.project_domain_name.as_deref(),
    )
    .or_else(|| DomainRef::from_parts(s.domain_id.as_deref(), s.domain_name.as_deref()))
}

fn user_ref(user_id: &Option<String>, username: &Option<String>, s: &Scoping) -> UserRef {
    match user_id {
        Some(id) => UserRef {
            id: Some(id.clone()),
            name: None,
            domain: None,
        },
        None => UserRef {
            id: None,
            name: username.clone(),
            domain: user_domain(s),
        },
    }
}

fn scope(s: &Scoping) -> Option<Scope> {
    if let Some(id) = &s.project_id {
        return Some(Scope::Project(ProjectRef {
            id: Some(id.clone()),
            name: None,
            domain: None,
        }));
    }
    if let Some(name) = &s.project_name {
        return Some(Scope::Project(ProjectRef {
            id: None,
            name: Some(name.clone()),
            domain: project_domain(s),
        }));
    }
    DomainRef::from_parts(s.domain_id.as_deref(), s.domain_name.as_deref()).map(Scope::Domain)
}

/// Translate driver auth options into a Keystone token request.
pub(crate) fn auth_request(auth: &AuthOptions) -> AuthRequest {
    let s = &auth.scoping;
    let method = match &auth.credentials {
        Credentials::Password {
            user_id,
            username,
            password,
        } => AuthMethod::Password {
            user: user_ref(user_id, username, s),
            password: password.clone(),
        },
        Credentials::Token { token } => AuthMethod::Token(token.clone()),
        Credentials::ApplicationCredential {
            id: Some(id),
            secret,
            ..
        } => AuthMethod::ApplicationCredential {
            id: Some(id.clone()),
            name: None,
            secret: secret.clone(),
            user: None,
        },
        Credentials::ApplicationCredential {
            id: None,
            name,
            secret,
            user_id,
            username,
        } => AuthMethod::ApplicationCredential {
            id: None,
            name: name.clone(),
            secret: secret.clone(),
            user: Some(user_ref(user_id, username, s)),
        },
    };

    AuthRequest::new(method, scope(s))
}

/// `None` when the timeout is too large to represent, meaning no deadline.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn nova_floating_ip(ip: openstack_api::NovaFloatingIp) -> FloatingIp {
    let id = match ip.id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    FloatingIp {
        id,
        ip: ip.ip,
        port_id: ip.instance_id,
    }
}

fn neutron_floating_ip(ip: openstack_api::FloatingIp) -> FloatingIp {
    FloatingIp {
        id: ip.id,
        ip: ip.floating_ip_address,
        port_id: ip.port_id,
    }
}

#[async_trait]
impl CloudClient for OpenStackClient {
    async fn authenticate(&self, auth: &AuthOptions) -> Result<()> {
        let mut session = self.session.lock().await;

        let margin = chrono::Duration::minutes(TOKEN_RENEW_MARGIN_MINUTES);
        if session
            .token
            .as_ref()
            .is_some_and(|t| !t.expires_within(margin))
        {
            return Ok(());
        }

        let http = match &session.http {
            Some(http) => http.clone(),
            None => {
                let http = openstack_api::http_client(&TlsOptions {
                    insecure: auth.insecure,
                    ca_cert: auth.cacert.clone(),
                })?;
                session.http = Some(http.clone());
                http
            }
        };

        debug!(auth_url = %auth.auth_url, "openstack: authenticating");
        let token = IdentityClient::new(http, &auth.auth_url)
            .authenticate(&auth_request(auth))
            .await?;
        debug!(expires_at = %token.expires_at, "openstack: token issued");

        session.token = Some(token);
        Ok(())
    }

    async fn init_compute_client(&self, auth: &AuthOptions) -> Result<()> {
        let (http, token, endpoint) = self.bind(auth, "compute").await?;
        debug!(endpoint = %endpoint, "openstack: compute session ready");
        self.session.lock().await.compute = Some(ComputeClient::new(http, token, endpoint));
        Ok(())
    }

    async fn init_network_client(&self, auth: &AuthOptions) -> Result<()> {
        let (http, token, endpoint) = self.bind(auth, "network").await?;
        debug!(endpoint = %endpoint, "openstack: network session ready");
        self.session.lock().await.network = Some(NetworkClient::new(http, token, endpoint));
        Ok(())
    }

    async fn network_id(&self, name: &str) -> Result<Option<String>> {
        let networks = self.network().await?.list_networks(Some(name)).await?;
        Ok(networks.into_iter().find(|n| n.name == name).map(|n| n.id))
    }

    async fn flavor_id(&self, name: &str) -> Result<Option<String>> {
        let flavors = self.compute().await?.list_flavors().await?;
        Ok(flavors.into_iter().find(|f| f.name == name).map(|f| f.id))
    }

    async fn image_id(&self, name: &str) -> Result<Option<String>> {
        let images = self.compute().await?.list_images(Some(name)).await?;
        Ok(images.into_iter().find(|i| i.name == name).map(|i| i.id))
    }

    async fn floating_ip_pool_id(&self, name: &str) -> Result<Option<String>> {
        self.network_id(name).await
    }

    async fn create_instance(&self, req: &InstanceRequest) -> Result<MachineId> {
        let server = self
            .compute()
            .await?
            .create_server(&CreateServer {
                name: req.name.clone(),
                flavor_ref: req.flavor_id.clone(),
                image_ref: req.image_id.clone(),
                key_name: Some(req.key_pair_name.clone()),
                networks: req
                    .network_ids
                    .iter()
                    .map(|id| ServerNetwork { uuid: id.clone() })
                    .collect(),
                security_groups: req
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name: name.clone() })
                    .collect(),
                user_data: req.user_data.as_deref().map(|data| STANDARD.encode(data)),
                config_drive: req.config_drive,
                availability_zone: req.availability_zone.clone(),
            })
            .await?;

        Ok(MachineId(server.id))
    }

    async fn start_instance(&self, id: &MachineId) -> Result<()> {
        Ok(self.compute().await?.start_server(&id.0).await?)
    }

    async fn stop_instance(&self, id: &MachineId) -> Result<()> {
        Ok(self.compute().await?.stop_server(&id.0).await?)
    }

    async fn restart_instance(&self, id: &MachineId) -> Result<()> {
        Ok(self.compute().await?.reboot_server(&id.0).await?)
    }

    async fn delete_instance(&self, id: &MachineId) -> Result<()> {
        Ok(self.compute().await?.delete_server(&id.0).await?)
    }

    async fn instance_status(&self, id: &MachineId) -> Result<String> {
        Ok(self.compute().await?.get_server(&id.0).await?.status)
    }

    async fn wait_for_instance_status(
        &self,
        id: &MachineId,
        status: &str,
        timeout: Duration,
    ) -> Result<()> {
        let compute = self.compute().await?;
        let deadline = deadline_after(timeout);

        loop {
            let current = compute.get_server(&id.0).await?.status;
            if current == status {
                info!(machine_id = %id, status, "openstack: instance reached status");
                return Ok(());
            }
            if current == "ERROR" {
                return Err(Error::InstanceFailed(id.clone()));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Timeout {
                    id: id.clone(),
                    status: status.to_string(),
                    timeout,
                });
            }
            debug!(machine_id = %id, current = %current, "openstack: waiting for instance");
            sleep(STATUS_POLL_INTERVAL).await;
        }
    }

    async fn instance_addresses(&self, id: &MachineId) -> Result<Vec<Address>> {
        let server = self.compute().await?.get_server(&id.0).await?;

        Ok(server
            .addresses
            .into_values()
            .flatten()
            .map(|a| Address {
                kind: match a.kind.as_deref() {
                    Some("floating") => AddressKind::Floating,
                    _ => AddressKind::Fixed,
                },
                address: a.addr,
                version: a.version,
            })
            .collect())
    }

    async fn floating_ips(&self, pool: &FloatingIpPool) -> Result<Vec<FloatingIp>> {
        if pool.nova_network {
            let ips = self.compute().await?.list_floating_ips().await?;
            return Ok(ips
                .into_iter()
                .filter(|ip| ip.pool.as_deref() == Some(pool.name.as_str()))
                .map(nova_floating_ip)
                .collect());
        }

        let network_id = Self::pool_network_id(pool)?;
        let ips = self.network().await?.list_floating_ips(network_id).await?;
        Ok(ips.into_iter().map(neutron_floating_ip).collect())
    }

    async fn allocate_floating_ip(&self, pool: &FloatingIpPool) -> Result<FloatingIp> {
        let ip = if pool.nova_network {
            nova_floating_ip(self.compute().await?.allocate_floating_ip(&pool.name).await?)
        } else {
            let network_id = Self::pool_network_id(pool)?;
            neutron_floating_ip(
                self.network()
                    .await?
                    .create_floating_ip(&CreateFloatingIp {
                        floating_network_id: network_id.to_string(),
                        port_id: None,
                    })
                    .await?,
            )
        };

        info!(ip = %ip.ip, pool = %pool.name, "openstack: floating IP allocated");
        Ok(ip)
    }

    async fn assign_floating_ip(
        &self,
        id: &MachineId,
        pool: &FloatingIpPool,
        ip: &FloatingIp,
    ) -> Result<()> {
        if pool.nova_network {
            return Ok(self.compute().await?.add_floating_ip(&id.0, &ip.ip).await?);
        }

        let network = self.network().await?;
        let port = network
            .list_ports(&id.0)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoPort(id.clone()))?;

        network.update_floating_ip(&ip.id, Some(&port.id)).await?;
        Ok(())
    }

    async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        self.compute()
            .await?
            .create_keypair(name, public_key)
            .await?;
        Ok(())
    }

    async fn public_key(&self, name: &str) -> Result<String> {
        Ok(self.compute().await?.get_keypair(name).await?.public_key)
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        Ok(self.compute().await?.delete_keypair(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(credentials: Credentials, scoping: Scoping) -> AuthOptions {
        AuthOptions {
            auth_url: "https://keystone.example:5000/v3".into(),
            credentials,
            scoping,
            insecure: false,
            cacert: None,
            region: None,
            endpoint_type: EndpointType::Public,
        }
    }

    #[test]
    fn password_request_falls_back_to_generic_domain() {
        let req = auth_request(&auth(
            Credentials::Password {
                user_id: None,
                username: Some("demo".into()),
                password: "secret".into(),
            },
            Scoping {
                domain_name: Some("Default".into()),
                project_name: Some("demo".into()),
                ..Default::default()
            },
        ));

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body["auth"]["identity"]["password"]["user"]["domain"]["name"],
            "Default"
        );
        assert_eq!(body["auth"]["scope"]["project"]["name"], "demo");
        assert_eq!(
            body["auth"]["scope"]["project"]["domain"]["name"],
            "Default"
        );
    }

    #[test]
    fn explicit_user_domain_wins() {
        let req = auth_request(&auth(
            Credentials::Password {
                user_id: None,
                username: Some("demo".into()),
                password: "secret".into(),
            },
            Scoping {
                domain_id: Some("default".into()),
                user_domain_name: Some("Users".into()),
                project_id: Some("p-1".into()),
                ..Default::default()
            },
        ));

        let body = serde_json::to_value(&req).unwrap();
        let user = &body["auth"]["identity"]["password"]["user"];
        assert_eq!(user["domain"]["name"], "Users");
        assert!(user["domain"].get("id").is_none());
        assert_eq!(body["auth"]["scope"]["project"]["id"], "p-1");
    }

    #[test]
    fn token_request_is_domain_scoped_without_project() {
        let req = auth_request(&auth(
            Credentials::Token {
                token: "gAAAA".into(),
            },
            Scoping {
                domain_id: Some("default".into()),
                ..Default::default()
            },
        ));

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["auth"]["identity"]["token"]["id"], "gAAAA");
        assert_eq!(body["auth"]["scope"]["domain"]["id"], "default");
    }

    #[test]
    fn nova_floating_ip_ids_become_strings() {
        let ip: openstack_api::NovaFloatingIp = serde_json::from_value(serde_json::json!({
            "id": 7,
            "ip": "198.51.100.7",
            "pool": "public",
            "instance_id": null
        }))
        .unwrap();

        let ip = nova_floating_ip(ip);
        assert_eq!(ip.id, "7");
        assert!(ip.is_available());
    }

    #[test]
    fn huge_timeouts_wait_without_deadline() {
        assert!(deadline_after(Duration::from_secs(u64::MAX)).is_none());

        let deadline = deadline_after(Duration::from_secs(200)).unwrap();
        assert!(deadline > Instant::now());
    }

    #[tokio::test]
    async fn calls_before_init_report_missing_session() {
        let client = OpenStackClient::new();
        assert!(matches!(
            client.flavor_id("m1.small").await,
            Err(Error::NoSession("compute"))
        ));
        assert!(matches!(
            client.network_id("private").await,
            Err(Error::NoSession("network"))
        ));
    }
}
