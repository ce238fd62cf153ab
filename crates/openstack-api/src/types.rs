use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ── Identity ────────────────────────────────────────────────────────

/// Domain selector, by id or by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DomainRef {
    /// Prefer the id, fall back to the name; `None` when neither is set.
    pub fn from_parts(id: Option<&str>, name: Option<&str>) -> Option<Self> {
        match (id, name) {
            (Some(id), _) => Some(Self {
                id: Some(id.to_string()),
                name: None,
            }),
            (None, Some(name)) => Some(Self {
                id: None,
                name: Some(name.to_string()),
            }),
            (None, None) => None,
        }
    }
}

/// User selector. A user given by name needs a domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainRef>,
}

/// Token scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Project(ProjectRef),
    Domain(DomainRef),
}

/// Supported identity methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password {
        user: UserRef,
        password: String,
    },
    Token(String),
    ApplicationCredential {
        id: Option<String>,
        name: Option<String>,
        secret: String,
        user: Option<UserRef>,
    },
}

/// Body of `POST /v3/auth/tokens`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    auth: AuthBody,
}

#[derive(Debug, Clone, Serialize)]
struct AuthBody {
    identity: IdentityBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<ScopeBody>,
}

#[derive(Debug, Clone, Serialize)]
struct IdentityBody {
    methods: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<PasswordBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<TokenBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_credential: Option<ApplicationCredentialBody>,
}

#[derive(Debug, Clone, Serialize)]
struct PasswordBody {
    user: PasswordUser,
}

#[derive(Debug, Clone, Serialize)]
struct PasswordUser {
    #[serde(flatten)]
    user: UserRef,
    password: String,
}

#[derive(Debug, Clone, Serialize)]
struct TokenBody {
    id: String,
}

#[derive(Debug, Clone, Serialize)]
struct ApplicationCredentialBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserRef>,
}

#[derive(Debug, Clone, Serialize)]
struct ScopeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<ProjectRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<DomainRef>,
}

impl AuthRequest {
    /// Application credentials carry their own scope, so `scope` is ignored for them.
    pub fn new(method: AuthMethod, scope: Option<Scope>) -> Self {
        let (identity, scoped) = match method {
            AuthMethod::Password { user, password } => (
                IdentityBody {
                    methods: vec!["password"],
                    password: Some(PasswordBody {
                        user: PasswordUser { user, password },
                    }),
                    token: None,
                    application_credential: None,
                },
                true,
            ),
            AuthMethod::Token(id) => (
                IdentityBody {
                    methods: vec!["token"],
                    password: None,
                    token: Some(TokenBody { id }),
                    application_credential: None,
                },
                true,
            ),
            AuthMethod::ApplicationCredential {
                id,
                name,
                secret,
                user,
            } => (
                IdentityBody {
                    methods: vec!["application_credential"],
                    password: None,
                    token: None,
                    application_credential: Some(ApplicationCredentialBody {
                        id,
                        name,
                        secret,
                        user,
                    }),
                },
                false,
            ),
        };

        let scope = scope.filter(|_| scoped).map(|s| match s {
            Scope::Project(project) => ScopeBody {
                project: Some(project),
                domain: None,
            },
            Scope::Domain(domain) => ScopeBody {
                project: None,
                domain: Some(domain),
            },
        });

        Self {
            auth: AuthBody { identity, scope },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: TokenBodyResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenBodyResponse {
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
}

/// Endpoint interface, as listed in the service catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interface {
    #[default]
    Public,
    Admin,
    Internal,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Admin => "admin",
            Self::Internal => "internal",
        }
    }
}

/// An issued token together with its service catalog.
#[derive(Debug, Clone)]
pub struct Token {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub catalog: Vec<CatalogEntry>,
}

impl Token {
    /// Whether the token expires within `margin` from now.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_at - margin <= Utc::now()
    }

    /// Find the URL of a service endpoint in the catalog.
    pub fn endpoint(
        &self,
        service_type: &str,
        interface: Interface,
        region: Option<&str>,
    ) -> Result<String> {
        self.catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| {
                ep.interface == interface.as_str()
                    && region.is_none_or(|r| {
                        ep.region_id.as_deref() == Some(r) || ep.region.as_deref() == Some(r)
                    })
            })
            .map(|ep| ep.url.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::NoEndpoint {
                service_type: service_type.to_string(),
                interface: interface.as_str(),
            })
    }
}

// ── Compute ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FlavorList {
    pub flavors: Vec<Flavor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ImageList {
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServer {
    pub name: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<ServerNetwork>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupRef>,
    /// Base64 encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub config_drive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerNetwork {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateServerBody<'a> {
    pub server: &'a CreateServer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerRefBody {
    pub server: ServerRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    /// Addresses keyed by network label.
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerBody {
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    pub version: u8,
    /// `fixed` or `floating`.
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypair {
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateKeypair<'a> {
    pub name: &'a str,
    pub public_key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateKeypairBody<'a> {
    pub keypair: CreateKeypair<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct KeypairBody {
    pub keypair: Keypair,
}

/// Floating IP as reported by the nova-network compute extension.
#[derive(Debug, Clone, Deserialize)]
pub struct NovaFloatingIp {
    pub id: serde_json::Value,
    pub ip: String,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub fixed_ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NovaFloatingIpList {
    pub floating_ips: Vec<NovaFloatingIp>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NovaFloatingIpBody {
    pub floating_ip: NovaFloatingIp,
}

// ── Network ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NetworkList {
    pub networks: Vec<Network>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    pub floating_network_id: String,
    #[serde(default)]
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FloatingIpList {
    pub floatingips: Vec<FloatingIp>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FloatingIpBody {
    pub floatingip: FloatingIp,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFloatingIp {
    pub floating_network_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateFloatingIpBody<'a> {
    pub floatingip: &'a CreateFloatingIp,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateFloatingIp<'a> {
    pub port_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateFloatingIpBody<'a> {
    pub floatingip: UpdateFloatingIp<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PortList {
    pub ports: Vec<Port>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(catalog: serde_json::Value) -> Token {
        Token {
            id: "tok".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            catalog: serde_json::from_value(catalog).unwrap(),
        }
    }

    #[test]
    fn endpoint_matches_interface_and_region() {
        let token = token(serde_json::json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [
                    { "interface": "public", "region_id": "RegionOne", "url": "https://one.example/compute/v2.1/" },
                    { "interface": "internal", "region_id": "RegionOne", "url": "http://10.0.0.1:8774/v2.1" },
                    { "interface": "public", "region_id": "RegionTwo", "url": "https://two.example/compute/v2.1" }
                ]
            },
            {
                "type": "network",
                "name": "neutron",
                "endpoints": [
                    { "interface": "public", "region": "RegionOne", "url": "https://one.example:9696" }
                ]
            }
        ]));

        assert_eq!(
            token
                .endpoint("compute", Interface::Public, Some("RegionTwo"))
                .unwrap(),
            "https://two.example/compute/v2.1"
        );
        assert_eq!(
            token
                .endpoint("compute", Interface::Internal, None)
                .unwrap(),
            "http://10.0.0.1:8774/v2.1"
        );
        assert_eq!(
            token
                .endpoint("network", Interface::Public, Some("RegionOne"))
                .unwrap(),
            "https://one.example:9696"
        );
        assert!(matches!(
            token.endpoint("network", Interface::Admin, None),
            Err(Error::NoEndpoint { .. })
        ));
    }

    #[test]
    fn token_expiry_margin() {
        let mut t = token(serde_json::json!([]));
        assert!(!t.expires_within(chrono::Duration::minutes(5)));
        t.expires_at = Utc::now() + chrono::Duration::minutes(2);
        assert!(t.expires_within(chrono::Duration::minutes(5)));
    }

    #[test]
    fn password_auth_body_is_scoped() {
        let req = AuthRequest::new(
            AuthMethod::Password {
                user: UserRef {
                    id: None,
                    name: Some("demo".into()),
                    domain: DomainRef::from_parts(None, Some("Default")),
                },
                password: "secret".into(),
            },
            Some(Scope::Project(ProjectRef {
                id: None,
                name: Some("demo-project".into()),
                domain: DomainRef::from_parts(Some("default"), None),
            })),
        );

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": "demo",
                                "domain": { "name": "Default" },
                                "password": "secret"
                            }
                        }
                    },
                    "scope": {
                        "project": {
                            "name": "demo-project",
                            "domain": { "id": "default" }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn application_credential_drops_scope() {
        let req = AuthRequest::new(
            AuthMethod::ApplicationCredential {
                id: Some("cred-id".into()),
                name: None,
                secret: "s3cret".into(),
                user: None,
            },
            Some(Scope::Domain(DomainRef {
                id: Some("default".into()),
                name: None,
            })),
        );

        let body = serde_json::to_value(&req).unwrap();
        assert!(body["auth"].get("scope").is_none());
        assert_eq!(
            body["auth"]["identity"]["methods"],
            serde_json::json!(["application_credential"])
        );
        assert_eq!(
            body["auth"]["identity"]["application_credential"]["id"],
            "cred-id"
        );
    }

    #[test]
    fn server_addresses_parse_ext_ips_type() {
        let server: Server = serde_json::from_value(serde_json::json!({
            "id": "srv-1",
            "name": "box",
            "status": "ACTIVE",
            "addresses": {
                "private": [
                    { "addr": "10.0.0.5", "version": 4, "OS-EXT-IPS:type": "fixed" },
                    { "addr": "fd00::5", "version": 6, "OS-EXT-IPS:type": "fixed" },
                    { "addr": "203.0.113.9", "version": 4, "OS-EXT-IPS:type": "floating" }
                ]
            }
        }))
        .unwrap();

        let private = &server.addresses["private"];
        assert_eq!(private.len(), 3);
        assert_eq!(private[1].version, 6);
        assert_eq!(private[2].kind.as_deref(), Some("floating"));
    }
}
