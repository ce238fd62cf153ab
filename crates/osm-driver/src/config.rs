use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_ACTIVE_TIMEOUT_SECS: u64 = 200;
pub const DEFAULT_IP_VERSION: u8 = 4;

/// Raw option values as bound from flags or environment variables.
///
/// Empty strings count as unset. Nothing here is validated; turn it into a
/// [`DriverConfig`] with [`DriverConfig::from_options`].
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub auth_url: Option<String>,
    pub insecure: bool,
    pub cacert: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub tenant_name: Option<String>,
    pub tenant_id: Option<String>,
    pub tenant_domain_name: Option<String>,
    pub tenant_domain_id: Option<String>,
    pub user_domain_name: Option<String>,
    pub user_domain_id: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_name: Option<String>,
    pub application_credential_secret: Option<String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
    pub endpoint_type: Option<String>,
    pub flavor_id: Option<String>,
    pub flavor_name: Option<String>,
    pub image_id: Option<String>,
    pub image_name: Option<String>,
    pub keypair_name: Option<String>,
    /// Comma separated.
    pub net_id: Option<String>,
    /// Comma separated.
    pub net_name: Option<String>,
    pub private_key_file: Option<String>,
    pub user_data_file: Option<String>,
    /// Comma separated.
    pub sec_groups: Option<String>,
    pub nova_network: bool,
    pub floatingip_pool: Option<String>,
    pub ip_version: u8,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub active_timeout: u64,
    pub config_drive: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            auth_url: None,
            insecure: false,
            cacert: None,
            domain_id: None,
            domain_name: None,
            user_id: None,
            username: None,
            password: None,
            token: None,
            tenant_name: None,
            tenant_id: None,
            tenant_domain_name: None,
            tenant_domain_id: None,
            user_domain_name: None,
            user_domain_id: None,
            application_credential_id: None,
            application_credential_name: None,
            application_credential_secret: None,
            region: None,
            availability_zone: None,
            endpoint_type: None,
            flavor_id: None,
            flavor_name: None,
            image_id: None,
            image_name: None,
            keypair_name: None,
            net_id: None,
            net_name: None,
            private_key_file: None,
            user_data_file: None,
            sec_groups: None,
            nova_network: false,
            floatingip_pool: None,
            ip_version: DEFAULT_IP_VERSION,
            ssh_user: DEFAULT_SSH_USER.into(),
            ssh_port: DEFAULT_SSH_PORT,
            active_timeout: DEFAULT_ACTIVE_TIMEOUT_SECS,
            config_drive: false,
        }
    }
}

/// A resource given either by name or by provider ID, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Name(String),
    Id(String),
}

/// Networks to attach, by name or by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkSelector {
    Names(Vec<String>),
    Ids(Vec<String>),
}

/// Catalog interface used to pick service endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointType {
    #[default]
    #[serde(rename = "publicURL")]
    Public,
    #[serde(rename = "adminURL")]
    Admin,
    #[serde(rename = "internalURL")]
    Internal,
}

impl EndpointType {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "publicURL" => Ok(Self::Public),
            "adminURL" => Ok(Self::Admin),
            "internalURL" => Ok(Self::Internal),
            _ => Err(Error::Config(
                "Endpoint type must be 'publicURL', 'adminURL' or 'internalURL'".into(),
            )),
        }
    }
}

/// How the driver proves its identity to Keystone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credentials {
    Password {
        user_id: Option<String>,
        username: Option<String>,
        password: String,
    },
    Token {
        token: String,
    },
    ApplicationCredential {
        id: Option<String>,
        name: Option<String>,
        secret: String,
        user_id: Option<String>,
        username: Option<String>,
    },
}

/// Domain and project scoping. Any field may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoping {
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub user_domain_id: Option<String>,
    pub user_domain_name: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub project_domain_id: Option<String>,
    pub project_domain_name: Option<String>,
}

/// Everything needed to authenticate and pick endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOptions {
    pub auth_url: String,
    pub credentials: Credentials,
    pub scoping: Scoping,
    pub insecure: bool,
    pub cacert: Option<String>,
    pub region: Option<String>,
    pub endpoint_type: EndpointType,
}

/// Pre-existing key pair imported instead of generating one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingKeyPair {
    pub name: String,
    pub private_key_file: PathBuf,
}

/// Validated, immutable driver configuration.
///
/// Built by [`DriverConfig::from_options`]. Values restored from a persisted
/// record must pass [`DriverConfig::validate`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub(crate) machine_name: String,
    pub(crate) ssh_key_path: PathBuf,
    pub(crate) auth: AuthOptions,
    pub(crate) flavor: Selector,
    pub(crate) image: Selector,
    pub(crate) networks: Option<NetworkSelector>,
    pub(crate) security_groups: Vec<String>,
    pub(crate) key_pair: Option<ExistingKeyPair>,
    pub(crate) user_data: Option<Vec<u8>>,
    pub(crate) floating_ip_pool: Option<String>,
    pub(crate) nova_network: bool,
    pub(crate) ip_version: u8,
    pub(crate) ssh_user: String,
    pub(crate) ssh_port: u16,
    pub(crate) active_timeout_secs: u64,
    pub(crate) config_drive: bool,
    pub(crate) availability_zone: Option<String>,
}

const ERR_EXCLUSIVE: &str = "must be specified, not both";

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn split_list(value: &Option<String>) -> Vec<String> {
    non_empty(value)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn exactly_one(
    name: Option<String>,
    id: Option<String>,
    label: &str,
    flag: &str,
) -> Result<Selector> {
    match (name, id) {
        (Some(_), Some(_)) => Err(Error::Config(format!(
            "Either {label} name or {label} id {ERR_EXCLUSIVE}"
        ))),
        (Some(name), None) => Ok(Selector::Name(name)),
        (None, Some(id)) => Ok(Selector::Id(id)),
        (None, None) => Err(Error::Config(format!(
            "{label} name or {label} id must be specified using the CLI option \
             --openstack-{flag}-name or --openstack-{flag}-id"
        ))),
    }
}

fn credentials(opts: &DriverOptions) -> Result<Credentials> {
    let user_id = non_empty(&opts.user_id);
    let username = non_empty(&opts.username);

    let app_id = non_empty(&opts.application_credential_id);
    let app_name = non_empty(&opts.application_credential_name);
    if app_id.is_some() || app_name.is_some() {
        let secret = non_empty(&opts.application_credential_secret).ok_or_else(|| {
            Error::Config(
                "Application credential secret must be specified either using the environment \
                 variable OS_APPLICATION_CREDENTIAL_SECRET or the CLI option \
                 --openstack-application-credential-secret"
                    .into(),
            )
        })?;
        if app_id.is_none() && user_id.is_none() && username.is_none() {
            return Err(Error::Config(
                "Application credential name requires a username or user id".into(),
            ));
        }
        return Ok(Credentials::ApplicationCredential {
            id: app_id,
            name: app_name,
            secret,
            user_id,
            username,
        });
    }

    if let Some(token) = non_empty(&opts.token) {
        return Ok(Credentials::Token { token });
    }

    if user_id.is_none() && username.is_none() {
        return Err(Error::Config(
            "Username or user id must be specified either using the environment variable \
             OS_USERNAME or the CLI option --openstack-username"
                .into(),
        ));
    }
    let password = non_empty(&opts.password).ok_or_else(|| {
        Error::Config(
            "Password must be specified either using the environment variable OS_PASSWORD \
             or the CLI option --openstack-password"
                .into(),
        )
    })?;

    Ok(Credentials::Password {
        user_id,
        username,
        password,
    })
}

fn auth_options(opts: &DriverOptions) -> Result<AuthOptions> {
    let auth_url = non_empty(&opts.auth_url).ok_or_else(|| {
        Error::Config(
            "Authentication URL must be specified either using the environment variable \
             OS_AUTH_URL or the CLI option --openstack-auth-url"
                .into(),
        )
    })?;

    let credentials = credentials(opts)?;

    let endpoint_type = match non_empty(&opts.endpoint_type) {
        Some(raw) => EndpointType::parse(&raw)?,
        None => EndpointType::default(),
    };

    Ok(AuthOptions {
        auth_url,
        credentials,
        scoping: Scoping {
            domain_id: non_empty(&opts.domain_id),
            domain_name: non_empty(&opts.domain_name),
            user_domain_id: non_empty(&opts.user_domain_id),
            user_domain_name: non_empty(&opts.user_domain_name),
            project_id: non_empty(&opts.tenant_id),
            project_name: non_empty(&opts.tenant_name),
            project_domain_id: non_empty(&opts.tenant_domain_id),
            project_domain_name: non_empty(&opts.tenant_domain_name),
        },
        insecure: opts.insecure,
        cacert: non_empty(&opts.cacert),
        region: non_empty(&opts.region),
        endpoint_type,
    })
}

impl DriverConfig {
    /// Validate raw options and build the configuration.
    ///
    /// Fails before any remote call when options are missing or conflict.
    /// Reads the user data file, if one is configured.
    pub fn from_options(
        machine_name: impl Into<String>,
        ssh_key_path: impl Into<PathBuf>,
        opts: &DriverOptions,
    ) -> Result<Self> {
        let auth = auth_options(opts)?;

        let flavor = exactly_one(
            non_empty(&opts.flavor_name),
            non_empty(&opts.flavor_id),
            "Flavor",
            "flavor",
        )?;
        let image = exactly_one(
            non_empty(&opts.image_name),
            non_empty(&opts.image_id),
            "Image",
            "image",
        )?;

        let net_names = split_list(&opts.net_name);
        let net_ids = split_list(&opts.net_id);
        let networks = match (net_names.is_empty(), net_ids.is_empty()) {
            (false, false) => {
                return Err(Error::Config(format!(
                    "Either Network name or Network id {ERR_EXCLUSIVE}"
                )));
            }
            (false, true) => Some(NetworkSelector::Names(net_names)),
            (true, false) => Some(NetworkSelector::Ids(net_ids)),
            (true, true) => None,
        };

        let key_pair = match (
            non_empty(&opts.keypair_name),
            non_empty(&opts.private_key_file),
        ) {
            (Some(name), Some(file)) => Some(ExistingKeyPair {
                name,
                private_key_file: PathBuf::from(file),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "Both KeyPairName and PrivateKeyFile must be specified".into(),
                ));
            }
        };

        if !matches!(opts.ip_version, 4 | 6) {
            return Err(Error::Config(format!(
                "IP version must be 4 or 6, got {}",
                opts.ip_version
            )));
        }

        let user_data = match non_empty(&opts.user_data_file) {
            Some(path) => Some(
                std::fs::read(&path).map_err(|source| Error::UserData { path, source })?,
            ),
            None => None,
        };

        Ok(Self {
            machine_name: machine_name.into(),
            ssh_key_path: ssh_key_path.into(),
            auth,
            flavor,
            image,
            networks,
            security_groups: split_list(&opts.sec_groups),
            key_pair,
            user_data,
            floating_ip_pool: non_empty(&opts.floatingip_pool),
            nova_network: opts.nova_network,
            ip_version: opts.ip_version,
            ssh_user: opts.ssh_user.clone(),
            ssh_port: opts.ssh_port,
            active_timeout_secs: opts.active_timeout,
            config_drive: opts.config_drive,
            availability_zone: non_empty(&opts.availability_zone),
        })
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// Private key location; the public half lives next to it with `.pub`.
    pub fn ssh_key_path(&self) -> &Path {
        &self.ssh_key_path
    }

    pub fn ssh_user(&self) -> &str {
        &self.ssh_user
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    pub fn auth(&self) -> &AuthOptions {
        &self.auth
    }

    pub fn flavor(&self) -> &Selector {
        &self.flavor
    }

    pub fn image(&self) -> &Selector {
        &self.image
    }

    pub fn networks(&self) -> Option<&NetworkSelector> {
        self.networks.as_ref()
    }

    pub fn floating_ip_pool(&self) -> Option<&str> {
        self.floating_ip_pool.as_deref()
    }

    pub fn existing_key_pair(&self) -> Option<&ExistingKeyPair> {
        self.key_pair.as_ref()
    }

    pub fn nova_network(&self) -> bool {
        self.nova_network
    }

    pub fn ip_version(&self) -> u8 {
        self.ip_version
    }

    pub fn active_timeout(&self) -> Duration {
        Duration::from_secs(self.active_timeout_secs)
    }

    /// Re-check the rules a deserialized value could break.
    pub fn validate(&self) -> Result<()> {
        if self.machine_name.is_empty() {
            return Err(Error::Config("Machine name must not be empty".into()));
        }
        if self.auth.auth_url.is_empty() {
            return Err(Error::Config("Authentication URL must not be empty".into()));
        }
        if !matches!(self.ip_version, 4 | 6) {
            return Err(Error::Config(format!(
                "IP version must be 4 or 6, got {}",
                self.ip_version
            )));
        }
        Ok(())
    }
}
