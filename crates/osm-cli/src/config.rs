use clap::Args;
use osm_driver::DriverOptions;
use osm_driver::config::{
    DEFAULT_ACTIVE_TIMEOUT_SECS, DEFAULT_IP_VERSION, DEFAULT_SSH_PORT, DEFAULT_SSH_USER,
};

/// OpenStack options for `create`. Every flag can also come from its `OS_*` variable.
#[derive(Debug, Clone, Args)]
pub struct DriverFlags {
    /// OpenStack authentication URL
    #[arg(long = "openstack-auth-url", env = "OS_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Disable TLS credential checking
    #[arg(long = "openstack-insecure", env = "OS_INSECURE")]
    pub insecure: bool,

    /// CA certificate bundle to verify against
    #[arg(long = "openstack-cacert", env = "OS_CACERT")]
    pub cacert: Option<String>,

    #[arg(long = "openstack-domain-id", env = "OS_DOMAIN_ID")]
    pub domain_id: Option<String>,

    #[arg(long = "openstack-domain-name", env = "OS_DOMAIN_NAME")]
    pub domain_name: Option<String>,

    #[arg(long = "openstack-user-id", env = "OS_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long = "openstack-username", env = "OS_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "openstack-password", env = "OS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Pre-issued Keystone token
    #[arg(long = "openstack-token", env = "OS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long = "openstack-tenant-name", env = "OS_TENANT_NAME")]
    pub tenant_name: Option<String>,

    #[arg(long = "openstack-tenant-id", env = "OS_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long = "openstack-tenant-domain-name", env = "OS_TENANT_DOMAIN_NAME")]
    pub tenant_domain_name: Option<String>,

    #[arg(long = "openstack-tenant-domain-id", env = "OS_TENANT_DOMAIN_ID")]
    pub tenant_domain_id: Option<String>,

    #[arg(long = "openstack-user-domain-name", env = "OS_USER_DOMAIN_NAME")]
    pub user_domain_name: Option<String>,

    #[arg(long = "openstack-user-domain-id", env = "OS_USER_DOMAIN_ID")]
    pub user_domain_id: Option<String>,

    #[arg(
        long = "openstack-application-credential-id",
        env = "OS_APPLICATION_CREDENTIAL_ID"
    )]
    pub application_credential_id: Option<String>,

    #[arg(
        long = "openstack-application-credential-name",
        env = "OS_APPLICATION_CREDENTIAL_NAME"
    )]
    pub application_credential_name: Option<String>,

    #[arg(
        long = "openstack-application-credential-secret",
        env = "OS_APPLICATION_CREDENTIAL_SECRET",
        hide_env_values = true
    )]
    pub application_credential_secret: Option<String>,

    #[arg(long = "openstack-region", env = "OS_REGION_NAME")]
    pub region: Option<String>,

    #[arg(long = "openstack-availability-zone", env = "OS_AVAILABILITY_ZONE")]
    pub availability_zone: Option<String>,

    /// publicURL, adminURL or internalURL
    #[arg(long = "openstack-endpoint-type", env = "OS_ENDPOINT_TYPE")]
    pub endpoint_type: Option<String>,

    #[arg(long = "openstack-flavor-id", env = "OS_FLAVOR_ID")]
    pub flavor_id: Option<String>,

    #[arg(long = "openstack-flavor-name", env = "OS_FLAVOR_NAME")]
    pub flavor_name: Option<String>,

    #[arg(long = "openstack-image-id", env = "OS_IMAGE_ID")]
    pub image_id: Option<String>,

    #[arg(long = "openstack-image-name", env = "OS_IMAGE_NAME")]
    pub image_name: Option<String>,

    /// Existing key pair to use instead of generating one
    #[arg(long = "openstack-keypair-name", env = "OS_KEYPAIR_NAME")]
    pub keypair_name: Option<String>,

    /// Comma separated network IDs
    #[arg(long = "openstack-net-id", env = "OS_NETWORK_ID")]
    pub net_id: Option<String>,

    /// Comma separated network names
    #[arg(long = "openstack-net-name", env = "OS_NETWORK_NAME")]
    pub net_name: Option<String>,

    /// Private half of --openstack-keypair-name
    #[arg(long = "openstack-private-key-file", env = "OS_PRIVATE_KEY_FILE")]
    pub private_key_file: Option<String>,

    #[arg(long = "openstack-user-data-file", env = "OS_USER_DATA_FILE")]
    pub user_data_file: Option<String>,

    /// Comma separated security groups
    #[arg(long = "openstack-sec-groups", env = "OS_SECURITY_GROUPS")]
    pub sec_groups: Option<String>,

    /// Use nova-network instead of neutron
    #[arg(long = "openstack-nova-network", env = "OS_NOVA_NETWORK")]
    pub nova_network: bool,

    #[arg(long = "openstack-floatingip-pool", env = "OS_FLOATINGIP_POOL")]
    pub floatingip_pool: Option<String>,

    #[arg(long = "openstack-ip-version", env = "OS_IP_VERSION", default_value_t = DEFAULT_IP_VERSION)]
    pub ip_version: u8,

    #[arg(long = "openstack-ssh-user", env = "OS_SSH_USER", default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    #[arg(long = "openstack-ssh-port", env = "OS_SSH_PORT", default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Seconds to wait for the instance to become ACTIVE
    #[arg(
        long = "openstack-active-timeout",
        env = "OS_ACTIVE_TIMEOUT",
        default_value_t = DEFAULT_ACTIVE_TIMEOUT_SECS
    )]
    pub active_timeout: u64,

    #[arg(long = "openstack-config-drive", env = "OS_CONFIG_DRIVE")]
    pub config_drive: bool,
}

impl From<DriverFlags> for DriverOptions {
    fn from(f: DriverFlags) -> Self {
        Self {
            auth_url: f.auth_url,
            insecure: f.insecure,
            cacert: f.cacert,
            domain_id: f.domain_id,
            domain_name: f.domain_name,
            user_id: f.user_id,
            username: f.username,
            password: f.password,
            token: f.token,
            tenant_name: f.tenant_name,
            tenant_id: f.tenant_id,
            tenant_domain_name: f.tenant_domain_name,
            tenant_domain_id: f.tenant_domain_id,
            user_domain_name: f.user_domain_name,
            user_domain_id: f.user_domain_id,
            application_credential_id: f.application_credential_id,
            application_credential_name: f.application_credential_name,
            application_credential_secret: f.application_credential_secret,
            region: f.region,
            availability_zone: f.availability_zone,
            endpoint_type: f.endpoint_type,
            flavor_id: f.flavor_id,
            flavor_name: f.flavor_name,
            image_id: f.image_id,
            image_name: f.image_name,
            keypair_name: f.keypair_name,
            net_id: f.net_id,
            net_name: f.net_name,
            private_key_file: f.private_key_file,
            user_data_file: f.user_data_file,
            sec_groups: f.sec_groups,
            nova_network: f.nova_network,
            floatingip_pool: f.floatingip_pool,
            ip_version: f.ip_version,
            ssh_user: f.ssh_user,
            ssh_port: f.ssh_port,
            active_timeout: f.active_timeout,
            config_drive: f.config_drive,
        }
    }
}

/// Parse `argv` ignoring `OS_*` variables set in the calling environment.
#[cfg(test)]
pub(crate) fn parse_without_env<T>(argv: &[&str]) -> Result<T, clap::Error>
where
    T: clap::CommandFactory + clap::FromArgMatches,
{
    fn strip(cmd: clap::Command) -> clap::Command {
        let names: Vec<String> = cmd
            .get_subcommands()
            .map(|sub| sub.get_name().to_string())
            .collect();
        let mut cmd = cmd.mut_args(|arg| arg.env(None::<&'static str>));
        for name in names {
            cmd = cmd.mut_subcommand(name, strip);
        }
        cmd
    }

    let matches = strip(T::command()).try_get_matches_from(argv)?;
    T::from_arg_matches(&matches)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        flags: DriverFlags,
    }

    fn parse(args: &[&str]) -> DriverOptions {
        let argv: Vec<&str> = std::iter::once("openstack-machine")
            .chain(args.iter().copied())
            .collect();
        parse_without_env::<Harness>(&argv).unwrap().flags.into()
    }

    #[test]
    fn flags_map_to_options() {
        let opts = parse(&[
            "--openstack-auth-url",
            "https://keystone.example:5000/v3",
            "--openstack-flavor-name",
            "m1.small",
            "--openstack-net-name",
            "private,storage",
            "--openstack-nova-network",
            "--openstack-ssh-port",
            "2222",
        ]);

        assert_eq!(opts.auth_url.as_deref(), Some("https://keystone.example:5000/v3"));
        assert_eq!(opts.flavor_name.as_deref(), Some("m1.small"));
        assert_eq!(opts.net_name.as_deref(), Some("private,storage"));
        assert!(opts.nova_network);
        assert_eq!(opts.ssh_port, 2222);
    }

    #[test]
    fn numeric_flags_default() {
        let opts = parse(&[]);
        assert_eq!(opts.ip_version, 4);
        assert_eq!(opts.ssh_user, "root");
        assert_eq!(opts.ssh_port, 22);
        assert_eq!(opts.active_timeout, 200);
        assert!(!opts.config_drive);
    }

    #[test]
    fn flags_bind_os_variables() {
        let cmd = Harness::command();
        let env_of = |id: &str| {
            cmd.get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };

        assert_eq!(env_of("auth_url").as_deref(), Some("OS_AUTH_URL"));
        assert_eq!(env_of("password").as_deref(), Some("OS_PASSWORD"));
        assert_eq!(env_of("ip_version").as_deref(), Some("OS_IP_VERSION"));
    }
}
