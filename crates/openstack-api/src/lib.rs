//! Typed Rust client for the OpenStack APIs.
//!
//! Covers the subset needed for managing a single machine:
//! identity (token issue + service catalog), compute (flavors, images,
//! servers, key pairs, nova-network floating IPs) and network (networks,
//! neutron floating IPs, ports).

mod compute;
mod identity;
mod network;
mod types;

pub use compute::ComputeClient;
pub use identity::IdentityClient;
pub use network::NetworkClient;
pub use reqwest::{Client as HttpClient, StatusCode};
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("openstack request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("openstack {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("identity response carried no X-Subject-Token header")]
    MissingToken,

    #[error("no {interface} endpoint for service type {service_type} in the catalog")]
    NoEndpoint {
        service_type: String,
        interface: &'static str,
    },

    #[error("failed to read CA certificate {path}: {source}")]
    CaCert {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the provider answered 404 for the requested resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// TLS knobs shared by every service client.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip server certificate verification.
    pub insecure: bool,
    /// PEM bundle to trust in addition to the system roots.
    pub ca_cert: Option<String>,
}

/// Build the HTTP client used by the identity, compute and network clients.
pub fn http_client(tls: &TlsOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(tls.insecure);

    if let Some(path) = &tls.ca_cert {
        let pem = std::fs::read(path).map_err(|source| Error::CaCert {
            path: path.clone(),
            source,
        })?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
    }

    Ok(builder.build()?)
}

async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            endpoint,
            status,
            body,
        });
    }
    Ok(resp)
}

const AUTH_HEADER: &str = "X-Auth-Token";
