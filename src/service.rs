pub mod address;
pub mod identity;
pub mod keys;
pub mod provision;
pub mod reload;
pub mod render;

use std::{net::IpAddr, sync::Arc};

use tokio::sync::Mutex;

use cidr::IpCidr;
use clap::Parser;
use thiserror::Error;
use tracing::instrument;

pub use address::{TunnelAddress, UsedAddresses};
pub use identity::{ClientName, ValidationError};
pub use keys::{KeyError, KeyPair};
pub use reload::ReloadStrategy;

use crate::access::{AccessError, ServerAccess};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("server access failed: {0}")]
    Access(#[from] AccessError),
    #[error("no free tunnel address left")]
    AddressSpaceExhausted,
    #[error("config named '{0}' already exists")]
    NameCollision(ClientName),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("provisioning failed: {0}")]
    Provisioning(String),
}

/// Wraps an access failure of one provisioning step.
pub(crate) fn step(what: &'static str) -> impl Fn(AccessError) -> ServiceError {
    move |e| ServiceError::Provisioning(format!("{what}: {e}"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid interface name {0:?}")]
    InvalidInterface(String),
    #[error("invalid dns server {0:?}")]
    InvalidDns(String),
    #[error("invalid allowed ips entry {0:?}: {1}")]
    InvalidAllowedIps(String, cidr::errors::NetworkParseError),
    #[error("invalid server key: {0}")]
    InvalidServerKey(#[from] KeyError),
    #[error("either SERVER_PUB_KEY or SERVER_PRIV_KEY must be set")]
    MissingServerKey,
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(long, env = "WG_INTERFACE", default_value = "wg0", value_parser)]
    interface: String,
    #[clap(long, env = "WG_CONFIG_PATH", default_value = "/etc/wireguard/wg0.conf", value_parser)]
    server_config: String,
    #[clap(long, env = "WG_CLIENTS_DIR", default_value = "/etc/wireguard/clients", value_parser)]
    clients_dir: String,
    /// Endpoint host handed out to clients.
    #[clap(long, env = "WG_SERVER_HOST", value_parser)]
    server_host: String,
    #[clap(long, env = "WG_SERVER_PORT", default_value_t = 51820, value_parser)]
    server_port: u16,
    #[clap(long, env = "SERVER_PUB_KEY", value_parser)]
    server_public_key: Option<String>,
    /// Only used to derive the public key when SERVER_PUB_KEY is not set.
    #[clap(long, env = "SERVER_PRIV_KEY", hide_env_values = true, value_parser)]
    server_private_key: Option<String>,
    #[clap(long, env = "CLIENT_DNS", default_value = "1.1.1.1, 1.0.0.1", value_parser)]
    dns: String,
    #[clap(long, env = "CLIENT_ALLOWED_IPS", default_value = "0.0.0.0/0,::/0", value_parser)]
    allowed_ips: String,
    /// Hand out IPv4 addresses only.
    #[clap(long, env = "CLIENT_NO_IPV6", value_parser)]
    no_ipv6: bool,
    /// Defaults to `sync` for the remote backend and `restart` for the local one.
    #[clap(long, env = "WG_RELOAD", value_parser)]
    reload: Option<ReloadStrategy>,
}

/// Server side values rendered into every client config.
#[derive(Debug, Clone)]
pub struct ServerParams {
    pub public_key: String,
    pub host: String,
    pub port: u16,
    pub dns: String,
    pub allowed_ips: String,
    pub ipv6: bool,
}

impl ServerParams {
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn validate_interface(name: &str) -> Result<(), ConfigError> {
    // IFNAMSIZ - 1, not a path component, and nothing the shell would interpret
    let valid = (1..=15).contains(&name.len())
        && name.chars().any(|c| c != '.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidInterface(name.to_owned()))
    }
}

fn validate_dns(dns: &str) -> Result<(), ConfigError> {
    for server in dns.split(',').map(str::trim) {
        if server.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidDns(server.to_owned()));
        }
    }
    Ok(())
}

fn validate_allowed_ips(allowed_ips: &str) -> Result<(), ConfigError> {
    for network in allowed_ips.split(',').map(str::trim) {
        network
            .parse::<IpCidr>()
            .map_err(|e| ConfigError::InvalidAllowedIps(network.to_owned(), e))?;
    }
    Ok(())
}

impl Config {
    fn server_params(&self) -> Result<ServerParams, ConfigError> {
        validate_dns(&self.dns)?;
        validate_allowed_ips(&self.allowed_ips)?;

        let public_key = match (&self.server_public_key, &self.server_private_key) {
            (Some(public), _) => {
                keys::decode_key(public)?;
                public.trim().to_owned()
            }
            (None, Some(private)) => keys::public_from_private(private)?,
            (None, None) => return Err(ConfigError::MissingServerKey),
        };

        Ok(ServerParams {
            public_key,
            host: self.server_host.trim().to_owned(),
            port: self.server_port,
            dns: self.dns.trim().to_owned(),
            allowed_ips: self.allowed_ips.trim().to_owned(),
            ipv6: !self.no_ipv6,
        })
    }
}

/// The provisioning engine. Cheap to clone, clones share the ledger lock.
#[derive(Clone)]
pub struct Provisioner {
    access: Arc<dyn ServerAccess>,

    /// Held across allocate, write, append and reload so concurrent
    /// provisions can't pick the same address.
    ledger: Arc<Mutex<()>>,

    server: ServerParams,
    interface: String,
    server_config: String,
    clients_dir: String,
    reload: ReloadStrategy,
}

impl Provisioner {
    #[instrument(skip_all)]
    pub fn new(
        config: Config,
        access: Arc<dyn ServerAccess>,
        default_reload: ReloadStrategy,
    ) -> Result<Self, ConfigError> {
        validate_interface(&config.interface)?;
        let server = config.server_params()?;

        Ok(Self {
            access,
            ledger: Arc::new(Mutex::new(())),
            server,
            reload: config.reload.unwrap_or(default_reload),
            interface: config.interface,
            server_config: config.server_config,
            clients_dir: config.clients_dir,
        })
    }

    pub fn server(&self) -> &ServerParams {
        &self.server
    }
}
