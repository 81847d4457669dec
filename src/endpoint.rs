use std::net::SocketAddr;

use log::debug;
use tokio::net::lookup_host;

use crate::error::SourceError;

/// Port used when a host is given without one.
pub const DEFAULT_PORT: u16 = 27015;

/// All addresses a host name resolved to, and the one currently in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    addrs: Vec<SocketAddr>,
    index: usize,
}

impl Endpoint {
    /// Resolve `host`, given as `name:port` or just `name`.
    pub async fn resolve(host: &str) -> Result<Self, SourceError> {
        Self::resolve_with_port(host, DEFAULT_PORT).await
    }

    /// Resolve `host`, falling back to `default_port` if it carries no port.
    pub async fn resolve_with_port(host: &str, default_port: u16) -> Result<Self, SourceError> {
        let target = if has_port(host) {
            host.to_string()
        } else {
            format!("{}:{}", host, default_port)
        };

        let addrs: Vec<SocketAddr> = lookup_host(target.as_str())
            .await
            .map_err(|_| SourceError::UnresolvableHost(host.to_string()))?
            .collect();
        debug!("{} resolved to {:?}", host, addrs);

        Self::new(host, addrs)
    }

    /// An endpoint from already known addresses.
    pub fn new(host: &str, addrs: Vec<SocketAddr>) -> Result<Self, SourceError> {
        if addrs.is_empty() {
            return Err(SourceError::UnresolvableHost(host.to_string()));
        }
        Ok(Endpoint {
            host: host.to_string(),
            addrs,
            index: 0,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The address currently in use.
    pub fn addr(&self) -> SocketAddr {
        self.addrs[self.index]
    }

    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Switch to the next address, wrapping around after the last one.
    ///
    /// Returns `false` if the host has no other address to switch to.
    pub fn rotate(&mut self) -> bool {
        if self.addrs.len() == 1 {
            return false;
        }
        self.index = (self.index + 1) % self.addrs.len();
        debug!("{} rotated to {}", self.host, self.addr());
        true
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            host: addr.to_string(),
            addrs: vec![addr],
            index: 0,
        }
    }
}

fn has_port(host: &str) -> bool {
    if host.parse::<SocketAddr>().is_ok() {
        return true;
    }
    // a bare IPv6 address has colons but no port
    match host.rsplit_once(':') {
        Some((name, port)) => !name.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}
