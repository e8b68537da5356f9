use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, str::FromStr};

/// A backend the proxy can move players to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub address: SocketAddr,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseServerError {
    #[error("expected NAME=ADDRESS")]
    MissingSeparator,
    #[error("server name is empty")]
    EmptyName,
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

/// Parses `NAME=ADDRESS`.
impl FromStr for ServerInfo {
    type Err = ParseServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, address) = s.split_once('=').ok_or(ParseServerError::MissingSeparator)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseServerError::EmptyName);
        }
        Ok(Self::new(name, address.trim().parse()?))
    }
}

/// The configured backends.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: AHashMap<String, ServerInfo>,
    default_server: Option<String>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server. The first one registered is the default
    /// until [`set_default`](Self::set_default) says otherwise.
    pub fn insert(&mut self, server: ServerInfo) {
        if self.default_server.is_none() {
            self.default_server = Some(server.name.clone());
        }
        self.servers.insert(server.name.to_lowercase(), server);
    }

    pub fn set_default(&mut self, name: &str) -> bool {
        match self.get(name) {
            Some(server) => {
                self.default_server = Some(server.name.clone());
                true
            }
            None => false,
        }
    }

    /// Looks a server up by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ServerInfo> {
        self.servers.get(&name.to_lowercase())
    }

    pub fn default_server(&self) -> Option<&ServerInfo> {
        self.default_server.as_deref().and_then(|name| self.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerInfo> {
        self.servers.values()
    }
}
