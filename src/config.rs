//! Command-line configuration of the proxy binary.

use crate::{
    protocol::ProtocolVersion,
    proxy::ProxyContext,
    rewrite::block_palette::BlockPaletteRegistry,
    server_info::{ServerInfo, ServerRegistry},
};
use anyhow::{bail, Context};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Parser)]
#[command(about = "Bedrock proxy that moves players between backend servers")]
pub struct Config {
    /// Address game clients connect to.
    #[arg(long, default_value = "0.0.0.0:19132")]
    pub bind: SocketAddr,

    /// Backend server, as NAME=ADDRESS. May be repeated.
    #[arg(long = "server", required = true)]
    pub servers: Vec<ServerInfo>,

    /// Server players join first. Defaults to the first `--server`.
    #[arg(long)]
    pub default_server: Option<String>,

    /// Block palette for backends that send none, as PROTOCOL=PATH to a JSON file.
    #[arg(long = "block-palette")]
    pub block_palettes: Vec<PaletteSource>,

    /// Seconds allowed for a backend to finish its login.
    #[arg(long, default_value_t = 30)]
    pub negotiation_timeout: u64,

    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

#[derive(Debug, Clone)]
pub struct PaletteSource {
    pub protocol: ProtocolVersion,
    pub path: PathBuf,
}

impl FromStr for PaletteSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, path) = s.split_once('=').context("expected PROTOCOL=PATH")?;
        let protocol = protocol.trim().parse().context("invalid protocol version")?;
        Ok(Self {
            protocol: ProtocolVersion::new(protocol),
            path: PathBuf::from(path.trim()),
        })
    }
}

impl Config {
    /// Builds the shared context, loading every block palette.
    pub fn build_context(&self) -> anyhow::Result<ProxyContext> {
        let mut servers = ServerRegistry::new();
        for server in &self.servers {
            servers.insert(server.clone());
        }
        if let Some(name) = &self.default_server {
            if !servers.set_default(name) {
                bail!("default server '{name}' is not configured");
            }
        }

        let mut palettes = BlockPaletteRegistry::new();
        for source in &self.block_palettes {
            palettes.load_json(source.protocol, &source.path)?;
        }

        let mut context = ProxyContext::new(servers, palettes);
        context.negotiation_timeout = Duration::from_secs(self.negotiation_timeout);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_servers_and_default() {
        let config = Config::try_parse_from([
            "proxy",
            "--server",
            "lobby=127.0.0.1:19133",
            "--server",
            "Survival=127.0.0.1:19134",
            "--default-server",
            "survival",
        ])
        .unwrap();
        let context = config.build_context().unwrap();
        assert_eq!(
            context.servers.default_server().map(|s| s.name.as_str()),
            Some("Survival")
        );
        assert_eq!(context.servers.iter().count(), 2);
    }

    #[test]
    fn unknown_default_server_is_an_error() {
        let config = Config::try_parse_from([
            "proxy",
            "--server",
            "lobby=127.0.0.1:19133",
            "--default-server",
            "hub",
        ])
        .unwrap();
        assert!(config.build_context().is_err());
    }

    #[test]
    fn palette_source_needs_protocol_and_path() {
        let source: PaletteSource = "408=palettes/408.json".parse().unwrap();
        assert_eq!(source.protocol, ProtocolVersion::MINECRAFT_PE_1_16_20);
        assert!("palettes/408.json".parse::<PaletteSource>().is_err());
    }
}
