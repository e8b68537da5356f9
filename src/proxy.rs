//! The client-facing front end of the proxy.

use crate::{
    connection::Connection,
    event::ProxyEvent,
    login::LoginData,
    protocol::packet::{client, server, side},
    rewrite::block_palette::BlockPaletteRegistry,
    server_info::ServerRegistry,
    session::PlayerSession,
    translation::{DefaultTranslator, Translator},
    upstream,
};
use anyhow::{bail, Context};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::broadcast,
    time::timeout,
};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 64;

/// Read-only state shared by every player session.
pub struct ProxyContext {
    pub servers: ServerRegistry,
    pub palettes: BlockPaletteRegistry,
    pub translator: Box<dyn Translator>,
    pub events: broadcast::Sender<ProxyEvent>,
    /// Limit on establishing the transport to a backend.
    pub connect_timeout: Duration,
    /// Limit on a backend negotiation, from login to start-game.
    pub negotiation_timeout: Duration,
}

impl ProxyContext {
    pub fn new(servers: ServerRegistry, palettes: BlockPaletteRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            servers,
            palettes,
            translator: Box::new(DefaultTranslator),
            events,
            connect_timeout: CONNECT_TIMEOUT,
            negotiation_timeout: NEGOTIATION_TIMEOUT,
        }
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }
}

/// Accepts game clients until the listener fails.
pub async fn run(listener: TcpListener, context: Arc<ProxyContext>) -> anyhow::Result<()> {
    loop {
        let (stream, address) = listener.accept().await.context("listener closed")?;
        stream.set_nodelay(true)?;

        tracing::info!("Accepted connection from {address}");
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, context).await {
                tracing::info!("Connection from {address} lost: {e:?}");
            }
        });
    }
}

/// Logs a client in and serves it until it disconnects.
pub async fn handle_client<S>(io: S, context: Arc<ProxyContext>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let upstream = Connection::<side::Server>::spawn(io);
    let packet = timeout(LOGIN_TIMEOUT, upstream.recv_packet())
        .await
        .context("login timed out")??
        .context("disconnected before login")?;
    let login = match packet {
        client::Packet::Login(login) => login,
        other => {
            upstream.close();
            bail!("expected login, got {}", other.as_ref());
        }
    };

    let login = match LoginData::from_login(&login) {
        Ok(login) => login,
        Err(e) => {
            upstream.send_packet(server::Disconnect {
                hide_disconnect_screen: false,
                message: "Invalid login".to_owned(),
            });
            upstream.close();
            return Err(e).context("invalid login");
        }
    };
    tracing::info!(
        player = %login.username,
        uuid = %login.uuid,
        protocol = %login.protocol,
        "Player logged in"
    );

    upstream.send_batch(vec![
        server::PlayStatus::LoginSuccess.into(),
        server::ResourcePacksInfo::empty().into(),
    ]);

    let session = PlayerSession::new(login, upstream, context);
    upstream::run(session).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        login::tests::client_login,
        protocol::packet::client::{ResourcePackClientResponse, ResourcePackResponseStatus},
        testing,
    };
    use uuid::Uuid;

    #[tokio::test]
    async fn login_is_acknowledged_with_empty_packs() {
        let (proxy_end, client_end) = tokio::io::duplex(64 * 1024);
        tokio::spawn(handle_client(proxy_end, testing::context()));
        let client = testing::ClientPeer::new(Connection::spawn(client_end));

        client
            .connection
            .send_packet(client_login("Alex", Uuid::from_u128(3)));
        let packets = client.recv_n(2).await;
        assert!(matches!(
            packets[0],
            server::Packet::PlayStatus(server::PlayStatus::LoginSuccess)
        ));
        assert!(matches!(packets[1], server::Packet::ResourcePacksInfo(_)));

        client
            .connection
            .send_packet(ResourcePackClientResponse::new(
                ResourcePackResponseStatus::HaveAllPacks,
            ));
        assert!(matches!(
            client.recv().await,
            Some(server::Packet::ResourcePackStack(_))
        ));
    }

    #[tokio::test]
    async fn non_login_first_packet_is_rejected() {
        let (proxy_end, client_end) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(handle_client(proxy_end, testing::context()));
        let client = Connection::<side::Client>::spawn(client_end);
        client.send_packet(client::RequestChunkRadius { radius: 4 });
        assert!(handle.await.unwrap().is_err());
    }
}
