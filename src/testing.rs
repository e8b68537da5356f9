//! In-memory links, a fake game client and a fake backend for tests.

use crate::{
    connection::{BackendConnection, Connection},
    crypto::{self, KeyPair},
    entity_id::EntityId,
    login::{tests::client_login, LoginData},
    position::{Vec2, Vec3},
    protocol::packet::{
        client::{self, ResourcePackResponseStatus},
        server::{self, PlayStatus, StartGame},
        side,
    },
    proxy::ProxyContext,
    rewrite::block_palette::BlockPaletteRegistry,
    server_info::{ServerInfo, ServerRegistry},
    session::PlayerSession,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{io::DuplexStream, time::timeout};
use uuid::Uuid;

const LINK_BUFFER: usize = 256 * 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The game client's end of a link.
pub struct ClientPeer {
    pub connection: Connection<side::Client>,
}

impl ClientPeer {
    pub fn new(connection: Connection<side::Client>) -> Self {
        Self { connection }
    }

    pub async fn recv(&self) -> Option<server::Packet> {
        timeout(RECV_TIMEOUT, self.connection.recv_packet())
            .await
            .expect("timed out waiting for a packet")
            .unwrap()
    }

    pub async fn recv_n(&self, n: usize) -> Vec<server::Packet> {
        let mut packets = Vec::with_capacity(n);
        for _ in 0..n {
            packets.push(self.recv().await.expect("link closed"));
        }
        packets
    }
}

/// A link from the proxy to a game client.
pub fn link() -> (Connection<side::Server>, ClientPeer) {
    let (proxy_end, client_end) = tokio::io::duplex(LINK_BUFFER);
    (
        Connection::spawn(proxy_end),
        ClientPeer::new(Connection::spawn(client_end)),
    )
}

pub fn address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn context() -> Arc<ProxyContext> {
    let mut servers = ServerRegistry::new();
    servers.insert(ServerInfo::new("lobby", address(19132)));
    servers.insert(ServerInfo::new("survival", address(19133)));
    Arc::new(ProxyContext::new(servers, BlockPaletteRegistry::new()))
}

/// A logged-in player with no backend yet.
pub fn session(context: &Arc<ProxyContext>) -> (Arc<PlayerSession>, ClientPeer) {
    let login = LoginData::from_login(&client_login("Steve", Uuid::from_u128(1))).unwrap();
    let (upstream, client) = link();
    (
        PlayerSession::new(login, upstream, Arc::clone(context)),
        client,
    )
}

/// The backend's end of a link.
pub struct BackendPeer {
    pub connection: Connection<side::Server>,
}

impl BackendPeer {
    pub async fn recv(&self) -> Option<client::Packet> {
        timeout(RECV_TIMEOUT, self.connection.recv_packet())
            .await
            .expect("timed out waiting for a packet")
            .unwrap()
    }

    pub async fn expect_login(&self) -> client::Login {
        match self.recv().await {
            Some(client::Packet::Login(login)) => login,
            other => panic!("expected login, got {other:?}"),
        }
    }

    /// Plays the server side of a login, ending with `start_game`.
    pub async fn accept_login(&self, start_game: StartGame) {
        let login = self.expect_login().await;
        let player_key = crypto::identity_public_key(&login.chain_data).unwrap();
        let server_key = KeyPair::generate();
        let salt = *b"0123456789abcdef";
        let token = crypto::create_handshake_token(&server_key, &salt).unwrap();
        let key = crypto::derive_shared_key(&server_key, &player_key, &salt);

        self.connection
            .send_packet(server::ServerToClientHandshake { token });
        self.connection.enable_encryption(key);
        assert!(matches!(
            self.recv().await,
            Some(client::Packet::ClientToServerHandshake(_))
        ));

        self.connection.send_packet(PlayStatus::LoginSuccess);
        self.connection
            .send_packet(server::ResourcePacksInfo::empty());
        self.expect_pack_response(ResourcePackResponseStatus::HaveAllPacks)
            .await;
        self.connection
            .send_packet(server::ResourcePackStack::empty());
        self.expect_pack_response(ResourcePackResponseStatus::Completed)
            .await;
        self.connection.send_packet(start_game);
    }

    async fn expect_pack_response(&self, status: ResourcePackResponseStatus) {
        match self.recv().await {
            Some(client::Packet::ResourcePackClientResponse(response)) => {
                assert_eq!(response.status, status)
            }
            other => panic!("expected pack response, got {other:?}"),
        }
    }
}

/// Transport to a fake backend, before the proxy has a handle to it.
pub fn backend_io(name: &str, port: u16) -> (ServerInfo, DuplexStream, BackendPeer) {
    let (proxy_end, backend_end) = tokio::io::duplex(LINK_BUFFER);
    (
        ServerInfo::new(name, address(port)),
        proxy_end,
        BackendPeer {
            connection: Connection::spawn(backend_end),
        },
    )
}

/// A connected backend link.
pub fn backend(name: &str) -> (BackendConnection, BackendPeer) {
    let (server, io, peer) = backend_io(name, 19132);
    (BackendConnection::new(server, Connection::spawn(io)), peer)
}

pub fn start_game(runtime_entity_id: u64, dimension: i32) -> StartGame {
    StartGame {
        unique_entity_id: EntityId::from_runtime(runtime_entity_id).unique(),
        runtime_entity_id,
        player_game_type: 0,
        player_position: Vec3::new(0.5, 65.0, 0.5),
        rotation: Vec2::default(),
        dimension,
        difficulty: 1,
        game_rules: Vec::new(),
        block_palette: Vec::new(),
        block_properties: Vec::new(),
        item_entries: Vec::new(),
        ignored_data: Vec::new(),
    }
}
