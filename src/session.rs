//! State of one connected player.

use crate::{
    connection::{BackendConnection, Connection},
    downstream::{self, switch::SwitchMode},
    error::SwitchError,
    event::ProxyEvent,
    handler::PacketAction,
    injection,
    login::LoginData,
    position::Vec3,
    protocol::packet::{client, server, side},
    proxy::ProxyContext,
    rewrite::RewriteData,
    server_info::ServerInfo,
    translation::TranslationContainer,
};
use ahash::AHashSet;
use std::{mem, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{Mutex, MutexGuard},
    time::timeout,
};
use uuid::Uuid;

/// The player's backend links.
///
/// At most one connection is pending at a time.
#[derive(Debug, Default)]
pub struct Connections {
    pub active: Option<BackendConnection>,
    pub pending: Option<BackendConnection>,
}

impl Connections {
    pub fn is_pending(&self, backend: &BackendConnection) -> bool {
        self.pending.as_ref().is_some_and(|p| p.same_link(backend))
    }

    pub fn is_active(&self, backend: &BackendConnection) -> bool {
        self.active.as_ref().is_some_and(|a| a.same_link(backend))
    }
}

/// What the client currently shows that a new backend would not know about.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VisibleState {
    pub players: AHashSet<Uuid>,
    pub entities: AHashSet<i64>,
    pub scoreboards: AHashSet<String>,
    pub boss_bars: AHashSet<i64>,
}

/// Progress of the two-step dimension change that presents a new world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DimensionChange {
    #[default]
    Idle,
    /// The client is headed to a transient dimension; once it confirms,
    /// it is sent on to `dimension`.
    AwaitingFirstAck { dimension: i32, position: Vec3 },
    /// The client is headed to the real dimension.
    AwaitingSecondAck,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub connections: Connections,
    pub rewrite: RewriteData,
    pub visible: VisibleState,
    pub dimension_change: DimensionChange,
}

impl SessionState {
    /// Takes the tracked visible state, leaving it empty.
    pub fn drain_visible_state(&mut self) -> VisibleState {
        mem::take(&mut self.visible)
    }

    /// Whether packets from `backend` should reach the client.
    ///
    /// Once a new backend's world has been presented, the old active
    /// backend is muted until the transfer completes.
    pub fn should_forward(&self, backend: &BackendConnection) -> bool {
        let presented = self
            .rewrite
            .transfer_callback()
            .is_some_and(|callback| callback.connection().same_link(backend));
        if self.connections.is_pending(backend) {
            presented
        } else {
            self.connections.is_active(backend) && self.rewrite.transfer_callback().is_none()
        }
    }
}

pub struct PlayerSession {
    login: LoginData,
    upstream: Connection<side::Server>,
    context: Arc<ProxyContext>,
    state: Mutex<SessionState>,
}

impl PlayerSession {
    pub fn new(
        login: LoginData,
        upstream: Connection<side::Server>,
        context: Arc<ProxyContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            login,
            upstream,
            context,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn login(&self) -> &LoginData {
        &self.login
    }

    /// Link to the game client.
    pub fn upstream(&self) -> &Connection<side::Server> {
        &self.upstream
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub(crate) fn emit(&self, event: ProxyEvent) {
        // No subscribers is fine.
        self.context.events.send(event).ok();
    }

    fn check_can_switch(state: &SessionState, server: &ServerInfo) -> Result<(), SwitchError> {
        if state.connections.pending.is_some() {
            return Err(SwitchError::TransferInProgress);
        }
        if let Some(active) = &state.connections.active {
            if active.server.name == server.name {
                return Err(SwitchError::AlreadyConnected(server.name.clone()));
            }
        }
        Ok(())
    }

    /// Connects to `server` and starts negotiating with it.
    ///
    /// Without an active backend this is the player's initial connection.
    pub async fn connect(self: &Arc<Self>, server: ServerInfo) -> Result<(), SwitchError> {
        Self::check_can_switch(&*self.state().await, &server)?;
        let stream = timeout(
            self.context.connect_timeout,
            TcpStream::connect(server.address),
        )
        .await
        .map_err(|_| SwitchError::TimedOut)??;
        stream.set_nodelay(true)?;
        self.begin_switch(server, stream).await
    }

    /// Starts negotiating with `server` over an established transport.
    pub async fn begin_switch<S>(self: &Arc<Self>, server: ServerInfo, io: S) -> Result<(), SwitchError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut state = self.state().await;
        Self::check_can_switch(&state, &server)?;

        let mode = if state.connections.active.is_none() {
            SwitchMode::Initial
        } else {
            SwitchMode::Transfer
        };

        let backend = BackendConnection::new(server, Connection::spawn(io));
        backend.connection.send_packet(self.login.backend_login());
        state.connections.pending = Some(backend.clone());
        drop(state);

        tracing::info!(
            player = %self.login.username,
            server = %backend.server,
            ?mode,
            "Connecting to backend"
        );
        tokio::spawn(downstream::run(Arc::clone(self), backend, mode));
        Ok(())
    }

    /// Tears down a failed negotiation with `backend` and tells the player why.
    ///
    /// Before the new world is presented the player stays on the active
    /// backend. Afterwards the rewrite state is restored and the player is
    /// disconnected.
    pub async fn abort_switch(&self, backend: &BackendConnection, error: &SwitchError) {
        let mut state = self.state().await;
        if state.connections.is_pending(backend) {
            state.connections.pending = None;
        }
        let presented = state
            .rewrite
            .transfer_callback()
            .is_some_and(|callback| callback.connection().same_link(backend));
        if presented {
            if let Some(callback) = state.rewrite.take_transfer_callback() {
                state.rewrite.restore_backend_rewrite(callback.into_previous());
            }
            state.dimension_change = DimensionChange::Idle;
        }
        let has_active = state.connections.active.is_some();
        drop(state);

        let message = error.translation(&backend.server.name);
        // The client's old world was already torn down, so a presented
        // switch cannot fall back to the active backend.
        if has_active && !presented {
            self.send_message(&message);
        } else {
            self.disconnect(&self.context.translator.translate(&message));
        }
    }

    /// Reacts to a backend link going away.
    pub async fn on_backend_closed(&self, backend: &BackendConnection) {
        let state = self.state().await;
        let is_active = state.connections.is_active(backend);
        let is_pending = state.connections.is_pending(backend);
        drop(state);

        if is_active {
            tracing::info!(
                player = %self.login.username,
                server = %backend.server.name,
                "Active backend closed"
            );
            self.disconnect(&format!("Lost connection to {}", backend.server.name));
        } else if is_pending {
            self.abort_switch(
                backend,
                &SwitchError::Disconnected("connection closed".to_owned()),
            )
            .await;
        }
    }

    /// Handles the client confirming a dimension change.
    pub async fn on_dimension_change_success(&self) -> PacketAction {
        let mut state = self.state().await;
        match state.dimension_change {
            DimensionChange::Idle => PacketAction::Forward,
            DimensionChange::AwaitingFirstAck {
                dimension,
                position,
            } => {
                injection::dimension_change(
                    &self.upstream,
                    dimension,
                    position,
                    state.rewrite.chunk_radius,
                );
                state.rewrite.dimension = dimension;
                state.dimension_change = DimensionChange::AwaitingSecondAck;
                PacketAction::Handled
            }
            DimensionChange::AwaitingSecondAck => {
                state.dimension_change = DimensionChange::Idle;
                drop(state);
                if let Err(e) = self.complete_transfer().await {
                    tracing::warn!(player = %self.login.username, "Could not complete transfer: {e}");
                }
                PacketAction::Handled
            }
        }
    }

    /// Sends a packet from the client on to the active backend.
    pub async fn send_to_backend(&self, packet: client::Packet) {
        let state = self.state().await;
        match &state.connections.active {
            Some(active) => active.connection.send_packet(packet),
            None => tracing::trace!("No active backend, dropping {}", packet.as_ref()),
        }
    }

    pub fn send_message(&self, message: &TranslationContainer) {
        let text = self.context.translator.translate(message);
        self.upstream.send_packet(server::Text::raw(&text));
    }

    /// Kicks the player with `message`.
    pub fn disconnect(&self, message: &str) {
        self.upstream.send_packet(server::Disconnect {
            hide_disconnect_screen: false,
            message: message.to_owned(),
        });
        self.upstream.close();
    }

    /// Closes every backend link once the client is gone.
    pub async fn close(&self) {
        let mut state = self.state().await;
        let connections = mem::take(&mut state.connections);
        state.rewrite.take_transfer_callback();
        drop(state);

        for backend in connections.active.iter().chain(&connections.pending) {
            backend.close();
        }
        tracing::info!(player = %self.login.username, "Player disconnected");
        self.emit(ProxyEvent::PlayerDisconnected {
            player: self.login.username.clone(),
            uuid: self.login.uuid,
        });
    }
}
