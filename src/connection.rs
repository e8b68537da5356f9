//! Packet links to game clients and backends.
//!
//! Each link is driven by its own task, which owns the transport and the
//! batch codec. Handles talk to the task over `flume` channels: outgoing
//! commands are fire-and-forget and applied in the order they were issued.

use crate::{
    protocol::{batch::BatchCodec, encryption::EncryptionKey, packet},
    server_info::ServerInfo,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select, task,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Largest transport frame accepted from a peer.
const MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;

/// Incoming packets buffered before the link task stops reading.
const INCOMING_CAPACITY: usize = 256;

enum Command<Side: packet::Side> {
    Send(Vec<Side::SendPacket>),
    EnableEncryption(EncryptionKey),
    Close,
}

/// Handle to a link. Clones refer to the same link.
pub struct Connection<Side: packet::Side> {
    commands: flume::Sender<Command<Side>>,
    incoming: flume::Receiver<anyhow::Result<Side::RecvPacket>>,
}

impl<Side: packet::Side> Clone for Connection<Side> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            incoming: self.incoming.clone(),
        }
    }
}

impl<Side: packet::Side> fmt::Debug for Connection<Side> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<Side: packet::Side> Connection<Side> {
    /// Spawns the task driving a link over `io`.
    pub fn spawn<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (command_tx, command_rx) = flume::unbounded();
        let (incoming_tx, incoming_rx) = flume::bounded(INCOMING_CAPACITY);

        task::spawn(async move {
            if let Err(e) = drive::<Side, S>(io, command_rx, &incoming_tx).await {
                tracing::debug!("Link closed with error: {e:#}");
                incoming_tx.send_async(Err(e)).await.ok();
            }
        });

        Self {
            commands: command_tx,
            incoming: incoming_rx,
        }
    }

    /// Queues a packet as its own batch.
    pub fn send_packet(&self, packet: impl Into<Side::SendPacket>) {
        self.send_batch(vec![packet.into()]);
    }

    /// Queues packets to be sent together in one batch.
    pub fn send_batch(&self, packets: Vec<Side::SendPacket>) {
        if packets.is_empty() {
            return;
        }
        if self.commands.send(Command::Send(packets)).is_err() {
            tracing::trace!("Dropping packets for a closed link");
        }
    }

    /// Encrypts every batch queued after this call, in both directions.
    pub fn enable_encryption(&self, key: EncryptionKey) {
        self.commands.send(Command::EnableEncryption(key)).ok();
    }

    /// Flushes queued batches, then shuts the link down.
    pub fn close(&self) {
        self.commands.send(Command::Close).ok();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_disconnected()
    }

    /// Whether `other` is a handle to the same link.
    pub fn same_link(&self, other: &Self) -> bool {
        self.commands.same_channel(&other.commands)
    }

    /// Waits for the next packet on this link.
    /// Returns `None` once the link is closed and drained.
    pub async fn recv_packet(&self) -> anyhow::Result<Option<Side::RecvPacket>> {
        match self.incoming.recv_async().await {
            Ok(Ok(packet)) => Ok(Some(packet)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

async fn drive<Side, S>(
    io: S,
    commands: flume::Receiver<Command<Side>>,
    incoming: &flume::Sender<anyhow::Result<Side::RecvPacket>>,
) -> anyhow::Result<()>
where
    Side: packet::Side,
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(
        io,
        LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec(),
    );
    let mut codec = BatchCodec::<Side>::new();

    loop {
        select! {
            biased;
            command = commands.recv_async() => match command {
                Ok(Command::Send(packets)) => {
                    let frame = codec.encode_batch(&packets)?;
                    framed.send(Bytes::from(frame)).await?;
                }
                Ok(Command::EnableEncryption(key)) => codec.enable_encryption(key)?,
                Ok(Command::Close) | Err(_) => break,
            },
            frame = framed.next() => match frame {
                Some(frame) => {
                    for packet in codec.decode_batch(&frame?)? {
                        tracing::trace!("Received {}", packet.as_ref());
                        if incoming.send_async(Ok(packet)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                None => break,
            },
        }
    }

    SinkExt::<Bytes>::close(&mut framed).await.ok();
    Ok(())
}

/// A link to a backend, tagged with the server it leads to.
#[derive(Debug, Clone)]
pub struct BackendConnection {
    pub server: ServerInfo,
    pub connection: Connection<packet::side::Client>,
}

impl BackendConnection {
    pub fn new(server: ServerInfo, connection: Connection<packet::side::Client>) -> Self {
        Self { server, connection }
    }

    pub fn same_link(&self, other: &Self) -> bool {
        self.connection.same_link(&other.connection)
    }

    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::{client, server, side};

    fn pair() -> (Connection<side::Server>, Connection<side::Client>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Connection::spawn(a), Connection::spawn(b))
    }

    #[tokio::test]
    async fn packets_arrive_in_issue_order() {
        let (server_end, client_end) = pair();
        for radius in 1..=5 {
            server_end.send_packet(server::ChunkRadiusUpdated { radius });
        }
        for expected in 1..=5 {
            match client_end.recv_packet().await.unwrap() {
                Some(server::Packet::ChunkRadiusUpdated(p)) => assert_eq!(p.radius, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn encryption_applies_to_later_batches() {
        let (server_end, client_end) = pair();
        let key = EncryptionKey::new([5; 32]);
        server_end.enable_encryption(key);
        client_end.enable_encryption(key);
        client_end.send_packet(client::RequestChunkRadius { radius: 12 });
        match server_end.recv_packet().await.unwrap() {
            Some(client::Packet::RequestChunkRadius(p)) => assert_eq!(p.radius, 12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_ends_the_peer_stream() {
        let (server_end, client_end) = pair();
        server_end.send_packet(server::ChunkRadiusUpdated { radius: 4 });
        server_end.close();
        assert!(client_end.recv_packet().await.unwrap().is_some());
        assert!(client_end.recv_packet().await.unwrap().is_none());
        assert!(server_end.same_link(&server_end.clone()));
    }
}
