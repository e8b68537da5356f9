/// What the dispatcher should do with a packet after a handler saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAction {
    /// The handler consumed the packet; stop processing it.
    Handled,
    /// Continue with default processing, i.e. pass the packet on.
    Forward,
}

/// A set of packet handlers for one phase of a link.
pub trait PacketHandler<Packet> {
    async fn handle(&mut self, packet: &mut Packet) -> PacketAction;
}
