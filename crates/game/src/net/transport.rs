use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::protocol::{MAX_PACKET_SIZE, Packet, PacketHeader, PacketType};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub type PeerId = u32;

/// Peer id the client side uses for the server, and that the server's own
/// local player occupies in the slot table.
pub const HOST_PEER_ID: PeerId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}

/// Narrow seam over the wire. The replication layer never touches sockets
/// directly; it only sends to a peer, broadcasts, and drains whatever
/// arrived since the last tick.
pub trait Transport {
    fn send(&mut self, peer: PeerId, payload: PacketType) -> io::Result<()>;
    fn broadcast(&mut self, payload: PacketType) -> io::Result<()>;
    /// Non-blocking: returns every packet received since the last call,
    /// with the sending peer. Malformed datagrams are silently skipped.
    fn receive(&mut self) -> io::Result<Vec<(PeerId, Packet)>>;
    /// Connect/disconnect notifications accumulated since the last call.
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

#[derive(Debug)]
struct PeerEntry {
    addr: SocketAddr,
    last_receive_time: Instant,
}

/// Address <-> peer id registry for the hosting side. Peers register on
/// their first valid datagram and are dropped after `timeout` of silence.
#[derive(Debug)]
struct PeerTable {
    by_addr: HashMap<SocketAddr, PeerId>,
    peers: HashMap<PeerId, PeerEntry>,
    next_peer_id: PeerId,
    max_peers: usize,
    timeout: Duration,
}

impl PeerTable {
    fn new(max_peers: usize) -> Self {
        Self {
            by_addr: HashMap::new(),
            peers: HashMap::new(),
            next_peer_id: HOST_PEER_ID + 1,
            max_peers,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn register(&mut self, addr: SocketAddr) -> Option<PeerId> {
        if let Some(&id) = self.by_addr.get(&addr) {
            return Some(id);
        }
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let id = self.next_peer_id;
        self.next_peer_id += 1;
        self.by_addr.insert(addr, id);
        self.peers.insert(
            id,
            PeerEntry {
                addr,
                last_receive_time: Instant::now(),
            },
        );
        Some(id)
    }

    fn touch(&mut self, peer: PeerId) {
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.last_receive_time = Instant::now();
        }
    }

    fn cleanup_timed_out(&mut self) -> Vec<PeerId> {
        let timed_out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, e)| e.last_receive_time.elapsed() > self.timeout)
            .map(|(&id, _)| id)
            .collect();

        for id in &timed_out {
            if let Some(entry) = self.peers.remove(id) {
                self.by_addr.remove(&entry.addr);
            }
        }

        timed_out
    }

    fn addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.peers.values().map(|e| e.addr)
    }
}

enum UdpMode {
    /// Hosting: remote peers come and go via the peer table.
    Host(PeerTable),
    /// Connected to one server, addressed as `HOST_PEER_ID`. The server
    /// counts as connected from its first datagram until it goes silent
    /// for the timeout.
    Client {
        server: SocketAddr,
        last_server_receive: Option<Instant>,
    },
}

/// Non-blocking UDP transport. One instance serves either a hosting server
/// or a single connected client.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    mode: UdpMode,
    send_sequence: u32,
    recv_buffer: Box<[u8; MAX_PACKET_SIZE]>,
    pending_events: Vec<TransportEvent>,
}

impl UdpTransport {
    pub fn host<A: ToSocketAddrs>(bind_addr: A, max_peers: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            mode: UdpMode::Host(PeerTable::new(max_peers)),
            send_sequence: 0,
            recv_buffer: Box::new([0u8; MAX_PACKET_SIZE]),
            pending_events: Vec::new(),
        })
    }

    pub fn connect(server_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            mode: UdpMode::Client {
                server: server_addr,
                last_server_receive: None,
            },
            send_sequence: 0,
            recv_buffer: Box::new([0u8; MAX_PACKET_SIZE]),
            pending_events: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_raw(&mut self, payload: PacketType, addr: SocketAddr) -> io::Result<()> {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        let packet = Packet::new(PacketHeader::new(sequence), payload);

        let data = packet
            .serialize()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "packet exceeds MTU",
            ));
        }

        self.socket.send_to(&data, addr)?;
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: PeerId, payload: PacketType) -> io::Result<()> {
        let addr = match &self.mode {
            UdpMode::Host(table) => table
                .peers
                .get(&peer)
                .map(|e| e.addr)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown peer"))?,
            UdpMode::Client { server, .. } => *server,
        };
        self.send_raw(payload, addr)
    }

    fn broadcast(&mut self, payload: PacketType) -> io::Result<()> {
        let addrs: Vec<SocketAddr> = match &self.mode {
            UdpMode::Host(table) => table.addrs().collect(),
            UdpMode::Client { server, .. } => vec![*server],
        };
        for addr in addrs {
            self.send_raw(payload.clone(), addr)?;
        }
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<(PeerId, Packet)>> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer[..]) {
                Ok((size, addr)) => {
                    let packet = match Packet::deserialize(&self.recv_buffer[..size]) {
                        Ok(p) => p,
                        Err(e) => {
                            log::debug!("dropping undecodable datagram from {addr}: {e}");
                            continue;
                        }
                    };

                    let peer = match &mut self.mode {
                        UdpMode::Host(table) => {
                            let known = table.by_addr.contains_key(&addr);
                            match table.register(addr) {
                                Some(id) => {
                                    if !known {
                                        self.pending_events
                                            .push(TransportEvent::PeerConnected(id));
                                    }
                                    table.touch(id);
                                    id
                                }
                                None => {
                                    log::warn!("rejecting {addr}: peer table full");
                                    continue;
                                }
                            }
                        }
                        UdpMode::Client {
                            server,
                            last_server_receive,
                        } => {
                            if addr != *server {
                                continue;
                            }
                            if last_server_receive.is_none() {
                                self.pending_events
                                    .push(TransportEvent::PeerConnected(HOST_PEER_ID));
                            }
                            *last_server_receive = Some(Instant::now());
                            HOST_PEER_ID
                        }
                    };

                    packets.push((peer, packet));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        match &mut self.mode {
            UdpMode::Host(table) => {
                for peer in table.cleanup_timed_out() {
                    self.pending_events
                        .push(TransportEvent::PeerDisconnected(peer));
                }
            }
            UdpMode::Client {
                last_server_receive,
                ..
            } => {
                if last_server_receive
                    .is_some_and(|t| t.elapsed() > Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                {
                    self.pending_events
                        .push(TransportEvent::PeerDisconnected(HOST_PEER_ID));
                    *last_server_receive = None;
                }
            }
        }

        Ok(packets)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_table_caps_registrations() {
        let mut table = PeerTable::new(2);

        let a = table.register("127.0.0.1:5001".parse().unwrap());
        let b = table.register("127.0.0.1:5002".parse().unwrap());
        let c = table.register("127.0.0.1:5003".parse().unwrap());

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());

        // Re-registering a known address is not a new peer.
        let again = table.register("127.0.0.1:5001".parse().unwrap());
        assert_eq!(again, a);
    }

    #[test]
    fn udp_roundtrip_with_peer_identity() {
        let mut server = UdpTransport::host("127.0.0.1:0", 3).unwrap();
        let mut client = UdpTransport::connect(server.local_addr()).unwrap();

        client
            .send(
                HOST_PEER_ID,
                PacketType::ClientInput(crate::net::InputPacket {
                    pointer: [0.0; 3],
                    buttons: 0,
                    last_ack_id: 0,
                }),
            )
            .unwrap();

        let mut received = Vec::new();
        let start = std::time::Instant::now();
        while received.is_empty() && start.elapsed() < Duration::from_millis(500) {
            received = server.receive().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(received.len(), 1);
        let (peer, packet) = &received[0];
        assert!(*peer > HOST_PEER_ID);
        assert!(matches!(packet.payload, PacketType::ClientInput(_)));
        assert_eq!(
            server.poll_events(),
            vec![TransportEvent::PeerConnected(*peer)]
        );

        // The reply is what marks the server connected on the client side.
        assert!(client.poll_events().is_empty());
        server
            .send(
                *peer,
                PacketType::ClientInput(crate::net::InputPacket {
                    pointer: [0.0; 3],
                    buttons: 0,
                    last_ack_id: 1,
                }),
            )
            .unwrap();

        let mut replies = Vec::new();
        let start = std::time::Instant::now();
        while replies.is_empty() && start.elapsed() < Duration::from_millis(500) {
            replies = client.receive().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, HOST_PEER_ID);
        assert_eq!(
            client.poll_events(),
            vec![TransportEvent::PeerConnected(HOST_PEER_ID)]
        );
    }
}
