use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;

use super::protocol::{Packet, PacketHeader, PacketType};
use super::transport::{HOST_PEER_ID, PeerId, Transport, TransportEvent};

#[derive(Default)]
struct Hub {
    /// Serialized datagrams in flight, keyed by destination endpoint.
    /// `HOST_PEER_ID` is the server's inbox.
    inboxes: HashMap<PeerId, VecDeque<(PeerId, Vec<u8>)>>,
    server_events: Vec<TransportEvent>,
    next_peer_id: PeerId,
}

/// In-process transport for single-threaded tests. Packets still round-trip
/// through the codec so serialization bugs surface in scenario tests too.
pub struct LoopbackTransport {
    hub: Rc<RefCell<Hub>>,
    /// `HOST_PEER_ID` for the server end, the assigned peer id otherwise.
    endpoint: PeerId,
    send_sequence: u32,
    /// Client ends report `PeerConnected` once the host's first packet
    /// lands, mirroring what the UDP transport does.
    host_seen: bool,
    client_events: Vec<TransportEvent>,
    /// When set, outgoing packets vanish. Lets tests simulate loss.
    pub drop_outgoing: bool,
}

impl LoopbackTransport {
    /// Creates the server end of a fresh network.
    pub fn server() -> Self {
        let hub = Rc::new(RefCell::new(Hub {
            next_peer_id: HOST_PEER_ID + 1,
            ..Hub::default()
        }));
        hub.borrow_mut()
            .inboxes
            .insert(HOST_PEER_ID, VecDeque::new());

        Self {
            hub,
            endpoint: HOST_PEER_ID,
            send_sequence: 0,
            host_seen: false,
            client_events: Vec::new(),
            drop_outgoing: false,
        }
    }

    /// Attaches a client end; the server observes a `PeerConnected` event.
    pub fn client_of(server: &LoopbackTransport) -> Self {
        let mut hub = server.hub.borrow_mut();
        let peer = hub.next_peer_id;
        hub.next_peer_id += 1;
        hub.inboxes.insert(peer, VecDeque::new());
        hub.server_events.push(TransportEvent::PeerConnected(peer));
        drop(hub);

        Self {
            hub: Rc::clone(&server.hub),
            endpoint: peer,
            send_sequence: 0,
            host_seen: false,
            client_events: Vec::new(),
            drop_outgoing: false,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.endpoint
    }

    /// Detaches a client end; the server observes a `PeerDisconnected` event.
    pub fn disconnect(&mut self) {
        if self.endpoint == HOST_PEER_ID {
            return;
        }
        let mut hub = self.hub.borrow_mut();
        if hub.inboxes.remove(&self.endpoint).is_some() {
            hub.server_events
                .push(TransportEvent::PeerDisconnected(self.endpoint));
        }
    }

    fn deliver(&mut self, destination: PeerId, payload: PacketType) -> io::Result<()> {
        if self.drop_outgoing {
            return Ok(());
        }

        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        let packet = Packet::new(PacketHeader::new(sequence), payload);
        let data = packet
            .serialize()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let mut hub = self.hub.borrow_mut();
        if let Some(inbox) = hub.inboxes.get_mut(&destination) {
            inbox.push_back((self.endpoint, data));
        }
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, peer: PeerId, payload: PacketType) -> io::Result<()> {
        let destination = if self.endpoint == HOST_PEER_ID {
            peer
        } else {
            HOST_PEER_ID
        };
        self.deliver(destination, payload)
    }

    fn broadcast(&mut self, payload: PacketType) -> io::Result<()> {
        let destinations: Vec<PeerId> = {
            let hub = self.hub.borrow();
            hub.inboxes
                .keys()
                .copied()
                .filter(|&p| p != self.endpoint)
                .collect()
        };
        for destination in destinations {
            self.deliver(destination, payload.clone())?;
        }
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<(PeerId, Packet)>> {
        let mut packets = Vec::new();
        {
            let mut hub = self.hub.borrow_mut();
            let Some(inbox) = hub.inboxes.get_mut(&self.endpoint) else {
                return Ok(Vec::new());
            };

            while let Some((sender, data)) = inbox.pop_front() {
                match Packet::deserialize(&data) {
                    Ok(packet) => packets.push((sender, packet)),
                    Err(e) => log::debug!("loopback dropped undecodable packet: {e}"),
                }
            }
        }

        if self.endpoint != HOST_PEER_ID && !self.host_seen && !packets.is_empty() {
            self.host_seen = true;
            self.client_events
                .push(TransportEvent::PeerConnected(HOST_PEER_ID));
        }
        Ok(packets)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        if self.endpoint == HOST_PEER_ID {
            std::mem::take(&mut self.hub.borrow_mut().server_events)
        } else {
            std::mem::take(&mut self.client_events)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::InputPacket;

    fn input(last_ack_id: u32) -> PacketType {
        PacketType::ClientInput(InputPacket {
            pointer: [0.0; 3],
            buttons: 0,
            last_ack_id,
        })
    }

    #[test]
    fn client_to_server_carries_peer_id() {
        let mut server = LoopbackTransport::server();
        let mut client_a = LoopbackTransport::client_of(&server);
        let mut client_b = LoopbackTransport::client_of(&server);

        client_a.send(HOST_PEER_ID, input(1)).unwrap();
        client_b.send(HOST_PEER_ID, input(2)).unwrap();

        let received = server.receive().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, client_a.peer_id());
        assert_eq!(received[1].0, client_b.peer_id());
    }

    #[test]
    fn broadcast_reaches_all_clients() {
        let mut server = LoopbackTransport::server();
        let mut client_a = LoopbackTransport::client_of(&server);
        let mut client_b = LoopbackTransport::client_of(&server);

        server.broadcast(input(0)).unwrap();

        assert_eq!(client_a.receive().unwrap().len(), 1);
        assert_eq!(client_b.receive().unwrap().len(), 1);
        assert!(server.receive().unwrap().is_empty());
    }

    #[test]
    fn connect_disconnect_events() {
        let mut server = LoopbackTransport::server();
        let mut client = LoopbackTransport::client_of(&server);
        let peer = client.peer_id();

        assert_eq!(
            server.poll_events(),
            vec![TransportEvent::PeerConnected(peer)]
        );

        client.disconnect();
        assert_eq!(
            server.poll_events(),
            vec![TransportEvent::PeerDisconnected(peer)]
        );
    }

    #[test]
    fn client_observes_host_after_first_packet() {
        let mut server = LoopbackTransport::server();
        let mut client = LoopbackTransport::client_of(&server);

        assert!(client.poll_events().is_empty());
        server.send(client.peer_id(), input(0)).unwrap();
        client.receive().unwrap();

        assert_eq!(
            client.poll_events(),
            vec![TransportEvent::PeerConnected(HOST_PEER_ID)]
        );
        // Only reported once.
        client.receive().unwrap();
        assert!(client.poll_events().is_empty());
    }

    #[test]
    fn dropped_packets_never_arrive() {
        let mut server = LoopbackTransport::server();
        let mut client = LoopbackTransport::client_of(&server);

        client.drop_outgoing = true;
        client.send(HOST_PEER_ID, input(0)).unwrap();
        assert!(server.receive().unwrap().is_empty());
    }
}
