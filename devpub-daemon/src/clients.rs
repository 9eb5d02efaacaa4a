//! Connected listeners: admission control and fan-out.

use tracing::{debug, warn};

use crate::seqpacket::SeqPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Over the limit. The connection was closed right after accept.
    Rejected,
}

#[derive(Debug)]
struct Client {
    id: u64,
    channel: SeqPacket,
}

/// Owns every client channel. Size never exceeds `max_clients`.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Vec<Client>,
    max_clients: usize,
    rejecting: bool,
    next_id: u64,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Vec::new(),
            max_clients,
            rejecting: false,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether the last admission attempt hit the limit.
    pub fn is_rejecting(&self) -> bool {
        self.rejecting
    }

    /// Register `channel`, or close it when the registry is full.
    ///
    /// Switching between accepting and rejecting is logged once per switch.
    pub fn admit(&mut self, channel: SeqPacket) -> Admission {
        if self.clients.len() >= self.max_clients {
            if !self.rejecting {
                self.rejecting = true;
                warn!(
                    clients = self.clients.len(),
                    max_clients = self.max_clients,
                    "client limit reached, closing new connections"
                );
            }
            drop(channel);
            return Admission::Rejected;
        }

        if self.rejecting {
            self.rejecting = false;
            debug!(
                clients = self.clients.len(),
                max_clients = self.max_clients,
                "below client limit, accepting connections again"
            );
        }

        let id = self.next_id;
        self.next_id += 1;
        self.clients.push(Client { id, channel });
        debug!(client = id, clients = self.clients.len(), "client connected");
        Admission::Accepted
    }

    /// Send `record` to every client as one message. A client whose send
    /// fails or comes up short is closed and removed. Returns how many
    /// clients got the record.
    pub fn broadcast(&mut self, record: &[u8]) -> usize {
        self.clients.retain(|client| match client.channel.send_record(record) {
            Ok(sent) if sent == record.len() => true,
            Ok(sent) => {
                warn!(
                    client = client.id,
                    sent,
                    expected = record.len(),
                    "short notification, dropping client"
                );
                false
            }
            Err(err) => {
                warn!(client = client.id, error = %err, "notification failed");
                false
            }
        });
        self.clients.len()
    }

    /// Close every channel. Returns how many were open.
    pub fn close_all(&mut self) -> usize {
        let closed = self.clients.len();
        self.clients.clear();
        closed
    }
}
