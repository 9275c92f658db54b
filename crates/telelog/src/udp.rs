// SPDX-License-Identifier: MIT

//! UDP gateway transport.
//!
//! One connected UDP socket carries all envelopes between this process and a
//! radio gateway. A background thread decodes received envelopes, filters on
//! group and destination, and dispatches payloads by AM type id to the
//! mailboxes registered for them. Outbound sends go straight out on the same
//! socket.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::transport::{Address, Envelope, Group, Inbound, SendError, Transport, BROADCAST};

const RECV_BUFFER_LEN: usize = 2048;
// Bounds how long shutdown waits on a quiet link.
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// UDP link to a packet gateway, implementing the outbound [`Transport`]
/// capability and inbound dispatch by AM type id.
pub struct UdpGateway {
    socket: UdpSocket,
    local: Address,
    group: Group,
    running: AtomicBool,
    receivers: Mutex<HashMap<u8, mpsc::Sender<Inbound>>>,
}

impl UdpGateway {
    /// Bind an ephemeral local socket and connect it to the gateway.
    pub fn connect(gateway: &str, local: Address, group: Group) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(gateway)?;
        socket.set_read_timeout(Some(RECV_POLL_TIMEOUT))?;

        Ok(Self {
            socket,
            local,
            group,
            running: AtomicBool::new(false),
            receivers: Mutex::new(HashMap::new()),
        })
    }

    /// Local socket address, mainly useful for tests.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Register the mailbox that receives payloads of the given AM type id.
    /// Call before [`start`](Self::start).
    pub fn register_receiver(&self, amid: u8, mailbox: mpsc::Sender<Inbound>) {
        self.receivers.lock().insert(amid, mailbox);
    }

    /// Spawn the receive thread. The caller keeps its own handle for
    /// sending and for [`stop`](Self::stop).
    pub fn start(self: Arc<Self>) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::Relaxed);
        thread::spawn(move || self.recv_loop())
    }

    /// Ask the receive thread to exit; it notices within one poll timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn recv_loop(&self) {
        debug!(local = %self.local, group = %self.group, "gateway receive loop running");
        let mut buf = [0u8; RECV_BUFFER_LEN];

        while self.running.load(Ordering::Relaxed) {
            let len = match self.socket.recv(&mut buf) {
                Ok(len) => len,
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => {
                    warn!(%err, "gateway receive failed");
                    continue;
                }
            };

            let envelope = match Envelope::decode(&buf[..len]) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(%err, "dropping unparseable envelope");
                    continue;
                }
            };

            if envelope.group != self.group {
                trace!(group = %envelope.group, "ignoring foreign group");
                continue;
            }
            if envelope.dest != self.local && envelope.dest != BROADCAST {
                trace!(dest = %envelope.dest, "ignoring packet for another address");
                continue;
            }

            let receivers = self.receivers.lock();
            match receivers.get(&envelope.amid) {
                Some(mailbox) => {
                    let inbound = Inbound {
                        source: envelope.source,
                        payload: envelope.payload,
                    };
                    if mailbox.try_send(inbound).is_err() {
                        // Mailbox full or closed; the link is lossy anyway.
                        warn!(amid = envelope.amid, "inbound mailbox unavailable, dropping packet");
                    }
                }
                None => trace!(amid = envelope.amid, "no receiver registered"),
            }
        }
        debug!("gateway receive loop stopped");
    }
}

impl Transport for UdpGateway {
    fn send(&self, destination: Address, amid: u8, payload: &[u8]) -> Result<(), SendError> {
        let envelope = Envelope {
            dest: destination,
            source: self.local,
            group: self.group,
            amid,
            payload: payload.to_vec(),
        };
        self.socket.send(&envelope.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DEFAULT_GROUP;

    #[tokio::test]
    async fn test_send_and_dispatch_roundtrip() {
        // Stand-in gateway endpoint.
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let gateway = Arc::new(
            UdpGateway::connect(
                &peer.local_addr().unwrap().to_string(),
                Address(0x0001),
                DEFAULT_GROUP,
            )
            .unwrap(),
        );

        let (tx, mut rx) = mpsc::channel(4);
        gateway.register_receiver(9, tx);
        let link = gateway.clone().start();

        // Outbound: envelope arrives at the peer with our addressing context.
        gateway.send(Address(0x00AB), 9, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 256];
        let len = peer.recv(&mut buf).unwrap();
        let sent = Envelope::decode(&buf[..len]).unwrap();
        assert_eq!(sent.dest, Address(0x00AB));
        assert_eq!(sent.source, Address(0x0001));
        assert_eq!(sent.amid, 9);
        assert_eq!(sent.payload, vec![1, 2, 3]);

        // Inbound: addressed to us, registered amid -> dispatched.
        let inbound = Envelope {
            dest: Address(0x0001),
            source: Address(0x00AB),
            group: DEFAULT_GROUP,
            amid: 9,
            payload: vec![7, 8],
        };
        peer.send_to(&inbound.encode(), gateway.local_addr().unwrap())
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("dispatch timed out")
            .expect("mailbox closed");
        assert_eq!(received.source, Address(0x00AB));
        assert_eq!(received.payload, vec![7, 8]);

        // Foreign group and foreign destination are filtered out.
        let foreign_group = Envelope {
            group: Group(0x33),
            ..inbound.clone()
        };
        let foreign_dest = Envelope {
            dest: Address(0x0BAD),
            ..inbound
        };
        peer.send_to(&foreign_group.encode(), gateway.local_addr().unwrap())
            .unwrap();
        peer.send_to(&foreign_dest.encode(), gateway.local_addr().unwrap())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        gateway.stop();
        link.join().unwrap();
    }
}
