//! UDP link to the command station.
//!
//! The command station answers on the port it was addressed from, so one
//! connected socket carries both directions.  Sending is synchronous
//! (`try_send`): UDP sends do not block in practice, and the gateway handlers
//! must never await.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::application::ports::WireSink;
use crate::infrastructure::gateway_task::GatewayInput;

/// Largest datagram the command station sends is well below one Ethernet MTU.
const RECV_BUF_SIZE: usize = 1500;

pub struct Z21Link {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl Z21Link {
    /// Binds an ephemeral local port and connects it to `z21_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or connected.
    pub async fn connect(z21_addr: SocketAddr) -> anyhow::Result<Self> {
        let local: SocketAddr = if z21_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("failed to bind UDP socket on {local}"))?;
        socket
            .connect(z21_addr)
            .await
            .with_context(|| format!("failed to connect UDP socket to {z21_addr}"))?;

        info!(local = ?socket.local_addr().ok(), peer = %z21_addr, "Z21 link ready");
        Ok(Self { socket: Arc::new(socket), peer: z21_addr })
    }

    /// A sending handle for the gateway task.
    pub fn sink(&self) -> UdpWire {
        UdpWire { socket: Arc::clone(&self.socket), peer: self.peer }
    }

    /// Spawns the receive loop.  Every datagram becomes one
    /// [`GatewayInput::Datagram`]; the loop ends when the gateway is gone.
    pub fn spawn_reader(&self, inputs: UnboundedSender<GatewayInput>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let peer = self.peer;
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUF_SIZE];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        trace!(len = n, "datagram bytes: {:02X?}", &buf[..n]);
                        if inputs.send(GatewayInput::Datagram(buf[..n].to_vec())).is_err() {
                            debug!("gateway gone; stopping Z21 reader");
                            break;
                        }
                    }
                    // ICMP port-unreachable surfaces here while the station
                    // is powered off.  Keep listening.
                    Err(e) => debug!(%peer, "UDP receive error: {e}"),
                }
            }
        })
    }
}

/// [`WireSink`] over the connected UDP socket.
#[derive(Clone)]
pub struct UdpWire {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl WireSink for UdpWire {
    fn send(&mut self, frame: &[u8]) {
        match self.socket.try_send(frame) {
            Ok(n) if n == frame.len() => {}
            Ok(n) => warn!(peer = %self.peer, sent = n, len = frame.len(), "short UDP send"),
            Err(e) => warn!(peer = %self.peer, "UDP send failed: {e}"),
        }
    }
}
