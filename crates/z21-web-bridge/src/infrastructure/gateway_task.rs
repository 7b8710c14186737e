//! The one task that runs every gateway handler.
//!
//! All inputs (datagrams, WebSocket sessions coming and going, browser
//! messages, fired timers) funnel into a single unbounded channel.  The task
//! drains it one input at a time, so [`Gateway`] never sees two handlers at
//! once and needs no locking.
//!
//! ```text
//!  Z21Link reader ──┐
//!  ws sessions ─────┼──► mpsc ──► run_gateway ──► Gateway::on_*
//!  TokioScheduler ──┘
//! ```

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::application::bridge_service::cv_outcome_msg;
use crate::application::ports::{ClientSink, Ports, TimerId, TimerKey, WireSink};
use crate::application::Gateway;
use crate::domain::{ClientId, ClientMsg, ServerMsg};
use crate::infrastructure::scheduler::TokioScheduler;

/// Everything the gateway task reacts to.
#[derive(Debug)]
pub enum GatewayInput {
    Datagram(Vec<u8>),
    Connected { client: ClientId, outbox: UnboundedSender<ServerMsg> },
    Disconnected(ClientId),
    Message { client: ClientId, msg: ClientMsg },
    Timer { id: TimerId, key: TimerKey },
    Shutdown,
}

/// Cheap, cloneable sender side of the gateway channel.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    inputs: UnboundedSender<GatewayInput>,
}

impl GatewayHandle {
    /// Queues an input.  Returns `false` once the gateway task has stopped.
    pub fn send(&self, input: GatewayInput) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn sender(&self) -> UnboundedSender<GatewayInput> {
        self.inputs.clone()
    }
}

/// Creates the gateway channel.
pub fn channel() -> (GatewayHandle, UnboundedReceiver<GatewayInput>) {
    let (inputs, rx) = mpsc::unbounded_channel();
    (GatewayHandle { inputs }, rx)
}

/// Per-client outboxes.  A client whose outbox is closed is dropped on the
/// next send; its session task will report the disconnect.
#[derive(Default)]
struct ClientRegistry {
    outboxes: HashMap<ClientId, UnboundedSender<ServerMsg>>,
}

impl ClientSink for ClientRegistry {
    fn broadcast(&mut self, msg: &ServerMsg) {
        self.outboxes.retain(|_, outbox| outbox.send(msg.clone()).is_ok());
    }

    fn send_to(&mut self, client: ClientId, msg: &ServerMsg) {
        if let Some(outbox) = self.outboxes.get(&client) {
            if outbox.send(msg.clone()).is_err() {
                self.outboxes.remove(&client);
            }
        }
    }
}

/// Runs `gateway` until [`GatewayInput::Shutdown`] arrives.  Returns the
/// gateway so callers can inspect its final state.
pub async fn run_gateway<W: WireSink>(
    mut gateway: Gateway,
    mut wire: W,
    handle: GatewayHandle,
    mut inputs: UnboundedReceiver<GatewayInput>,
) -> Gateway {
    let mut timers = TokioScheduler::new(handle.sender());
    let mut clients = ClientRegistry::default();

    while let Some(input) = inputs.recv().await {
        match &input {
            GatewayInput::Connected { client, outbox } => {
                clients.outboxes.insert(*client, outbox.clone());
            }
            GatewayInput::Disconnected(client) => {
                clients.outboxes.remove(client);
            }
            GatewayInput::Timer { id, .. } => timers.fired(*id),
            _ => {}
        }

        let mut ports = Ports::new(&mut wire, &mut timers, &mut clients);
        match input {
            GatewayInput::Datagram(bytes) => gateway.on_datagram(&bytes, &mut ports),
            GatewayInput::Connected { client, .. } => gateway.on_client_connected(client, &mut ports),
            GatewayInput::Disconnected(client) => gateway.on_client_disconnected(client, &mut ports),
            GatewayInput::Message { client, msg } => {
                if let Some(reply) = gateway.on_client_message(client, msg, &mut ports) {
                    if let Some(outbox) = clients.outboxes.get(&client).cloned() {
                        tokio::spawn(async move {
                            let outcome = reply.await;
                            // The client may have left while the CV operation ran.
                            let _ = outbox.send(cv_outcome_msg(&outcome));
                        });
                    }
                }
            }
            GatewayInput::Timer { id, key } => gateway.on_timer(id, key, &mut ports),
            GatewayInput::Shutdown => {
                info!("gateway shutting down");
                gateway.shutdown(&mut ports);
                break;
            }
        }
    }

    timers.cancel_all();
    debug!("gateway task stopped");
    gateway
}
