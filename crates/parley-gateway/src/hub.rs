use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::ConnectionId;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::router::{EventRouter, Outbound};

/// Capacity of the shared inbound command queue. Readers wait when it is
/// full; the hub itself never waits on anyone.
const COMMAND_CAPACITY: usize = 1024;

/// An encoded outbound event, shared across every recipient of a fan-out.
pub type Frame = Utf8Bytes;

enum HubCommand {
    Connect {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<Frame>,
    },
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
}

/// Handle to the task that owns all chat state. Cloneable; the task exits
/// once every handle is dropped.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    commands: mpsc::Sender<HubCommand>,
    config: GatewayConfig,
}

impl Hub {
    /// Start the hub task on the current runtime.
    pub fn spawn(config: GatewayConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = HubActor {
            router: EventRouter::new(config.clone()),
            connections: HashMap::new(),
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            inner: Arc::new(HubInner { commands, config }),
        }
    }

    /// Limits the hub was started with. Sockets size their read limits and
    /// heartbeat from this.
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Register a connection and get the queue its frames will arrive on.
    /// The queue closes when the hub drops the connection.
    pub async fn connect(&self, connection_id: ConnectionId) -> Result<mpsc::Receiver<Frame>> {
        let (outbound, outbound_rx) = mpsc::channel(self.inner.config.outbound_buffer.max(1));
        self.send(HubCommand::Connect {
            connection_id,
            outbound,
        })
        .await?;
        Ok(outbound_rx)
    }

    /// Queue a client event. Events from one connection are handled in the
    /// order they were dispatched.
    pub async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> Result<()> {
        self.send(HubCommand::Event {
            connection_id,
            event,
        })
        .await
    }

    /// Queue a disconnect. Runs after anything this connection already queued.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if self
            .send(HubCommand::Disconnect { connection_id })
            .await
            .is_err()
        {
            debug!("hub gone before {} disconnected", connection_id);
        }
    }

    async fn send(&self, command: HubCommand) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| GatewayError::HubClosed)
    }
}

struct HubActor {
    router: EventRouter,
    /// Outbound queues of every open connection, joined or not
    connections: HashMap<ConnectionId, mpsc::Sender<Frame>>,
}

impl HubActor {
    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        info!("hub started");

        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Connect {
                    connection_id,
                    outbound,
                } => self.connect(connection_id, outbound),

                HubCommand::Event {
                    connection_id,
                    event,
                } => {
                    trace!("{} -> {}", connection_id, event.name());
                    match self.router.handle(connection_id, event) {
                        Ok(outbound) => self.deliver(outbound),
                        Err(e) => {
                            error!("dropping connection {}: {}", connection_id, e);
                            self.force_disconnect(connection_id);
                        }
                    }
                }

                HubCommand::Disconnect { connection_id } => {
                    self.connections.remove(&connection_id);
                    let outbound = self.router.disconnect(connection_id);
                    self.deliver(outbound);
                }
            }
        }

        info!("hub stopped");
    }

    fn connect(&mut self, connection_id: ConnectionId, outbound: mpsc::Sender<Frame>) {
        if let Err(e) = self.router.connect(connection_id) {
            // The new queue is dropped unused, which closes that socket too.
            error!("{}", e);
            self.force_disconnect(connection_id);
            return;
        }

        self.connections.insert(connection_id, outbound);
        debug!("{} connected, {} open", connection_id, self.connections.len());
    }

    /// Close a connection from our side. Dropping its queue ends its socket.
    fn force_disconnect(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
        let outbound = self.router.disconnect(connection_id);
        self.deliver(outbound);
    }

    /// Fan events out to their audiences without ever waiting on a recipient.
    /// A recipient whose queue is full is evicted, and its departure is
    /// delivered in turn.
    fn deliver(&mut self, outbound: Vec<Outbound>) {
        let mut pending: VecDeque<Outbound> = outbound.into();

        while let Some(Outbound { audience, event }) = pending.pop_front() {
            let frame = match encode(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("{}", e);
                    continue;
                }
            };

            let mut lagging = Vec::new();
            for (&connection_id, queue) in &self.connections {
                if !audience.includes(connection_id) {
                    continue;
                }
                match queue.try_send(frame.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => lagging.push(connection_id),
                    Err(TrySendError::Closed(_)) => {
                        trace!("{} already closed, skipping {}", connection_id, event.name());
                    }
                }
            }

            for connection_id in lagging {
                warn!("{} is not keeping up, dropping connection", connection_id);
                self.connections.remove(&connection_id);
                pending.extend(self.router.disconnect(connection_id));
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Result<Frame> {
    Ok(Frame::from(serde_json::to_string(event)?))
}
