//! The broadcast hub: a single control loop that owns connection
//! membership and fans every forwarded message out to all current members.
//!
//! All membership mutation happens inside [`HubLoop::run`]; the rest of the
//! crate only holds a cloneable [`Hub`] handle and talks to the loop over
//! channels. Join/leave travel on an unbounded control channel so they can
//! never be dropped or starved behind a backlog of chat messages; forwarded
//! messages travel on a bounded channel drained with lower priority.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use ulid::Ulid;

use crate::protocol::Message;

/// Identifies one websocket connection for the lifetime of its pumps.
pub type ConnId = Ulid;

/// How many forwarded messages may queue inside the hub before senders
/// are made to wait. The hub drains this continuously, so the wait is
/// transient; it exists to bound memory, not to pace senders.
const FORWARD_BUFFER: usize = 64;

enum Control {
    Join {
        id: ConnId,
        outbound: mpsc::Sender<Message>,
    },
    Leave {
        id: ConnId,
    },
}

/// Handle through which connections register themselves and submit
/// messages for broadcast. Cheap to clone; the loop stops once every
/// handle has been dropped.
#[derive(Clone)]
pub struct Hub {
    control: mpsc::UnboundedSender<Control>,
    forward: mpsc::Sender<Message>,
}

impl Hub {
    /// Create a hub handle and the loop that serves it. The caller must
    /// run the loop on its own task, exactly once.
    pub fn new() -> (Self, HubLoop) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (forward_tx, forward_rx) = mpsc::channel(FORWARD_BUFFER);
        (
            Self {
                control: control_tx,
                forward: forward_tx,
            },
            HubLoop {
                control: control_rx,
                forward: forward_rx,
                members: HashMap::new(),
            },
        )
    }

    /// Create a hub and spawn its loop on the current tokio runtime.
    pub fn spawn() -> Self {
        let (hub, hub_loop) = Self::new();
        tokio::spawn(hub_loop.run());
        hub
    }

    /// Register a connection's outbound buffer with the hub. The caller
    /// must join before starting either pump, and joins each id once.
    pub fn join(&self, id: ConnId, outbound: mpsc::Sender<Message>) {
        // Fails only if the loop is gone, in which case there is nobody
        // left to deliver to anyway.
        let _ = self.control.send(Control::Join { id, outbound });
    }

    /// Remove a connection from membership and close its outbound buffer.
    /// A no-op for ids that never joined or already left.
    pub fn leave(&self, id: ConnId) {
        let _ = self.control.send(Control::Leave { id });
    }

    /// Submit a message for fan-out to every current member. Waits only
    /// for space in the hub's internal queue, never for any recipient.
    pub async fn forward(&self, msg: Message) {
        let _ = self.forward.send(msg).await;
    }
}

/// The hub's control loop state. Membership lives here and nowhere else.
pub struct HubLoop {
    control: mpsc::UnboundedReceiver<Control>,
    forward: mpsc::Receiver<Message>,
    members: HashMap<ConnId, mpsc::Sender<Message>>,
}

impl HubLoop {
    /// Process join/leave/forward events until every [`Hub`] handle has
    /// been dropped. Membership events are drained with priority on each
    /// iteration so a flood of messages cannot delay a departure.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(ctrl) = self.control.recv() => self.handle_control(ctrl),
                Some(msg) = self.forward.recv() => self.fan_out(msg),
                else => break,
            }
        }
        tracing::debug!("hub loop stopped, all handles dropped");
    }

    fn handle_control(&mut self, ctrl: Control) {
        match ctrl {
            Control::Join { id, outbound } => {
                self.members.insert(id, outbound);
                tracing::info!(conn = %id, members = self.members.len(), "connection joined");
            }
            Control::Leave { id } => {
                // Dropping the sender is the one and only close of this
                // connection's outbound buffer; its pump drains and exits.
                if self.members.remove(&id).is_some() {
                    tracing::info!(conn = %id, members = self.members.len(), "connection left");
                }
            }
        }
    }

    fn fan_out(&mut self, msg: Message) {
        for (id, outbound) in &self.members {
            match outbound.try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Best-effort delivery: a slow consumer loses this
                    // message rather than stalling everyone else.
                    tracing::debug!(conn = %id, "outbound buffer full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    // The pump already exited; the leave is in flight.
                    tracing::debug!(conn = %id, "outbound buffer closed, dropping message");
                }
            }
        }
    }
}
