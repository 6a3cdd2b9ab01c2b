//! Live event hub
//!
//! Routes each [`Event`] to the one live connection registered for its
//! user. A single control task owns the registry and applies register,
//! unregister, and publish commands strictly in arrival order. Every
//! connection gets a bounded outbound queue drained by its own write pump,
//! plus a read pump that watches for disconnection.
//!
//! Publishing never blocks: when a client's queue is full the client is
//! dropped instead of applying backpressure to the publisher.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::UserId;

pub mod handlers;
pub mod messages;

pub use messages::{Event, EventKind};

/// Upper bound on the close handshake with a stalled peer
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests handled by the control task
enum HubCommand {
    Register {
        owner: UserId,
        connection_id: Uuid,
        queue: mpsc::Sender<Event>,
        cancel: CancellationToken,
    },
    Unregister {
        owner: UserId,
        connection_id: Uuid,
    },
    Publish(Event),
    ClientCount(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

/// Registry entry for a connected client
struct ClientSlot {
    connection_id: Uuid,
    queue: mpsc::Sender<Event>,
    /// Stops both pumps of this connection
    cancel: CancellationToken,
}

impl ClientSlot {
    fn disconnect(self) {
        self.cancel.cancel();
    }
}

/// Handle to the hub's control task
///
/// Cheap to clone; all clones talk to the same registry.
#[derive(Clone)]
pub struct EventHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    cancel: CancellationToken,
    queue_capacity: usize,
    shut_down: Arc<AtomicBool>,
}

/// A registered connection and its two pumps
pub struct LiveClient {
    pub owner: UserId,
    pub connection_id: Uuid,
    write_pump: JoinHandle<()>,
    read_pump: JoinHandle<()>,
}

impl LiveClient {
    /// Wait until both pumps have stopped
    pub async fn closed(self) {
        let _ = self.read_pump.await;
        let _ = self.write_pump.await;
        debug!(
            user_id = self.owner,
            connection_id = %self.connection_id,
            "Live client pumps finished"
        );
    }
}

impl EventHub {
    /// Start the control task. Must be called inside a Tokio runtime.
    pub fn new(queue_capacity: usize) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_registry(receiver));

        Self {
            commands,
            cancel: CancellationToken::new(),
            queue_capacity: queue_capacity.max(1),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Track a new connection for `owner` and start its pumps.
    ///
    /// A second registration for the same user replaces the first entry
    /// and disconnects the older connection.
    pub fn register<W, R, E>(&self, owner: UserId, writer: W, reader: R) -> LiveClient
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let connection_id = Uuid::new_v4();
        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        let cancel = self.cancel.child_token();

        let registered = self
            .commands
            .send(HubCommand::Register {
                owner,
                connection_id,
                queue: queue_tx,
                cancel: cancel.clone(),
            })
            .is_ok();
        if !registered {
            debug!(user_id = owner, "Hub stopped; connection will close immediately");
            cancel.cancel();
        }

        let write_pump = tokio::spawn(write_pump(
            self.clone(),
            owner,
            connection_id,
            cancel.clone(),
            queue_rx,
            writer,
        ));
        let read_pump = tokio::spawn(read_pump(
            self.clone(),
            owner,
            connection_id,
            cancel,
            reader,
        ));

        info!(user_id = owner, connection_id = %connection_id, "Live client registered");

        LiveClient {
            owner,
            connection_id,
            write_pump,
            read_pump,
        }
    }

    /// Forget a connection. Ignored if `connection_id` no longer owns the slot.
    pub fn unregister(&self, owner: UserId, connection_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister {
            owner,
            connection_id,
        });
    }

    /// Queue an event for its user's live client, if any
    pub fn publish(&self, event: Event) {
        if self.commands.send(HubCommand::Publish(event)).is_err() {
            debug!("Hub stopped; event discarded");
        }
    }

    /// Number of registered clients
    pub async fn client_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(HubCommand::ClientCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Close every connection and stop the control task. Only the first
    /// call does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = oneshot::channel();
        if self.commands.send(HubCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        self.cancel.cancel();
        info!("Event hub shut down");
    }
}

/// Control loop owning the registry
async fn run_registry(mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    let mut clients: HashMap<UserId, ClientSlot> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register {
                owner,
                connection_id,
                queue,
                cancel,
            } => {
                if let Some(previous) = clients.insert(
                    owner,
                    ClientSlot {
                        connection_id,
                        queue,
                        cancel,
                    },
                ) {
                    debug!(
                        user_id = owner,
                        replaced = %previous.connection_id,
                        "Replaced existing live client"
                    );
                    previous.disconnect();
                }
                metrics::gauge!("hub_connected_clients").set(clients.len() as f64);
            }
            HubCommand::Unregister {
                owner,
                connection_id,
            } => {
                let owns_slot = clients
                    .get(&owner)
                    .is_some_and(|slot| slot.connection_id == connection_id);
                let removed = if owns_slot { clients.remove(&owner) } else { None };
                if let Some(slot) = removed {
                    slot.disconnect();
                    info!(user_id = owner, connection_id = %connection_id, "Live client unregistered");
                    metrics::gauge!("hub_connected_clients").set(clients.len() as f64);
                }
            }
            HubCommand::Publish(event) => deliver(&mut clients, event),
            HubCommand::ClientCount(reply) => {
                let _ = reply.send(clients.len());
            }
            HubCommand::Shutdown(reply) => {
                let count = clients.len();
                // Dropping the senders closes every queue
                clients.clear();
                metrics::gauge!("hub_connected_clients").set(0.0);
                debug!(count, "Closed all live client queues");
                let _ = reply.send(());
                break;
            }
        }
    }
}

fn deliver(clients: &mut HashMap<UserId, ClientSlot>, event: Event) {
    let owner = event.user_id;
    let Some(slot) = clients.get(&owner) else {
        metrics::counter!("hub_events_dropped_total", "reason" => "no_client").increment(1);
        return;
    };

    match slot.queue.try_send(event) {
        Ok(()) => {
            metrics::counter!("hub_events_queued_total").increment(1);
        }
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(
                user_id = owner,
                connection_id = %slot.connection_id,
                kind = ?event.kind,
                "Live client queue full, disconnecting"
            );
            if let Some(slot) = clients.remove(&owner) {
                slot.disconnect();
            }
            metrics::counter!("hub_events_dropped_total", "reason" => "queue_full").increment(1);
            metrics::counter!("hub_clients_evicted_total").increment(1);
            metrics::gauge!("hub_connected_clients").set(clients.len() as f64);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            // Write pump already gone; its unregister is on the way
            if let Some(slot) = clients.remove(&owner) {
                slot.disconnect();
            }
            metrics::counter!("hub_events_dropped_total", "reason" => "closed").increment(1);
            metrics::gauge!("hub_connected_clients").set(clients.len() as f64);
        }
    }
}

/// Drain the client's queue into the transport as JSON text frames
async fn write_pump<W>(
    hub: EventHub,
    owner: UserId,
    connection_id: Uuid,
    cancel: CancellationToken,
    mut queue: mpsc::Receiver<Event>,
    mut writer: W,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(user_id = owner, error = %e, "Failed to serialize event");
                continue;
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = writer.send(Message::Text(json.into())) => sent,
        };
        if let Err(e) = sent {
            debug!(user_id = owner, error = %e, "Live client write failed");
            break;
        }
    }

    hub.unregister(owner, connection_id);
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(user_id = owner, error = %e, "Error closing live client transport"),
        Err(_) => debug!(user_id = owner, "Live client transport did not close in time"),
    }
}

/// Watch the transport for close or error; inbound frames are ignored
async fn read_pump<R, E>(
    hub: EventHub,
    owner: UserId,
    connection_id: Uuid,
    cancel: CancellationToken,
    mut reader: R,
) where
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(Message::Close(_))) | None => {
                debug!(user_id = owner, "Live client closed connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(user_id = owner, error = %e, "Live client read failed");
                break;
            }
        }
    }

    hub.unregister(owner, connection_id);
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::channel::mpsc as fmpsc;
    use serde_json::json;

    use super::*;

    type Inbound = fmpsc::UnboundedSender<Result<Message, Infallible>>;

    /// In-process transport: returns the hub-facing halves and the test-facing ends
    fn transport(
        buffer: usize,
    ) -> (
        fmpsc::Sender<Message>,
        fmpsc::UnboundedReceiver<Result<Message, Infallible>>,
        fmpsc::Receiver<Message>,
        Inbound,
    ) {
        let (out_tx, out_rx) = fmpsc::channel(buffer);
        let (in_tx, in_rx) = fmpsc::unbounded();
        (out_tx, in_rx, out_rx, in_tx)
    }

    fn event(user_id: UserId, seq: u64) -> Event {
        Event {
            kind: EventKind::TodoAdded,
            user_id,
            data: json!({ "seq": seq }),
            timestamp: 0,
        }
    }

    fn seq_of(message: Message) -> u64 {
        let Message::Text(text) = message else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        value["data"]["seq"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_publish_without_client_is_noop() {
        let hub = EventHub::new(4);
        hub.publish(event(1, 0));
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = EventHub::new(64);
        let (writer, reader, mut delivered, _inbound) = transport(64);
        let _client = hub.register(1, writer, reader);

        for seq in 0..20 {
            hub.publish(event(1, seq));
        }
        // Another user's events never reach this client
        hub.publish(event(2, 99));

        let mut seen = Vec::new();
        for _ in 0..20 {
            let message = tokio::time::timeout(Duration::from_secs(2), delivered.next())
                .await
                .unwrap()
                .unwrap();
            seen.push(seq_of(message));
        }
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_full_queue_disconnects_client() {
        let capacity = 4;
        let hub = EventHub::new(capacity);
        // Zero-buffer transport that nobody reads: the write pump stalls
        let (writer, reader, mut delivered, _inbound) = transport(0);
        let _client = hub.register(1, writer, reader);

        for seq in 0..(capacity as u64 + 10) {
            hub.publish(event(1, seq));
        }
        assert_eq!(hub.client_count().await, 0);

        let mut seen = Vec::new();
        while let Ok(Some(message)) = delivered.try_next() {
            seen.push(seq_of(message));
        }
        let expected: Vec<u64> = (0..seen.len() as u64).collect();
        assert_eq!(seen, expected);
        assert!(seen.len() <= capacity + 2);
    }

    #[tokio::test]
    async fn test_evicted_client_pumps_stop() {
        let hub = EventHub::new(2);
        let (writer, reader, _delivered, _inbound) = transport(0);
        let client = hub.register(1, writer, reader);

        for seq in 0..10 {
            hub.publish(event(1, seq));
        }
        assert_eq!(hub.client_count().await, 0);

        // Both pumps end while the transport is still stalled and open
        tokio::time::timeout(Duration::from_secs(2), client.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replaced_client_pumps_stop() {
        let hub = EventHub::new(8);
        let (writer_a, reader_a, _delivered_a, _inbound_a) = transport(8);
        let (writer_b, reader_b, _delivered_b, _inbound_b) = transport(8);

        let first = hub.register(4, writer_a, reader_a);
        let _second = hub.register(4, writer_b, reader_b);

        tokio::time::timeout(Duration::from_secs(2), first.closed())
            .await
            .unwrap();
        assert_eq!(hub.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_frame_unregisters() {
        let hub = EventHub::new(8);
        let (writer, reader, _delivered, inbound) = transport(8);
        let client = hub.register(5, writer, reader);
        assert_eq!(hub.client_count().await, 1);

        inbound.unbounded_send(Ok(Message::Close(None))).unwrap();
        tokio::time::timeout(Duration::from_secs(2), client.closed())
            .await
            .unwrap();
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_connection() {
        let hub = EventHub::new(8);
        let (writer_a, reader_a, _delivered_a, _inbound_a) = transport(8);
        let (writer_b, reader_b, mut delivered_b, _inbound_b) = transport(8);

        let first = hub.register(9, writer_a, reader_a);
        let _second = hub.register(9, writer_b, reader_b);
        hub.unregister(9, first.connection_id);
        assert_eq!(hub.client_count().await, 1);

        hub.publish(event(9, 7));
        let message = tokio::time::timeout(Duration::from_secs(2), delivered_b.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seq_of(message), 7);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transports_once() {
        let hub = EventHub::new(8);
        let (writer, reader, mut delivered, _inbound) = transport(8);
        let client = hub.register(3, writer, reader);

        hub.shutdown().await;
        hub.shutdown().await;

        tokio::time::timeout(Duration::from_secs(2), client.closed())
            .await
            .unwrap();
        // Closed sink ends the stream
        assert!(delivered.next().await.is_none());
        assert_eq!(hub.client_count().await, 0);
    }
}
