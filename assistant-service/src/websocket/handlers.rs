//! Live channel connection handling.

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use tracing::info;

use super::EventHub;
use crate::db::UserId;

/// Serve an upgraded socket for an authenticated user
///
/// Returns once the client disconnects, is dropped for falling behind, or
/// the hub shuts down.
pub async fn handle_ws_connection(socket: WebSocket, hub: EventHub, owner: UserId) {
    let (writer, reader) = socket.split();
    let client = hub.register(owner, writer, reader);
    let connection_id = client.connection_id;

    info!(user_id = owner, connection_id = %connection_id, "Live client connected");
    metrics::counter!("hub_connections_total").increment(1);

    client.closed().await;
    info!(user_id = owner, connection_id = %connection_id, "Live client disconnected");
}
