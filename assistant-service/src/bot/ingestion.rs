//! Update ingestion loop.
//!
//! Every inbound message is handled on its own task, so a slow or
//! panicking handler for one user never holds up anyone else. When the
//! update channel closes the transport has hit a conflict: the loop asks
//! the source to resolve it, waits out the grace period, and reopens.
//! Messages sent during that gap are lost.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{InboundMessage, UpdateHandler, UpdateSource};
use crate::error::format_error_chain;

/// Drive `source` until `shutdown` fires. Handlers already running are
/// allowed to finish before this returns.
pub async fn run_updates<U, H>(
    mut source: U,
    handler: Arc<H>,
    shutdown: CancellationToken,
    grace: Duration,
) where
    U: UpdateSource,
    H: UpdateHandler,
{
    let mut tasks = JoinSet::new();

    'session: loop {
        let mut inbound = source.open();
        info!("Chat update channel open");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'session,
                Some(outcome) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_outcome(outcome);
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        tasks.spawn(dispatch(handler.clone(), message));
                    }
                    None => break,
                },
            }
        }

        warn!(
            grace_secs = grace.as_secs_f64(),
            "Chat update channel closed, resolving transport conflict"
        );
        metrics::counter!("bot_transport_conflicts_total").increment(1);
        source.resolve_conflict().await;

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(grace) => {}
        }
    }

    if !tasks.is_empty() {
        debug!(in_flight = tasks.len(), "Waiting for chat handlers to finish");
    }
    while let Some(outcome) = tasks.join_next().await {
        log_task_outcome(outcome);
    }
    info!("Chat update ingestion stopped");
}

async fn dispatch<H: UpdateHandler>(handler: Arc<H>, message: InboundMessage) {
    let user_id = message.sender_id;
    metrics::counter!("bot_updates_total").increment(1);

    if let Err(e) = handler.handle(message).await {
        error!(user_id, error = %format_error_chain(&e), "Failed to handle chat update");
        metrics::counter!("bot_update_failures_total", "reason" => "error").increment(1);
    }
}

fn log_task_outcome(outcome: Result<(), JoinError>) {
    let Err(e) = outcome else { return };

    if e.is_panic() {
        let reason = panic_message(e.into_panic());
        error!(panic = %reason, "Chat update handler panicked");
        metrics::counter!("bot_update_failures_total", "reason" => "panic").increment(1);
    } else {
        debug!(error = %e, "Chat update handler cancelled");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}
