//! Domain services shared by the chat bot, the REST API, and the scheduler.
//!
//! Every storage call runs on the blocking pool under the configured
//! operation timeout, and every successful write publishes an [`Event`]
//! to the owner's live client.

mod credits;
mod finance;
mod recurring;
mod todos;
mod users;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, warn};

use crate::db::{Database, UserId};
use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::websocket::{Event, EventHub, EventKind};

/// Main service coordinator
pub struct AssistantService {
    db: Arc<Database>,
    hub: EventHub,
    operation_timeout: Duration,
}

impl AssistantService {
    pub fn new(db: Arc<Database>, hub: EventHub, operation_timeout: Duration) -> Self {
        Self {
            db,
            hub,
            operation_timeout,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Run a storage operation off the async threads, bounded by the
    /// operation timeout
    async fn storage<T, F>(&self, operation: &'static str, f: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> ServiceResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));

        match tokio::time::timeout(self.operation_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(operation, error = %e, "Storage task failed");
                Err(ServiceError::Internal {
                    message: format!("storage task {} failed", operation),
                })
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Storage operation timed out"
                );
                Err(DatabaseError::Timeout { operation }.into())
            }
        }
    }

    fn notify(&self, kind: EventKind, owner: UserId, data: impl Serialize) {
        self.hub.publish(Event::new(kind, owner, data));
    }
}
