use tracing::debug;

use super::AssistantService;
use crate::db::UserId;
use crate::error::ServiceResult;

impl AssistantService {
    /// Record the latest chat message from a user, creating the user if new
    pub async fn register_chat_user(
        &self,
        user_id: UserId,
        chat_id: i64,
        last_message: &str,
    ) -> ServiceResult<()> {
        let last_message = last_message.to_string();
        self.storage("register_user", move |db| {
            db.register_user(user_id, chat_id, &last_message)
        })
        .await?;
        debug!(user_id, chat_id, "User registered");
        Ok(())
    }

    /// Make sure a user row exists without touching chat details
    pub async fn ensure_user(&self, user_id: UserId) -> ServiceResult<()> {
        self.storage("ensure_user", move |db| db.ensure_user(user_id))
            .await
    }

    pub async fn user_exists(&self, user_id: UserId) -> ServiceResult<bool> {
        self.storage("user_exists", move |db| db.user_exists(user_id))
            .await
    }
}
