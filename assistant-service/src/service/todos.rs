use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use super::AssistantService;
use crate::db::{NewTodo, TodoItem, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::websocket::EventKind;

impl AssistantService {
    pub async fn add_todo(&self, todo: NewTodo) -> ServiceResult<TodoItem> {
        if todo.title.trim().is_empty() {
            return Err(ServiceError::invalid("Task title must not be empty"));
        }

        let item = self.storage("create_todo", move |db| db.create_todo(&todo)).await?;
        info!(user_id = item.user_id, todo_id = item.id, "Task added");

        self.notify(EventKind::TodoAdded, item.user_id, &item);
        Ok(item)
    }

    pub async fn list_todos(&self, owner: UserId) -> ServiceResult<Vec<TodoItem>> {
        self.storage("list_todos", move |db| db.list_todos(owner)).await
    }

    pub async fn delete_todo(&self, owner: UserId, id: i64) -> ServiceResult<()> {
        let not_found = || ServiceError::NotFound { entity: "Task", id };
        let item = self
            .storage("get_todo", move |db| db.get_todo(id, owner))
            .await?
            .ok_or_else(not_found)?;
        let deleted = self
            .storage("delete_todo", move |db| db.delete_todo(id, owner))
            .await?;
        if !deleted {
            return Err(not_found());
        }

        self.notify(
            EventKind::TodoDeleted,
            owner,
            json!({ "id": id, "title": item.title }),
        );
        Ok(())
    }

    /// Create a dated reminder task
    pub async fn add_reminder(
        &self,
        owner: UserId,
        title: String,
        description: String,
        due_date: NaiveDate,
    ) -> ServiceResult<TodoItem> {
        self.add_todo(NewTodo {
            user_id: owner,
            title,
            description,
            due_date: Some(due_date),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::NewTodo;
    use crate::error::ServiceError;
    use crate::service::test_support::service;

    #[tokio::test]
    async fn test_todo_lifecycle() {
        let service = service();
        let item = service
            .add_todo(NewTodo {
                user_id: 1,
                title: "Water plants".to_string(),
                description: String::new(),
                due_date: None,
            })
            .await
            .unwrap();

        assert_eq!(service.list_todos(1).await.unwrap().len(), 1);
        service.delete_todo(1, item.id).await.unwrap();

        let err = service.delete_todo(1, item.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Task", .. }));
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let service = service();
        let err = service
            .add_todo(NewTodo {
                user_id: 1,
                title: "  ".to_string(),
                description: String::new(),
                due_date: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }
}
