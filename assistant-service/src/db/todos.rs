//! To-do CRUD operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{NewTodo, TodoItem, TodoStatus, UserId, format_date};
use crate::error::{DatabaseError, ServiceResult};

const TODO_COLUMNS: &str = "id, user_id, title, description, due_date, status, created_at";

impl Database {
    /// Create a to-do item and return the stored record
    pub fn create_todo(&self, todo: &NewTodo) -> ServiceResult<TodoItem> {
        let conn = self.conn()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO todos (user_id, title, description, due_date, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                todo.user_id,
                todo.title,
                todo.description,
                todo.due_date.map(format_date),
                TodoStatus::Pending.as_str(),
                created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(TodoItem {
            id: conn.last_insert_rowid(),
            user_id: todo.user_id,
            title: todo.title.clone(),
            description: todo.description.clone(),
            due_date: todo.due_date,
            status: TodoStatus::Pending,
            created_at,
        })
    }

    /// List a user's to-do items, oldest first
    pub fn list_todos(&self, user_id: UserId) -> ServiceResult<Vec<TodoItem>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM todos WHERE user_id = ?1 ORDER BY id",
                TODO_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id], TodoItem::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Get a to-do item if it belongs to the user
    pub fn get_todo(&self, id: i64, user_id: UserId) -> ServiceResult<Option<TodoItem>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM todos WHERE id = ?1 AND user_id = ?2",
                TODO_COLUMNS
            ),
            params![id, user_id],
            TodoItem::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Delete a to-do item owned by the user. Returns whether a row was removed.
    pub fn delete_todo(&self, id: i64, user_id: UserId) -> ServiceResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_todo(user_id: UserId, title: &str) -> NewTodo {
        NewTodo {
            user_id,
            title: title.to_string(),
            description: String::new(),
            due_date: None,
        }
    }

    #[test]
    fn test_todo_crud_is_owner_scoped() {
        let db = Database::open_in_memory().unwrap();

        let milk = db.create_todo(&new_todo(1, "Buy milk")).unwrap();
        db.create_todo(&new_todo(2, "Someone else's")).unwrap();

        let mine = db.list_todos(1).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Buy milk");
        assert_eq!(mine[0].status, TodoStatus::Pending);

        assert!(db.get_todo(milk.id, 2).unwrap().is_none());
        assert!(!db.delete_todo(milk.id, 2).unwrap());

        assert!(db.delete_todo(milk.id, 1).unwrap());
        assert!(db.list_todos(1).unwrap().is_empty());
    }
}
