//! Task endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::{AppState, AuthUser};
use crate::db::{NewTodo, TodoItem};
use crate::error::ServiceResult;

/// Request body for POST /api/todos
#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

pub async fn list_todos_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ServiceResult<Json<Vec<TodoItem>>> {
    Ok(Json(state.service.list_todos(owner).await?))
}

pub async fn create_todo_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateTodoRequest>,
) -> ServiceResult<(StatusCode, Json<TodoItem>)> {
    let item = state
        .service
        .add_todo(NewTodo {
            user_id: owner,
            title: request.title.trim().to_string(),
            description: request.description,
            due_date: request.due_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn delete_todo_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<i64>,
) -> ServiceResult<StatusCode> {
    state.service.delete_todo(owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use tokio_test::assert_ok;

    use super::*;
    use crate::api::test_support::state;

    #[tokio::test]
    async fn test_todos_are_scoped_to_owner() {
        let state = state();
        let request = CreateTodoRequest {
            title: "  Renew passport ".to_string(),
            description: String::new(),
            due_date: NaiveDate::from_ymd_opt(2025, 9, 1),
        };
        let (status, Json(item)) =
            assert_ok!(create_todo_handler(State(state.clone()), AuthUser(1), Json(request)).await);
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item.title, "Renew passport");

        let Json(other) = assert_ok!(list_todos_handler(State(state.clone()), AuthUser(2)).await);
        assert!(other.is_empty());

        // Another user's id looks like a missing row
        let err = delete_todo_handler(State(state.clone()), AuthUser(2), Path(item.id))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let status = assert_ok!(delete_todo_handler(State(state), AuthUser(1), Path(item.id)).await);
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_blank_title_is_bad_request() {
        let request = CreateTodoRequest {
            title: "   ".to_string(),
            description: String::new(),
            due_date: None,
        };
        let err = create_todo_handler(State(state()), AuthUser(1), Json(request))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
