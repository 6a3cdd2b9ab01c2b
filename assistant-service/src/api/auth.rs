//! Login with Telegram Web App init data.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{AppState, AuthUser};
use crate::auth::verify_init_data;
use crate::db::UserId;
use crate::error::{ServiceError, ServiceResult, format_error_chain};

/// Request body for POST /api/auth
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "initData", alias = "init_data")]
    pub init_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: UserId,
    pub registered: bool,
}

/// POST /api/auth - exchange signed init data for an access token
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ServiceResult<Json<LoginResponse>> {
    let bot_token = state
        .bot_token
        .as_deref()
        .ok_or_else(|| ServiceError::Unauthorized {
            message: "Init data login is not configured".to_string(),
        })?;

    let user = verify_init_data(&request.init_data, bot_token, state.init_data_max_age)
        .inspect_err(|e| warn!(error = %format_error_chain(e), "Init data rejected"))?;

    // A token is still useful if registration hiccups
    if let Err(e) = state.service.ensure_user(user.id).await {
        warn!(user_id = user.id, error = %format_error_chain(&e), "Failed to register user");
    }

    let token = state.tokens.mint(user.id)?;
    info!(user_id = user.id, "Issued access token");

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        expires_in: state.tokens.ttl().as_secs(),
    }))
}

/// GET /api/user/me
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ServiceResult<Json<MeResponse>> {
    let registered = state.service.user_exists(user_id).await?;
    Ok(Json(MeResponse {
        user_id,
        registered,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::*;
    use crate::api::test_support::{BOT_TOKEN, state};

    /// Init data signed the way the Telegram client signs it
    fn init_data(user_id: UserId) -> String {
        let auth_date = Utc::now().timestamp().to_string();
        let user = format!(r#"{{"id":{}}}"#, user_id);
        let check = format!("auth_date={}\nuser={}", auth_date, user);

        let mut secret = Hmac::<Sha256>::new_from_slice(b"WebAppData").unwrap();
        secret.update(BOT_TOKEN.as_bytes());
        let key = secret.finalize().into_bytes();
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
        mac.update(check.as_bytes());
        let hash = format!("{:x}", mac.finalize().into_bytes());

        format!(
            "auth_date={}&user={}&hash={}",
            auth_date,
            urlencoding::encode(&user),
            hash
        )
    }

    #[tokio::test]
    async fn test_login_registers_and_issues_token() {
        let state = state();
        let Json(response) = login_handler(
            State(state.clone()),
            Json(LoginRequest {
                init_data: init_data(808),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.user_id, 808);
        assert_eq!(state.tokens.validate(&response.token).unwrap(), 808);
        assert_eq!(response.expires_in, 3600);

        let Json(me) = me_handler(State(state), AuthUser(808)).await.unwrap();
        assert!(me.registered);
    }

    #[tokio::test]
    async fn test_login_rejects_tampered_data() {
        let state = state();
        let tampered = init_data(808).replace("808", "809");

        let err = login_handler(State(state), Json(LoginRequest { init_data: tampered }))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
