//! Access tokens and Telegram Web App init-data verification.
//!
//! Tokens are `base64url(claims JSON) "." base64url(HMAC-SHA256(payload))`,
//! signed with the configured secret. Init data is verified the way the
//! Telegram Web App documentation prescribes: the sorted `key=value` pairs
//! (minus `hash`) are signed with `HMAC-SHA256("WebAppData", bot_token)`.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::db::UserId;
use crate::error::{AuthError, ServiceError, ServiceResult};

type HmacSha256 = Hmac<Sha256>;

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Expires at, unix seconds
    pub exp: i64,
}

/// Mints and validates access tokens
#[derive(Clone)]
pub struct TokenAuthority {
    mac: HmacSha256,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl: Duration) -> ServiceResult<Self> {
        if secret.is_empty() {
            return Err(ServiceError::Config {
                message: "auth.token_secret must not be empty".to_string(),
            });
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            ServiceError::Config {
                message: format!("invalid token secret: {}", e),
            }
        })?;

        Ok(Self { mac, ttl })
    }

    /// Lifetime of newly minted tokens
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user_id`
    pub fn mint(&self, user_id: UserId) -> ServiceResult<String> {
        self.mint_at(user_id, Utc::now().timestamp())
    }

    /// Check a token's signature and expiry, yielding the user it was issued to
    pub fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        self.validate_at(token, Utc::now().timestamp())
            .map(|claims| claims.user_id)
    }

    fn mint_at(&self, user_id: UserId, now: i64) -> ServiceResult<String> {
        let claims = TokenClaims {
            user_id,
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        let json = serde_json::to_vec(&claims).map_err(|e| ServiceError::Internal {
            message: format!("failed to encode token claims: {}", e),
        })?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature))
    }

    fn validate_at(&self, token: &str, now: i64) -> Result<TokenClaims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::MalformedToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::MalformedToken)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::MalformedToken)?;
        let claims: TokenClaims =
            serde_json::from_slice(&json).map_err(|_| AuthError::MalformedToken)?;

        if claims.exp <= now {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

/// User object embedded in init data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

/// Verify Web App init data signed for `bot_token` and return its user
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age: Duration,
) -> Result<TelegramUser, AuthError> {
    verify_init_data_at(init_data, bot_token, max_age, Utc::now().timestamp())
}

fn verify_init_data_at(
    init_data: &str,
    bot_token: &str,
    max_age: Duration,
    now: i64,
) -> Result<TelegramUser, AuthError> {
    let mut pairs = parse_query(init_data)?;

    let hash_index = pairs
        .iter()
        .position(|(key, _)| key == "hash")
        .ok_or(AuthError::MissingField { field: "hash" })?;
    let (_, hash) = pairs.remove(hash_index);
    let expected = hex::decode(hash).map_err(|_| AuthError::HashMismatch)?;

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check_string = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = init_data_mac(bot_token)?;
    mac.update(data_check_string.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::HashMismatch)?;

    let auth_date: i64 = field(&pairs, "auth_date")?
        .parse()
        .map_err(|_| AuthError::MalformedInitData)?;
    if now - auth_date > max_age.as_secs() as i64 {
        return Err(AuthError::StaleInitData);
    }

    serde_json::from_str(field(&pairs, "user")?).map_err(AuthError::InvalidUser)
}

/// Key for the second HMAC round: `HMAC-SHA256(key = "WebAppData", bot_token)`
fn init_data_mac(bot_token: &str) -> Result<HmacSha256, AuthError> {
    let mut secret =
        HmacSha256::new_from_slice(b"WebAppData").map_err(|_| AuthError::MalformedInitData)?;
    secret.update(bot_token.as_bytes());
    let key = secret.finalize().into_bytes();

    HmacSha256::new_from_slice(&key).map_err(|_| AuthError::MalformedInitData)
}

fn parse_query(query: &str) -> Result<Vec<(String, String)>, AuthError> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).map_err(|_| AuthError::MalformedInitData)?;
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value).map_err(|_| AuthError::MalformedInitData)?;
            Ok((key.into_owned(), value.into_owned()))
        })
        .collect()
}

fn field<'a>(pairs: &'a [(String, String)], name: &'static str) -> Result<&'a str, AuthError> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .ok_or(AuthError::MissingField { field: name })
}
