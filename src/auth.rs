//! Registration, credential checks, and token issuance.
//!
//! A user holds at most one token: authenticating again replaces it, which kills the previous
//! key. Clients present the key as `Authorization: Token <key>`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
};
use tracing::{debug, info};

use crate::{
    AppState,
    entities::user,
    error::{AppError, AppResult},
    extract::ApiJson,
    models::{CurrentUser, IssuedToken, RegisteredUser},
    validation::{FieldError, RawBody, UserInput, ValidationErrors, credentials},
};

const TOKEN_BYTES: usize = 20;
const NO_CREDENTIALS: &str = "Authentication credentials were not provided.";
const INVALID_TOKEN: &str = "Invalid token.";

/// Generates a fresh token key: 40 lowercase hex characters.
pub fn generate_key() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hashes `password` on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(raw): ApiJson<RawBody>,
) -> AppResult<(StatusCode, Json<RegisteredUser>)> {
    let input = UserInput::validate(&raw, &state.store).await?;
    let hash = hash_password(input.password, state.config.bcrypt_cost).await?;

    let Some(user) = state.store.create_user(input.username, hash).await? else {
        return Err(AppError::Validation(ValidationErrors::single(
            "username",
            FieldError::Conflict("username is already taken"),
        )));
    };

    info!(user_id = user.id, username = %user.username, "registered user");
    Ok((StatusCode::CREATED, Json(RegisteredUser { user_id: user.id })))
}

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    ApiJson(raw): ApiJson<RawBody>,
) -> AppResult<Json<IssuedToken>> {
    let Some((username, password)) = credentials(&raw) else {
        debug!("unusable credentials");
        return Err(AppError::AuthFailed);
    };

    let Some(user) = state.store.find_user(&username).await? else {
        debug!(username = %username, "unknown user");
        return Err(AppError::AuthFailed);
    };
    if !verify_password(password, user.password.clone()).await? {
        debug!(user_id = user.id, "wrong password");
        return Err(AppError::AuthFailed);
    }

    let token = state.store.replace_token(user.id, generate_key()).await?;
    info!(user_id = user.id, "issued token");
    Ok(Json(IssuedToken { key: token.key }))
}

pub async fn whoami(AuthUser(user): AuthUser) -> Json<CurrentUser> {
    Json(CurrentUser { user_id: user.id, username: user.username })
}

/// The user owning the token in the `Authorization` header.
pub struct AuthUser(pub user::Model);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Token "))
            .map(str::trim)
            .ok_or(AppError::Unauthenticated(NO_CREDENTIALS))?;

        let user = state.store.user_for_token(key).await?;
        user.map(AuthUser).ok_or(AppError::Unauthenticated(INVALID_TOKEN))
    }
}
