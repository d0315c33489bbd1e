use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState, auth,
    error::{AppError, AppResult},
    extract::{ApiJson, ApiPath, ApiQuery},
    resources::{Directors, Movies, Resource, Reviews},
    validation::{FieldError, RawBody, ValidationErrors},
};

pub fn app(state: Arc<AppState>) -> Router {
    let router = Router::new();
    let router = resource_routes::<Directors>(router, "directors");
    let router = resource_routes::<Directors>(router, "directors_cbv");
    let router = resource_routes::<Movies>(router, "movies");
    let router = resource_routes::<Movies>(router, "movies_cbv");
    let router = resource_routes::<Reviews>(router, "reviews");
    let router = resource_routes::<Reviews>(router, "reviews_cbv");

    router
        .route("/api/v1/users/register/", post(auth::register))
        .route("/api/v1/users/auth/", post(auth::authenticate))
        .route("/api/v1/users/me/", get(auth::whoami))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Mounts the five operations of `R` under `/api/v1/{prefix}/`.
fn resource_routes<R: Resource>(
    router: Router<Arc<AppState>>,
    prefix: &str,
) -> Router<Arc<AppState>> {
    router
        .route(&format!("/api/v1/{prefix}/"), get(list::<R>).post(create::<R>))
        .route(
            &format!("/api/v1/{prefix}/{{id}}/"),
            get(retrieve::<R>).put(replace::<R>).delete(destroy::<R>),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u64>,
}

pub async fn list<R: Resource>(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Vec<R::Output>>> {
    if query.page.is_some_and(|page| !state.store.page_in_range(page)) {
        return Err(AppError::Validation(ValidationErrors::single("page", FieldError::InvalidPage)));
    }
    Ok(Json(R::list(&state.store, query.page).await?))
}

pub async fn create<R: Resource>(
    State(state): State<Arc<AppState>>,
    ApiJson(raw): ApiJson<RawBody>,
) -> AppResult<(StatusCode, Json<R::Output>)> {
    let input = R::validate(&state.store, &raw).await?;
    let created = R::create(&state.store, input).await?;
    tracing::info!(resource = R::NAME, "created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn retrieve<R: Resource>(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<R::Output>> {
    R::get(&state.store, id).await?.map(Json).ok_or(AppError::NotFound(R::NAME))
}

/// Full update. A missing row wins over an invalid body.
pub async fn replace<R: Resource>(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(raw): ApiJson<RawBody>,
) -> AppResult<Json<R::Output>> {
    if !R::exists(&state.store, id).await? {
        return Err(AppError::NotFound(R::NAME));
    }
    let input = R::validate(&state.store, &raw).await?;
    let updated = R::update(&state.store, id, input).await?.ok_or(AppError::NotFound(R::NAME))?;
    tracing::info!(resource = R::NAME, id, "updated");
    Ok(Json(updated))
}

pub async fn destroy<R: Resource>(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<StatusCode> {
    if !R::delete(&state.store, id).await? {
        return Err(AppError::NotFound(R::NAME));
    }
    tracing::info!(resource = R::NAME, id, "removed");
    Ok(StatusCode::NO_CONTENT)
}
