//! Test utilities: an in-memory database per test and a oneshot driver for the router.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
};
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    AppState, auth,
    config::Config,
    db,
    routes,
    store::Store,
    validation::{DirectorInput, MovieInput, ReviewInput},
};

const BCRYPT_TEST_COST: u32 = 4;

/// Status and decoded body of a response; empty bodies decode to `Value::Null`.
#[derive(Debug, PartialEq)]
pub(crate) struct TestResponse {
    pub(crate) status: u16,
    pub(crate) body: Value,
}

pub(crate) struct TestContext {
    state: Arc<AppState>,
    app: Router,
}

impl TestContext {
    pub(crate) async fn setup() -> Self {
        Self::setup_with_page_size(20).await
    }

    pub(crate) async fn setup_with_page_size(page_size: u64) -> Self {
        let config = Arc::new(Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "sqlite::memory:".to_string(),
            page_size,
            bcrypt_cost: BCRYPT_TEST_COST,
        });
        let db = db::connect_and_migrate(&config.database_url).await.unwrap();
        let state = Arc::new(AppState { config, store: Store::new(db, page_size) });
        let app = routes::app(state.clone());
        Self { state, app }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.state.store
    }

    pub(crate) async fn add_director(&self, name: &str) -> i32 {
        let input = DirectorInput { name: name.to_string() };
        self.store().create_director(input).await.unwrap().id
    }

    pub(crate) async fn add_movie(&self, title: &str, director_id: i32) -> i32 {
        let input = MovieInput {
            title: title.to_string(),
            description: format!("About {title}"),
            duration: 0.0,
            director_id,
        };
        self.store().create_movie(input).await.unwrap().movie.id
    }

    pub(crate) async fn add_review(&self, movie_id: i32, stars: i32) -> i32 {
        let input = ReviewInput { text: format!("{stars} stars"), movie_id, stars };
        self.store().create_review(input).await.unwrap().id
    }

    pub(crate) async fn add_user(&self, username: &str, password: &str) -> i32 {
        let hash = auth::hash_password(password.to_string(), BCRYPT_TEST_COST).await.unwrap();
        self.store().create_user(username.to_string(), hash).await.unwrap().unwrap().id
    }

    async fn oneshot(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse { status, body }
    }

    /// Sends `body`, if any, as JSON.
    pub(crate) async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.oneshot(request).await
    }

    pub(crate) async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: &'static str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.oneshot(request).await
    }

    pub(crate) async fn send_with_token(&self, method: Method, uri: &str, key: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Token {key}"))
            .body(Body::empty())
            .unwrap();
        self.oneshot(request).await
    }
}
