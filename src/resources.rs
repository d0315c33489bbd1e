//! The catalog resources behind the generic handlers in `routes`.
//!
//! Each resource ties a validator, the matching store calls, and a projection together. Handlers
//! are written once against `Resource` and instantiated per resource.

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{DirectorView, MovieView, ReviewView},
    store::Store,
    validation::{DirectorInput, MovieInput, RawBody, ReviewInput},
};

#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Singular name used in error bodies and logs.
    const NAME: &'static str;

    type Input: Send;
    type Output: Serialize + Send;

    async fn validate(store: &Store, raw: &RawBody) -> AppResult<Self::Input>;

    async fn list(store: &Store, page: Option<u64>) -> AppResult<Vec<Self::Output>>;

    async fn get(store: &Store, id: i32) -> AppResult<Option<Self::Output>>;

    async fn exists(store: &Store, id: i32) -> AppResult<bool> {
        Ok(Self::get(store, id).await?.is_some())
    }

    async fn create(store: &Store, input: Self::Input) -> AppResult<Self::Output>;

    async fn update(store: &Store, id: i32, input: Self::Input) -> AppResult<Option<Self::Output>>;

    async fn delete(store: &Store, id: i32) -> AppResult<bool>;
}

pub struct Directors;

#[async_trait]
impl Resource for Directors {
    const NAME: &'static str = "Director";

    type Input = DirectorInput;
    type Output = DirectorView;

    async fn validate(_store: &Store, raw: &RawBody) -> AppResult<DirectorInput> {
        DirectorInput::validate(raw)
    }

    async fn list(store: &Store, page: Option<u64>) -> AppResult<Vec<DirectorView>> {
        Ok(store.list_directors(page).await?.into_iter().map(DirectorView::from).collect())
    }

    async fn get(store: &Store, id: i32) -> AppResult<Option<DirectorView>> {
        Ok(store.get_director(id).await?.map(DirectorView::from))
    }

    async fn exists(store: &Store, id: i32) -> AppResult<bool> {
        store.director_exists(id).await
    }

    async fn create(store: &Store, input: DirectorInput) -> AppResult<DirectorView> {
        Ok(store.create_director(input).await?.into())
    }

    async fn update(store: &Store, id: i32, input: DirectorInput) -> AppResult<Option<DirectorView>> {
        Ok(store.update_director(id, input).await?.map(DirectorView::from))
    }

    async fn delete(store: &Store, id: i32) -> AppResult<bool> {
        store.delete_director(id).await
    }
}

pub struct Movies;

#[async_trait]
impl Resource for Movies {
    const NAME: &'static str = "Movie";

    type Input = MovieInput;
    type Output = MovieView;

    async fn validate(store: &Store, raw: &RawBody) -> AppResult<MovieInput> {
        MovieInput::validate(raw, store).await
    }

    async fn list(store: &Store, page: Option<u64>) -> AppResult<Vec<MovieView>> {
        Ok(store.list_movies(page).await?.into_iter().map(MovieView::from).collect())
    }

    async fn get(store: &Store, id: i32) -> AppResult<Option<MovieView>> {
        Ok(store.get_movie(id).await?.map(MovieView::from))
    }

    async fn exists(store: &Store, id: i32) -> AppResult<bool> {
        store.movie_exists(id).await
    }

    async fn create(store: &Store, input: MovieInput) -> AppResult<MovieView> {
        Ok(store.create_movie(input).await?.into())
    }

    async fn update(store: &Store, id: i32, input: MovieInput) -> AppResult<Option<MovieView>> {
        Ok(store.update_movie(id, input).await?.map(MovieView::from))
    }

    async fn delete(store: &Store, id: i32) -> AppResult<bool> {
        store.delete_movie(id).await
    }
}

pub struct Reviews;

#[async_trait]
impl Resource for Reviews {
    const NAME: &'static str = "Review";

    type Input = ReviewInput;
    type Output = ReviewView;

    async fn validate(store: &Store, raw: &RawBody) -> AppResult<ReviewInput> {
        ReviewInput::validate(raw, store).await
    }

    async fn list(store: &Store, page: Option<u64>) -> AppResult<Vec<ReviewView>> {
        Ok(store.list_reviews(page).await?.into_iter().map(ReviewView::from).collect())
    }

    async fn get(store: &Store, id: i32) -> AppResult<Option<ReviewView>> {
        Ok(store.get_review(id).await?.map(ReviewView::from))
    }

    async fn create(store: &Store, input: ReviewInput) -> AppResult<ReviewView> {
        Ok(store.create_review(input).await?.into())
    }

    async fn update(store: &Store, id: i32, input: ReviewInput) -> AppResult<Option<ReviewView>> {
        Ok(store.update_review(id, input).await?.map(ReviewView::from))
    }

    async fn delete(store: &Store, id: i32) -> AppResult<bool> {
        store.delete_review(id).await
    }
}
