//! Wire representations returned to clients.
//!
//! Projections are plain conversions from rows that the store already loaded; nothing here
//! touches the database.

use serde::Serialize;

use crate::{
    entities::{director, review},
    store::MovieRecord,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectorView {
    pub id: i32,
    pub name: String,
}

impl From<director::Model> for DirectorView {
    fn from(d: director::Model) -> Self {
        Self { id: d.id, name: d.name }
    }
}

/// A review without its movie back-reference.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewView {
    pub id: i32,
    pub text: String,
    pub stars: Option<i32>,
}

impl From<review::Model> for ReviewView {
    fn from(r: review::Model) -> Self {
        Self { id: r.id, text: r.text, stars: r.stars }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovieView {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub director: Option<DirectorView>,
    pub reviews: Vec<ReviewView>,
    pub director_name: String,
}

impl From<MovieRecord> for MovieView {
    fn from(record: MovieRecord) -> Self {
        let MovieRecord { movie, director, reviews } = record;
        let director_name = director.as_ref().map(|d| d.name.clone()).unwrap_or_default();
        Self {
            id: movie.id,
            title: movie.title,
            description: movie.description,
            duration: movie.duration,
            director: director.map(DirectorView::from),
            reviews: reviews.into_iter().map(ReviewView::from).collect(),
            director_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisteredUser {
    pub user_id: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IssuedToken {
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurrentUser {
    pub user_id: i32,
    pub username: String,
}
