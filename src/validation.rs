//! Decoding and checking of untrusted request bodies.
//!
//! Every validator walks all of its fields and collects every failure before giving up, so a body
//! with two bad fields reports two entries.

use std::{collections::BTreeMap, fmt};

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};

use crate::{
    error::{AppError, AppResult},
    store::Store,
};

/// Raw JSON object as received from a client.
pub type RawBody = Map<String, Value>;

pub const MAX_NAME_LEN: usize = 150;
pub const MIN_STARS: i32 = 1;
pub const MAX_STARS: i32 = 5;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("This field is required.")]
    Required,
    #[error("This field may not be null.")]
    Null,
    #[error("This field may not be blank.")]
    Blank,
    #[error("Ensure this field has no more than {max} characters.")]
    TooLong { max: usize },
    #[error("Not a valid string.")]
    NotAString,
    #[error("A valid integer is required.")]
    NotAnInteger,
    #[error("A valid number is required.")]
    NotANumber,
    #[error("Ensure this value is between {min} and {max}.")]
    OutOfRange { min: i32, max: i32 },
    #[error("{resource} with id {id} does not exist.")]
    ReferenceNotFound { resource: &'static str, id: i32 },
    #[error("{0}")]
    Conflict(&'static str),
    #[error("Invalid page.")]
    InvalidPage,
    #[error("{0}")]
    Malformed(String),
}

/// Field-level failures keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationErrors(BTreeMap<String, Vec<FieldError>>);

impl ValidationErrors {
    pub fn single(field: &str, err: FieldError) -> Self {
        let mut errors = Self::default();
        errors.add(field, err);
        errors
    }

    pub fn add(&mut self, field: &str, err: FieldError) {
        self.0.entry(field.to_string()).or_default().push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, errs) in &self.0 {
            for err in errs {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {err}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, errs) in &self.0 {
            let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
            map.serialize_entry(field, &messages)?;
        }
        map.end()
    }
}

fn required<'a>(raw: &'a RawBody, field: &str, errors: &mut ValidationErrors) -> Option<&'a Value> {
    match raw.get(field) {
        None => {
            errors.add(field, FieldError::Required);
            None
        },
        Some(Value::Null) => {
            errors.add(field, FieldError::Null);
            None
        },
        Some(value) => Some(value),
    }
}

/// Required, non-blank string, trimmed, optionally bounded in characters.
fn string_field(
    raw: &RawBody,
    field: &str,
    max_len: Option<usize>,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = required(raw, field, errors)?;
    let Some(s) = text_value(value) else {
        errors.add(field, FieldError::NotAString);
        return None;
    };
    if s.is_empty() {
        errors.add(field, FieldError::Blank);
        return None;
    }
    if let Some(max) = max_len {
        if s.chars().count() > max {
            errors.add(field, FieldError::TooLong { max });
            return None;
        }
    }
    Some(s)
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Required, non-empty string taken exactly as sent: no trimming, no number coercion.
fn exact_string_field(
    raw: &RawBody,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<String> {
    match required(raw, field, errors)? {
        Value::String(s) if s.is_empty() => {
            errors.add(field, FieldError::Blank);
            None
        },
        Value::String(s) => Some(s.clone()),
        _ => {
            errors.add(field, FieldError::NotAString);
            None
        },
    }
}

/// Login credentials decoded the same way registration stores them. Anything registration
/// would reject comes back as `None`.
pub fn credentials(raw: &RawBody) -> Option<(String, String)> {
    let username = raw.get("username").and_then(text_value).filter(|u| !u.is_empty())?;
    let password = match raw.get("password") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    Some((username, password))
}

fn integer_field(raw: &RawBody, field: &str, errors: &mut ValidationErrors) -> Option<i32> {
    let value = required(raw, field, errors)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(field, FieldError::NotAnInteger);
    }
    parsed
}

/// Optional float; absent or null yields `default`.
fn float_field(
    raw: &RawBody,
    field: &str,
    default: f64,
    errors: &mut ValidationErrors,
) -> Option<f64> {
    let parsed = match raw.get(field) {
        None | Some(Value::Null) => Some(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Some(_) => None,
    };
    if parsed.is_none() {
        errors.add(field, FieldError::NotANumber);
    }
    parsed
}

fn finish<T>(errors: ValidationErrors, value: Option<T>) -> AppResult<T> {
    match value {
        Some(value) if errors.is_empty() => Ok(value),
        _ => {
            tracing::debug!(errors = %errors, "validation failed");
            Err(AppError::Validation(errors))
        },
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectorInput {
    pub name: String,
}

impl DirectorInput {
    pub fn validate(raw: &RawBody) -> AppResult<Self> {
        let mut errors = ValidationErrors::default();
        let name = string_field(raw, "name", Some(MAX_NAME_LEN), &mut errors);
        finish(errors, name.map(|name| Self { name }))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MovieInput {
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub director_id: i32,
}

impl MovieInput {
    pub async fn validate(raw: &RawBody, store: &Store) -> AppResult<Self> {
        let mut errors = ValidationErrors::default();
        let title = string_field(raw, "title", Some(MAX_NAME_LEN), &mut errors);
        let description = string_field(raw, "description", None, &mut errors);
        let duration = float_field(raw, "duration", 0.0, &mut errors);
        let director_id = integer_field(raw, "director_id", &mut errors);

        if let Some(id) = director_id {
            if !store.director_exists(id).await? {
                errors.add("director_id", FieldError::ReferenceNotFound { resource: "Director", id });
            }
        }

        let input = match (title, description, duration, director_id) {
            (Some(title), Some(description), Some(duration), Some(director_id)) => {
                Some(Self { title, description, duration, director_id })
            },
            _ => None,
        };
        finish(errors, input)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReviewInput {
    pub text: String,
    pub movie_id: i32,
    pub stars: i32,
}

impl ReviewInput {
    pub async fn validate(raw: &RawBody, store: &Store) -> AppResult<Self> {
        let mut errors = ValidationErrors::default();
        let text = string_field(raw, "text", None, &mut errors);
        let movie_id = integer_field(raw, "movie_id", &mut errors);
        let stars = integer_field(raw, "stars", &mut errors).filter(|stars| {
            let ok = (MIN_STARS..=MAX_STARS).contains(stars);
            if !ok {
                errors.add("stars", FieldError::OutOfRange { min: MIN_STARS, max: MAX_STARS });
            }
            ok
        });

        if let Some(id) = movie_id {
            if !store.movie_exists(id).await? {
                errors.add("movie_id", FieldError::ReferenceNotFound { resource: "Movie", id });
            }
        }

        let input = match (text, movie_id, stars) {
            (Some(text), Some(movie_id), Some(stars)) => Some(Self { text, movie_id, stars }),
            _ => None,
        };
        finish(errors, input)
    }
}

/// Registration payload. The password is kept in memory only until it is hashed.
#[derive(Clone, PartialEq)]
pub struct UserInput {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for UserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserInput")
            .field("username", &self.username)
            .field("password", &"scrubbed")
            .finish()
    }
}

impl UserInput {
    pub async fn validate(raw: &RawBody, store: &Store) -> AppResult<Self> {
        let mut errors = ValidationErrors::default();
        let username = string_field(raw, "username", Some(MAX_NAME_LEN), &mut errors);
        let password = exact_string_field(raw, "password", &mut errors);

        if let Some(username) = &username {
            if store.find_user(username).await?.is_some() {
                errors.add("username", FieldError::Conflict("username is already taken"));
            }
        }

        let input = match (username, password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        };
        finish(errors, input)
    }
}
