use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, LoaderTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, SqlErr, TransactionTrait,
};

use crate::{
    entities::{director, movie, review, token, user},
    error::{AppError, AppResult},
    validation::{DirectorInput, FieldError, MovieInput, ReviewInput, ValidationErrors},
};

/// A movie together with everything its projection needs.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieRecord {
    pub movie: movie::Model,
    pub director: Option<director::Model>,
    pub reviews: Vec<review::Model>,
}

#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    page_size: u64,
}

impl Store {
    pub fn new(db: DatabaseConnection, page_size: u64) -> Self {
        Self { db, page_size: page_size.max(1) }
    }

    #[cfg(test)]
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Whether the 1-based `page` starts at a row offset SQLite can address.
    pub fn page_in_range(&self, page: u64) -> bool {
        page >= 1
            && (page - 1).checked_mul(self.page_size).is_some_and(|offset| offset <= i64::MAX as u64)
    }

    /// Runs `select`, restricted to the 1-based `page` when one is given.
    async fn fetch<E>(&self, select: Select<E>, page: Option<u64>) -> AppResult<Vec<E::Model>>
    where
        E: EntityTrait,
        E::Model: Sync + 'static,
    {
        let rows = match page {
            Some(page) => {
                select.paginate(&self.db, self.page_size).fetch_page(page.saturating_sub(1)).await?
            },
            None => select.all(&self.db).await?,
        };
        Ok(rows)
    }

    pub async fn list_directors(&self, page: Option<u64>) -> AppResult<Vec<director::Model>> {
        self.fetch(director::Entity::find().order_by_asc(director::Column::Id), page).await
    }

    pub async fn get_director(&self, id: i32) -> AppResult<Option<director::Model>> {
        Ok(director::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn director_exists(&self, id: i32) -> AppResult<bool> {
        Ok(director::Entity::find_by_id(id).count(&self.db).await? > 0)
    }

    pub async fn create_director(&self, input: DirectorInput) -> AppResult<director::Model> {
        let model = director::ActiveModel { name: Set(input.name), ..Default::default() };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn update_director(
        &self,
        id: i32,
        input: DirectorInput,
    ) -> AppResult<Option<director::Model>> {
        let Some(existing) = self.get_director(id).await? else {
            return Ok(None);
        };
        let mut model: director::ActiveModel = existing.into();
        model.name = Set(input.name);
        Ok(Some(model.update(&self.db).await?))
    }

    /// Deletes a director with its movies and their reviews.
    pub async fn delete_director(&self, id: i32) -> AppResult<bool> {
        let txn = self.db.begin().await?;

        let movie_ids: Vec<i32> = movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .filter(movie::Column::DirectorId.eq(id))
            .into_tuple()
            .all(&txn)
            .await?;

        if !movie_ids.is_empty() {
            review::Entity::delete_many()
                .filter(review::Column::MovieId.is_in(movie_ids.iter().copied()))
                .exec(&txn)
                .await?;
            movie::Entity::delete_many()
                .filter(movie::Column::DirectorId.eq(id))
                .exec(&txn)
                .await?;
        }

        let res = director::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(res.rows_affected > 0)
    }

    /// Attaches directors and reviews with one batched query each.
    async fn attach_relations(&self, movies: Vec<movie::Model>) -> AppResult<Vec<MovieRecord>> {
        let directors = movies.load_one(director::Entity, &self.db).await?;
        let reviews = movies
            .load_many(review::Entity::find().order_by_asc(review::Column::Id), &self.db)
            .await?;

        Ok(movies
            .into_iter()
            .zip(directors)
            .zip(reviews)
            .map(|((movie, director), reviews)| MovieRecord { movie, director, reviews })
            .collect())
    }

    pub async fn list_movies(&self, page: Option<u64>) -> AppResult<Vec<MovieRecord>> {
        let movies =
            self.fetch(movie::Entity::find().order_by_asc(movie::Column::Id), page).await?;
        self.attach_relations(movies).await
    }

    pub async fn get_movie(&self, id: i32) -> AppResult<Option<MovieRecord>> {
        let Some(movie) = movie::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![movie]).await?.pop())
    }

    pub async fn movie_exists(&self, id: i32) -> AppResult<bool> {
        Ok(movie::Entity::find_by_id(id).count(&self.db).await? > 0)
    }

    pub async fn create_movie(&self, input: MovieInput) -> AppResult<MovieRecord> {
        let model = movie::ActiveModel {
            title: Set(input.title),
            description: Set(input.description),
            duration: Set(input.duration),
            director_id: Set(input.director_id),
            ..Default::default()
        };
        let movie = model
            .insert(&self.db)
            .await
            .map_err(|err| missing_reference(err, "director_id", "Director", input.director_id))?;
        self.attach_relations(vec![movie])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("inserted movie has no record").into())
    }

    pub async fn update_movie(&self, id: i32, input: MovieInput) -> AppResult<Option<MovieRecord>> {
        let Some(existing) = movie::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        let mut model: movie::ActiveModel = existing.into();
        model.title = Set(input.title);
        model.description = Set(input.description);
        model.duration = Set(input.duration);
        model.director_id = Set(input.director_id);
        let movie = model
            .update(&self.db)
            .await
            .map_err(|err| missing_reference(err, "director_id", "Director", input.director_id))?;
        Ok(self.attach_relations(vec![movie]).await?.pop())
    }

    /// Deletes a movie with its reviews.
    pub async fn delete_movie(&self, id: i32) -> AppResult<bool> {
        let txn = self.db.begin().await?;
        review::Entity::delete_many().filter(review::Column::MovieId.eq(id)).exec(&txn).await?;
        let res = movie::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn list_reviews(&self, page: Option<u64>) -> AppResult<Vec<review::Model>> {
        self.fetch(review::Entity::find().order_by_asc(review::Column::Id), page).await
    }

    pub async fn get_review(&self, id: i32) -> AppResult<Option<review::Model>> {
        Ok(review::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn create_review(&self, input: ReviewInput) -> AppResult<review::Model> {
        let model = review::ActiveModel {
            text: Set(input.text),
            movie_id: Set(input.movie_id),
            stars: Set(Some(input.stars)),
            ..Default::default()
        };
        model
            .insert(&self.db)
            .await
            .map_err(|err| missing_reference(err, "movie_id", "Movie", input.movie_id))
    }

    pub async fn update_review(
        &self,
        id: i32,
        input: ReviewInput,
    ) -> AppResult<Option<review::Model>> {
        let Some(existing) = self.get_review(id).await? else {
            return Ok(None);
        };
        let mut model: review::ActiveModel = existing.into();
        model.text = Set(input.text);
        model.movie_id = Set(input.movie_id);
        model.stars = Set(Some(input.stars));
        let review = model
            .update(&self.db)
            .await
            .map_err(|err| missing_reference(err, "movie_id", "Movie", input.movie_id))?;
        Ok(Some(review))
    }

    pub async fn delete_review(&self, id: i32) -> AppResult<bool> {
        let res = review::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn find_user(&self, username: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    /// Inserts a user; `None` when the username was taken concurrently.
    pub async fn create_user(
        &self,
        username: String,
        password_hash: String,
    ) -> AppResult<Option<user::Model>> {
        let model = user::ActiveModel {
            username: Set(username),
            password: Set(password_hash),
            date_joined: Set(now_sec()),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(user) => Ok(Some(user)),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(None)
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Drops whatever token `user_id` holds and stores `key` as its only token.
    pub async fn replace_token(&self, user_id: i32, key: String) -> AppResult<token::Model> {
        let txn = self.db.begin().await?;
        token::Entity::delete_many().filter(token::Column::UserId.eq(user_id)).exec(&txn).await?;
        let model = token::ActiveModel { key: Set(key), user_id: Set(user_id), created: Set(now_sec()) };
        let token = model.insert(&txn).await?;
        txn.commit().await?;
        Ok(token)
    }

    pub async fn user_for_token(&self, key: &str) -> AppResult<Option<user::Model>> {
        let found = token::Entity::find_by_id(key.to_string())
            .find_also_related(user::Entity)
            .one(&self.db)
            .await?;
        Ok(found.and_then(|(_, user)| user))
    }
}

/// Reports a foreign-key failure as the same field error the validators give when the referenced
/// row is gone, which happens when it is deleted between the check and the write.
fn missing_reference(err: DbErr, field: &str, resource: &'static str, id: i32) -> AppError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => AppError::Validation(
            ValidationErrors::single(field, FieldError::ReferenceNotFound { resource, id }),
        ),
        _ => err.into(),
    }
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::TestContext;

    #[tokio::test]
    async fn test_director_crud() {
        let context = TestContext::setup().await;
        let store = context.store();

        let created =
            store.create_director(DirectorInput { name: "Agnès Varda".to_string() }).await.unwrap();
        assert_eq!(Some(created.clone()), store.get_director(created.id).await.unwrap());

        let updated = store
            .update_director(created.id, DirectorInput { name: "Varda".to_string() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!("Varda", updated.name);
        assert_eq!(vec![updated], store.list_directors(None).await.unwrap());

        assert!(store.delete_director(created.id).await.unwrap());
        assert!(!store.delete_director(created.id).await.unwrap());
        assert_eq!(None, store.get_director(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let context = TestContext::setup().await;
        let store = context.store();

        let input = DirectorInput { name: "Nobody".to_string() };
        assert_eq!(None, store.update_director(42, input).await.unwrap());
        let input = ReviewInput { text: "x".to_string(), movie_id: 1, stars: 3 };
        assert_eq!(None, store.update_review(42, input).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_director_cascades() {
        let context = TestContext::setup().await;
        let store = context.store();

        let doomed = context.add_director("Doomed").await;
        let kept = context.add_director("Kept").await;
        let doomed_movie = context.add_movie("First", doomed).await;
        let doomed_movie2 = context.add_movie("Second", doomed).await;
        let kept_movie = context.add_movie("Third", kept).await;
        let doomed_review = context.add_review(doomed_movie, 4).await;
        context.add_review(doomed_movie2, 2).await;
        let kept_review = context.add_review(kept_movie, 5).await;

        assert!(store.delete_director(doomed).await.unwrap());

        assert!(!store.movie_exists(doomed_movie).await.unwrap());
        assert!(!store.movie_exists(doomed_movie2).await.unwrap());
        assert_eq!(None, store.get_review(doomed_review).await.unwrap());
        assert!(store.movie_exists(kept_movie).await.unwrap());
        assert!(store.get_review(kept_review).await.unwrap().is_some());
        assert_eq!(1, store.list_reviews(None).await.unwrap().len());
    }

    #[tokio::test]
    async fn test_delete_movie_cascades() {
        let context = TestContext::setup().await;
        let store = context.store();

        let director = context.add_director("D").await;
        let movie = context.add_movie("M", director).await;
        let review = context.add_review(movie, 3).await;

        assert!(store.delete_movie(movie).await.unwrap());
        assert_eq!(None, store.get_review(review).await.unwrap());
        assert!(store.director_exists(director).await.unwrap());
        assert!(!store.delete_movie(movie).await.unwrap());
    }

    #[tokio::test]
    async fn test_movie_records_carry_relations() {
        let context = TestContext::setup().await;
        let store = context.store();

        let d1 = context.add_director("One").await;
        let d2 = context.add_director("Two").await;
        let m1 = context.add_movie("A", d1).await;
        let m2 = context.add_movie("B", d2).await;
        let r1 = context.add_review(m1, 1).await;
        let r2 = context.add_review(m1, 5).await;

        let records = store.list_movies(None).await.unwrap();
        assert_eq!(2, records.len());
        assert_eq!(m1, records[0].movie.id);
        assert_eq!(Some("One"), records[0].director.as_ref().map(|d| d.name.as_str()));
        assert_eq!(vec![r1, r2], records[0].reviews.iter().map(|r| r.id).collect::<Vec<_>>());
        assert_eq!(m2, records[1].movie.id);
        assert_eq!(Some("Two"), records[1].director.as_ref().map(|d| d.name.as_str()));
        assert!(records[1].reviews.is_empty());

        assert_eq!(Some(records[0].clone()), store.get_movie(m1).await.unwrap());
    }

    #[tokio::test]
    async fn test_pagination() {
        let context = TestContext::setup_with_page_size(2).await;
        let store = context.store();

        for name in ["a", "b", "c"] {
            context.add_director(name).await;
        }

        let names = |rows: Vec<director::Model>| rows.into_iter().map(|d| d.name).collect::<Vec<_>>();
        assert_eq!(vec!["a", "b"], names(store.list_directors(Some(1)).await.unwrap()));
        assert_eq!(vec!["c"], names(store.list_directors(Some(2)).await.unwrap()));
        assert!(store.list_directors(Some(3)).await.unwrap().is_empty());
        assert_eq!(3, store.list_directors(None).await.unwrap().len());

        assert!(store.page_in_range(1));
        assert!(store.page_in_range(i64::MAX as u64 / 2 + 1));
        assert!(!store.page_in_range(0));
        assert!(!store.page_in_range(i64::MAX as u64 / 2 + 2));
        assert!(!store.page_in_range(u64::MAX));
    }

    #[tokio::test]
    async fn test_write_to_deleted_reference() {
        let context = TestContext::setup().await;
        let store = context.store();

        let director = context.add_director("D").await;
        let movie = context.add_movie("M", director).await;
        let review = context.add_review(movie, 3).await;
        let gone_director = context.add_director("Gone").await;
        let gone_movie = context.add_movie("Gone", director).await;
        assert!(store.delete_director(gone_director).await.unwrap());
        assert!(store.delete_movie(gone_movie).await.unwrap());

        let movie_input = MovieInput {
            title: "T".to_string(),
            description: "D".to_string(),
            duration: 1.0,
            director_id: gone_director,
        };
        let review_input = ReviewInput { text: "x".to_string(), movie_id: gone_movie, stars: 3 };

        let director_error = FieldError::ReferenceNotFound { resource: "Director", id: gone_director };
        let movie_error = FieldError::ReferenceNotFound { resource: "Movie", id: gone_movie };
        let results = [
            store.create_movie(movie_input.clone()).await.map(drop),
            store.update_movie(movie, movie_input).await.map(drop),
            store.create_review(review_input.clone()).await.map(drop),
            store.update_review(review, review_input).await.map(drop),
        ];
        let expected = [
            ("director_id", &director_error),
            ("director_id", &director_error),
            ("movie_id", &movie_error),
            ("movie_id", &movie_error),
        ];
        for (result, (field, error)) in results.into_iter().zip(expected) {
            match result {
                Err(AppError::Validation(errors)) => {
                    assert_eq!(vec![field], errors.fields().collect::<Vec<_>>());
                    assert_eq!(Some(std::slice::from_ref(error)), errors.get(field));
                },
                other => panic!("expected a validation error, got {other:?}"),
            }
        }

        assert_eq!(1, store.list_movies(None).await.unwrap().len());
        assert_eq!(director, store.get_movie(movie).await.unwrap().unwrap().movie.director_id);
    }

    #[tokio::test]
    async fn test_replace_token_keeps_one_per_user() {
        let context = TestContext::setup().await;
        let store = context.store();
        let user_id = context.add_user("alice", "pw").await;

        store.replace_token(user_id, "a".repeat(40)).await.unwrap();
        store.replace_token(user_id, "b".repeat(40)).await.unwrap();

        assert_eq!(None, store.user_for_token(&"a".repeat(40)).await.unwrap());
        let user = store.user_for_token(&"b".repeat(40)).await.unwrap().unwrap();
        assert_eq!("alice", user.username);
        assert_eq!(1, token::Entity::find().all(store.db()).await.unwrap().len());
    }
}
