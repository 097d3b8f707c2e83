//! Postgres engine for both repositories.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use tracing::{error, info, warn};

use crate::{
    errors::{AppError, AppResult},
    models::{Book, BookPatch, BookStatus, NewBook, Role, User},
    query::{ListQuery, SortField},
    repository::{BookRepository, UserRepository},
};

const BOOK_COLUMNS: &str = "id, title, author, year, status";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    title: String,
    author: String,
    year: i32,
    status: String,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookStatus>()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("stored book {} has bad status", row.id)))?;
        Ok(Self {
            id: row.id,
            title: row.title,
            author: row.author,
            year: row.year,
            status,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with exponential backoff and apply the embedded migrations.
    ///
    /// # Errors
    /// Returns an error when every connection attempt fails or a migration fails.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = connect_with_retry(database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL after retries: {e}"))?;

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {e}"))?;
        info!("Database migrations completed successfully");

        Ok(Self::new(pool))
    }
}

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut delay = Duration::from_millis(500);
    let max_attempts = 30;
    let mut attempt = 1;

    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL on attempt {attempt}");
                return Ok(pool);
            }
            Err(e) if attempt >= max_attempts => {
                error!("All connection attempts failed");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Database connection failed (attempt {}/{}): {e}, retrying in {:?}",
                    attempt, max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
                attempt += 1;
            }
        }
    }
}

/// Escape LIKE metacharacters so the term is matched literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ListQuery) {
    qb.push(" WHERE 1=1");
    if !query.term.is_empty() {
        let pattern = like_pattern(&query.term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

/// ORDER BY expression for a sort field. Text columns compare byte-wise so
/// Postgres orders exactly like the memory store.
const fn order_expr(field: SortField) -> &'static str {
    match field {
        SortField::Title => "title COLLATE \"C\"",
        SortField::Author => "author COLLATE \"C\"",
        SortField::Status => "status COLLATE \"C\"",
        SortField::Id | SortField::Year => field.column(),
    }
}

fn count_query(query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM books");
    push_filters(&mut count, query);
    count
}

fn select_query(query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut select = QueryBuilder::new(format!("SELECT {BOOK_COLUMNS} FROM books"));
    push_filters(&mut select, query);
    select.push(" ORDER BY ");
    {
        let mut order = select.separated(", ");
        for key in &query.sort {
            order.push(order_expr(key.field));
            order.push_unseparated(if key.descending { " DESC" } else { " ASC" });
        }
    }
    select
        .push(" LIMIT ")
        .push_bind(i64::from(query.limit))
        .push(" OFFSET ")
        .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
    select
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (email, password_hash, role) VALUES ($1, $2, $3) RETURNING id, email, password_hash, role",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateEmail
            } else {
                AppError::Database(e)
            }
        })?;
        row.try_into()
    }
}

#[async_trait]
impl BookRepository for PgStore {
    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "INSERT INTO books (title, author, year, status) VALUES ($1, $2, $3, $4) RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year)
        .bind(book.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_book(&self, id: i64) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(AppError::NotFound)?.try_into()
    }

    async fn update_book(&self, id: i64, patch: BookPatch) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "UPDATE books SET title = COALESCE($2, title), author = COALESCE($3, author), \
             year = COALESCE($4, year), status = COALESCE($5, status) \
             WHERE id = $1 RETURNING {BOOK_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.author)
        .bind(patch.year)
        .bind(patch.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(AppError::NotFound)?.try_into()
    }

    async fn delete_book(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn list_books(&self, query: &ListQuery) -> AppResult<(Vec<Book>, u64)> {
        let mut count = count_query(query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = select_query(query);
        let rows = select
            .build_query_as::<BookRow>()
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Book::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((items, u64::try_from(total).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::{count_query, like_pattern, select_query};
    use crate::{
        models::BookStatus,
        query::{ListQuery, SortField, SortKey},
    };

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("quijote"), "%quijote%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn default_listing_has_no_filters() {
        let query = ListQuery::default();
        assert_eq!(count_query(&query).sql(), "SELECT COUNT(*) FROM books WHERE 1=1");
        assert_eq!(
            select_query(&query).sql(),
            "SELECT id, title, author, year, status FROM books WHERE 1=1 ORDER BY id ASC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn filters_bind_term_twice_then_status() {
        let query = ListQuery {
            term: "borges".into(),
            status: Some(BookStatus::Reserved),
            ..ListQuery::default()
        };
        assert_eq!(
            count_query(&query).sql(),
            "SELECT COUNT(*) FROM books WHERE 1=1 AND (title ILIKE $1 OR author ILIKE $2) AND status = $3"
        );
    }

    #[test]
    fn text_sort_keys_use_bytewise_collation() {
        let query = ListQuery {
            term: "borges".into(),
            status: Some(BookStatus::Available),
            sort: vec![
                SortKey::asc(SortField::Year),
                SortKey::desc(SortField::Title),
                SortKey::asc(SortField::Author),
                SortKey::desc(SortField::Status),
                SortKey::asc(SortField::Id),
            ],
            page: 3,
            limit: 5,
        };
        assert_eq!(
            select_query(&query).sql(),
            "SELECT id, title, author, year, status FROM books \
             WHERE 1=1 AND (title ILIKE $1 OR author ILIKE $2) AND status = $3 \
             ORDER BY year ASC, title COLLATE \"C\" DESC, author COLLATE \"C\" ASC, \
             status COLLATE \"C\" DESC, id ASC LIMIT $4 OFFSET $5"
        );
    }
}
