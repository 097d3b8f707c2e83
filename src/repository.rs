//! Storage traits for users and books, plus the in-memory engine used when no
//! database is configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    errors::{AppError, AppResult},
    models::{Book, BookPatch, NewBook, Role, User},
    query::ListQuery,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Persist a new user.
    ///
    /// # Errors
    /// Returns `DuplicateEmail` when the email is already taken.
    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> AppResult<User>;
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create_book(&self, book: NewBook) -> AppResult<Book>;

    /// # Errors
    /// Returns `NotFound` for an unknown id.
    async fn get_book(&self, id: i64) -> AppResult<Book>;

    /// Merge `patch` into the stored record.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    async fn update_book(&self, id: i64, patch: BookPatch) -> AppResult<Book>;

    /// # Errors
    /// Returns `NotFound` for an unknown id.
    async fn delete_book(&self, id: i64) -> AppResult<()>;

    /// One page of matching books and the total match count before pagination.
    async fn list_books(&self, query: &ListQuery) -> AppResult<(Vec<Book>, u64)>;
}

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    last_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Process-local store backing both repositories.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Table<User>>,
    books: RwLock<Table<Book>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.rows.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, email: &str, password_hash: &str, role: Role) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.rows.values().any(|u| u.email == email) {
            return Err(AppError::DuplicateEmail);
        }
        let user = User {
            id: users.next_id(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            role,
        };
        users.rows.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl BookRepository for MemoryStore {
    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        let mut books = self.books.write().await;
        let book = Book {
            id: books.next_id(),
            title: book.title,
            author: book.author,
            year: book.year,
            status: book.status,
        };
        books.rows.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: i64) -> AppResult<Book> {
        let books = self.books.read().await;
        books.rows.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn update_book(&self, id: i64, patch: BookPatch) -> AppResult<Book> {
        let mut books = self.books.write().await;
        let book = books.rows.get_mut(&id).ok_or(AppError::NotFound)?;
        patch.apply_to(book);
        Ok(book.clone())
    }

    async fn delete_book(&self, id: i64) -> AppResult<()> {
        let mut books = self.books.write().await;
        books.rows.remove(&id).map(|_| ()).ok_or(AppError::NotFound)
    }

    async fn list_books(&self, query: &ListQuery) -> AppResult<(Vec<Book>, u64)> {
        let books = self.books.read().await;
        let mut matching: Vec<&Book> = books.rows.values().filter(|b| query.matches(b)).collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }
}
