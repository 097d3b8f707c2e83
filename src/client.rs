//! Typed client for the REST surface and the list view state a UI keeps
//! between fetches.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    errors::ErrorBody,
    models::{
        Book, BookPatch, BookStatus, Claims, CreateBookRequest, ListParams, LoginRequest, Page,
        RegisterRequest, Role, TokenResponse, UserResponse,
    },
    query::{DEFAULT_LIMIT, DEFAULT_PAGE},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {message}")]
    Api { status: StatusCode, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http,
            base_url,
            token: None,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// Forget the held token. The server keeps honoring it until it expires.
    pub fn logout(&mut self) {
        self.token = None;
    }

    /// Whether a token is held and its `exp` lies in the future. The signature is not checked.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.claims()
            .is_some_and(|c| Utc::now().timestamp() < c.exp)
    }

    /// Email and role carried by the held token.
    #[must_use]
    pub fn current_user(&self) -> Option<(String, Role)> {
        self.claims().map(|c| (c.email, c.role))
    }

    fn claims(&self) -> Option<Claims> {
        let token = self.token.as_deref()?;
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(res: Response) -> ClientResult<Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = match res.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_owned(),
        };
        Err(ClientError::Api { status, message })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let res = self.authorized(req).send().await?;
        Ok(Self::check(res).await?.json::<T>().await?)
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn register(&self, email: &str, password: &str) -> ClientResult<UserResponse> {
        let body = RegisterRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        self.send_json(self.http.post(self.url("/api/auth/register")).json(&body))
            .await
    }

    /// Log in and hold the returned token for later requests.
    ///
    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<String> {
        let body = LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let res: TokenResponse = self
            .send_json(self.http.post(self.url("/api/auth/login")).json(&body))
            .await?;
        self.token = Some(res.token.clone());
        Ok(res.token)
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn list_books(&self, params: &ListParams) -> ClientResult<Page<Book>> {
        self.send_json(self.http.get(self.url("/api/books")).query(params))
            .await
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn get_book(&self, id: i64) -> ClientResult<Book> {
        self.send_json(self.http.get(self.url(&format!("/api/books/{id}"))))
            .await
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn create_book(&self, book: &CreateBookRequest) -> ClientResult<Book> {
        self.send_json(self.http.post(self.url("/api/books")).json(book))
            .await
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn update_book(&self, id: i64, patch: &BookPatch) -> ClientResult<Book> {
        self.send_json(self.http.put(self.url(&format!("/api/books/{id}"))).json(patch))
            .await
    }

    /// # Errors
    /// Returns transport errors or the API's error message.
    pub async fn delete_book(&self, id: i64) -> ClientResult<()> {
        let req = self.http.delete(self.url(&format!("/api/books/{id}")));
        let res = self.authorized(req).send().await?;
        Self::check(res).await?;
        Ok(())
    }
}

/// Book list state: current filters plus the last page received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookListView {
    pub page: u32,
    pub limit: u32,
    pub q: String,
    pub status: Option<BookStatus>,
    pub sort: String,
    pub items: Vec<Book>,
    pub total: u64,
    pub pages: u64,
}

impl Default for BookListView {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            q: String::new(),
            status: None,
            sort: "year,-title".to_owned(),
            items: Vec::new(),
            total: 0,
            pages: 0,
        }
    }
}

impl BookListView {
    #[must_use]
    pub fn params(&self) -> ListParams {
        ListParams {
            page: Some(self.page.to_string()),
            limit: Some(self.limit.to_string()),
            q: Some(self.q.clone()).filter(|q| !q.is_empty()),
            status: self.status.map(|s| s.as_str().to_owned()),
            sort: Some(self.sort.clone()).filter(|s| !s.is_empty()),
        }
    }

    /// Adopt a page returned by the server.
    pub fn apply(&mut self, page: Page<Book>) {
        self.items = page.items;
        self.page = page.page;
        self.limit = page.limit;
        self.total = page.total;
        self.pages = page.pages;
    }

    /// Fetch the page described by the current state.
    ///
    /// # Errors
    /// Returns the client error; state is left unchanged.
    pub async fn refresh(&mut self, client: &ApiClient) -> ClientResult<()> {
        let page = client.list_books(&self.params()).await?;
        self.apply(page);
        Ok(())
    }

    pub fn search(&mut self, q: impl Into<String>) {
        self.q = q.into();
        self.page = 1;
    }

    pub fn filter_status(&mut self, status: Option<BookStatus>) {
        self.status = status;
        self.page = 1;
    }

    pub fn change_limit(&mut self, limit: u32) {
        self.limit = limit;
        self.page = 1;
    }

    /// Advance one page; returns false when already on the last page.
    pub fn next_page(&mut self) -> bool {
        if u64::from(self.page) < self.pages {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Go back one page; returns false when already on the first page.
    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Toggle the direction of `field` if it is already sorted on, otherwise
    /// make it the primary key.
    pub fn sort_by(&mut self, field: &str) {
        let mut parts: Vec<String> = self
            .sort
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();

        match parts
            .iter_mut()
            .find(|p| p.trim_start_matches('-') == field)
        {
            Some(part) if part.starts_with('-') => *part = field.to_owned(),
            Some(part) => *part = format!("-{field}"),
            None => parts.insert(0, field.to_owned()),
        }

        self.sort = parts.join(",");
        self.page = 1;
    }

    /// Delete a book, then refetch whether or not the delete succeeded.
    ///
    /// # Errors
    /// Returns the delete error if it failed, otherwise any refresh error.
    pub async fn delete(&mut self, client: &ApiClient, id: i64) -> ClientResult<()> {
        let deleted = client.delete_book(id).await;
        let refreshed = self.refresh(client).await;
        deleted.and(refreshed)
    }
}
