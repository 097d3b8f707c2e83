use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    Extension, Json,
    extract::{
        ConnectInfo, FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    AppState, auth,
    errors::{AppError, AppResult},
    models::{
        Book, BookPatch, Claims, CreateBookRequest, ListParams, LoginRequest, NewBook, Page,
        RegisterRequest, TokenResponse, UserResponse,
    },
    openapi,
    query::ListQuery,
    utils::issue_token,
};

/// Peer address of the connection. Absent when the service is driven without
/// connect info, e.g. in-process.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

/// Health check endpoint.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn health_check() -> &'static str { "OK" }

#[allow(clippy::unused_async)]
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "book catalog API is running" }))
}

#[allow(clippy::unused_async)]
pub async fn openapi_document() -> Json<Value> {
    Json(openapi::document())
}

/// Register a new user.
///
/// # Errors
/// Returns validation errors, duplicate email, hashing errors, or database errors.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(payload) = payload?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = auth::register(state.users.as_ref(), &payload.email, &payload.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

/// Authenticate a user and return a session token.
///
/// # Errors
/// Returns validation, throttling, invalid credentials, or database errors.
pub async fn login(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Json(payload) = payload?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // Charged to the caller's address, not to the account being tried.
    let key = client.map_or_else(|| "unknown".to_owned(), |ip| ip.to_string());
    if state.login_limiter.check_key(&key).is_err() {
        tracing::warn!(client = %key, email = %payload.email, "login throttled");
        return Err(AppError::TooManyRequests);
    }

    let user = auth::authenticate(state.users.as_ref(), &payload.email, &payload.password).await?;
    let token = issue_token(&user, &state.config)?;
    Ok(Json(TokenResponse { token }))
}

/// List books with filtering, sorting and pagination.
///
/// # Errors
/// Returns validation errors for bad parameters, `InvalidSortField`, or database errors.
pub async fn list_books(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Json<Page<Book>>> {
    let Query(params) = params?;
    let query = ListQuery::build(&params)?;
    let (items, total) = state.books.list_books(&query).await?;

    Ok(Json(Page {
        items,
        page: query.page,
        limit: query.limit,
        total,
        pages: query.pages(total),
    }))
}

/// Get a single book by id.
///
/// # Errors
/// Returns not found or database errors.
pub async fn get_book(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Book>> {
    let Path(id) = id?;
    Ok(Json(state.books.get_book(id).await?))
}

/// Create a new book.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let Json(payload) = payload?;
    let new_book = NewBook::try_from(payload)?;

    let book = state.books.create_book(new_book).await?;
    tracing::info!(book_id = book.id, title = %book.title, actor = claims.sub, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Apply a partial update to a book.
///
/// # Errors
/// Returns validation, not found or database errors.
pub async fn update_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BookPatch>, JsonRejection>,
) -> AppResult<Json<Book>> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let patch = patch.normalized()?;

    let book = state.books.update_book(id, patch).await?;
    tracing::info!(book_id = id, actor = claims.sub, "book updated");
    Ok(Json(book))
}

/// Delete a book.
///
/// # Errors
/// Returns not found or database errors.
pub async fn delete_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    state.books.delete_book(id).await?;
    tracing::info!(book_id = id, actor = claims.sub, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}
