use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::Internal(anyhow::anyhow!("unknown role {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Availability of a catalog entry. The Spanish names are accepted on input for
/// older clients; output is always English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    #[serde(alias = "disponible")]
    Available,
    #[serde(alias = "reservado")]
    Reserved,
}

impl BookStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" | "disponible" => Ok(Self::Available),
            "reserved" | "reservado" => Ok(Self::Reserved),
            other => Err(AppError::Validation(format!("invalid status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub status: BookStatus,
}

/// Token payload shared by the issuer, the access gate and the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CreateBookRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub status: Option<BookStatus>,
}

/// A book that passed creation checks and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub status: BookStatus,
}

impl TryFrom<CreateBookRequest> for NewBook {
    type Error = AppError;

    fn try_from(req: CreateBookRequest) -> Result<Self, Self::Error> {
        let title = req.title.as_deref().map(str::trim).unwrap_or_default();
        let author = req.author.as_deref().map(str::trim).unwrap_or_default();
        let year = req.year.unwrap_or(0);

        if title.is_empty() || author.is_empty() || year == 0 {
            return Err(AppError::Validation(
                "title, author and year are required".into(),
            ));
        }

        Ok(Self {
            title: title.to_owned(),
            author: author.to_owned(),
            year,
            status: req.status.unwrap_or_default(),
        })
    }
}

/// Partial update body. Absent fields keep their stored value; unknown fields
/// (including `id`) are ignored.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookStatus>,
}

impl BookPatch {
    /// Trims provided text fields and rejects values that would blank out a
    /// required attribute.
    ///
    /// # Errors
    /// Returns a validation error for an empty title/author or a zero year.
    pub fn normalized(self) -> Result<Self, AppError> {
        let title = self.title.map(|t| t.trim().to_owned());
        let author = self.author.map(|a| a.trim().to_owned());

        if title.as_deref().is_some_and(str::is_empty)
            || author.as_deref().is_some_and(str::is_empty)
            || self.year == Some(0)
        {
            return Err(AppError::Validation(
                "title, author and year cannot be blank".into(),
            ));
        }

        Ok(Self {
            title,
            author,
            year: self.year,
            status: self.status,
        })
    }

    pub fn apply_to(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(year) = self.year {
            book.year = year;
        }
        if let Some(status) = self.status {
            book.status = status;
        }
    }
}

/// Raw listing parameters as they arrive on the query string.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}
