//! # Callers
//!
//! Identity is established by the authenticating proxy in front of this service, which
//! forwards it as headers:
//!
//! - `X-User-Id`: the authenticated user
//! - `X-User-Role`: `admin` or `employee`
//!
//! Admins read policies all the time while authoring them, so their activity is never
//! tracked. [`is_tracked`] is the only place that decision is made.
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, utils::caller_from_headers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "employee" | "user" => Some(Role::Employee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() { Ok(()) } else { Err(AppError::Forbidden) }
    }

    /// Admins may read anyone, everyone else only themselves.
    pub fn may_read_user(&self, user_id: &str) -> bool {
        self.is_admin() || self.user_id == user_id
    }
}

pub fn is_tracked(caller: &Caller) -> bool {
    caller.role != Role::Admin
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
    }
}
