use axum::http::{HeaderMap, header::USER_AGENT};
use compliance::{
    ClientInfo,
    utils::{first_forwarded, is_valid_id},
};

use crate::{
    caller::{Caller, Role},
    error::AppError::{self, InvalidIdentifier, MalformedHeader, MissingCaller},
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value.to_str().map(Some).map_err(|_| MalformedHeader(name)),
    }
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let user_id = header(headers, USER_ID_HEADER)?
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(MissingCaller)?;

    if !is_valid_id(user_id) {
        return Err(MalformedHeader(USER_ID_HEADER));
    }

    let role = match header(headers, USER_ROLE_HEADER)? {
        None => Role::Employee,
        Some(raw) => Role::parse(raw).ok_or(MalformedHeader(USER_ROLE_HEADER))?,
    };

    Ok(Caller {
        user_id: user_id.to_string(),
        role,
    })
}

/// Unreadable values are dropped rather than rejected; they only feed record metadata.
pub fn client_info_from_headers(headers: &HeaderMap) -> ClientInfo {
    let text = |name: &'static str| headers.get(name).and_then(|value| value.to_str().ok());

    let ip_address = text(FORWARDED_FOR_HEADER)
        .and_then(first_forwarded)
        .or_else(|| text(REAL_IP_HEADER).map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|agent| !agent.is_empty());

    ClientInfo {
        ip_address,
        user_agent,
    }
}

pub fn validate_id(id: &str) -> Result<(), AppError> {
    if is_valid_id(id) { Ok(()) } else { Err(InvalidIdentifier) }
}
