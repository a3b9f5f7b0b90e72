//! Per-connection identity, supplied to the pumps before any frame moves.
//!
//! The login flow (out of scope here) leaves an `auth` cookie whose value
//! is base64-encoded JSON user data. We decode it without verifying it;
//! visitors without a usable cookie get a generated guest identity so the
//! inbound pump always has a non-empty name to stamp.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use serde_json::Value;

const AUTH_COOKIE: &str = "auth";

/// Profile data for one participant: a free-form string-to-value map with
/// at least a `name`, optionally `email` and `avatar_url`.
#[derive(Debug, Clone)]
pub struct UserData(HashMap<String, Value>);

impl UserData {
    pub fn from_map(map: HashMap<String, Value>) -> Self {
        Self(map)
    }

    /// A guest identity with a generated display name.
    pub fn guest() -> Self {
        let petname = petname::petname(2, "-").unwrap_or_else(|| "guest".to_string());
        let name = format!("{}-{}", petname, rand::rng().random_range(100..1000));
        let mut map = HashMap::new();
        map.insert("name".to_string(), Value::String(name));
        Self(map)
    }

    /// The display name stamped onto every message this participant sends.
    pub fn name(&self) -> &str {
        self.str_field("name").unwrap_or("anonymous")
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Extract user data from the request's `auth` cookie, falling back to a
/// guest identity if the cookie is missing or unreadable.
pub fn user_data_from_headers(headers: &HeaderMap) -> UserData {
    match auth_cookie_value(headers).and_then(decode_user_data) {
        Some(data) if data.str_field("name").is_some() => data,
        Some(_) => {
            tracing::warn!("auth cookie has no name field, treating as guest");
            UserData::guest()
        }
        None => UserData::guest(),
    }
}

fn auth_cookie_value(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == AUTH_COOKIE).then_some(value)
    })
}

fn decode_user_data(value: &str) -> Option<UserData> {
    let bytes = STANDARD.decode(value).ok()?;
    match serde_json::from_slice::<HashMap<String, Value>>(&bytes) {
        Ok(map) => Some(UserData::from_map(map)),
        Err(e) => {
            tracing::debug!("failed to parse auth cookie payload: {}", e);
            None
        }
    }
}
