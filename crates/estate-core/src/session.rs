//! Session context: auth token, login and the role derived from the token.
//!
//! A [`Session`] is an explicit value handed to whatever needs credentials.
//! Nothing here talks to the network; token claims are read locally and the
//! signature is not verified (the backend re-checks every request).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::Role;

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl Claims {
    /// Role claim, if present and recognized.
    pub fn role(&self) -> Option<Role> {
        match self.extra.get(defaults::ROLE_CLAIM)? {
            JsonValue::String(s) => Role::from_claim(s),
            JsonValue::Array(values) => values
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(Role::from_claim)
                .min_by_key(|r| match r {
                    Role::Admin => 0,
                    Role::User => 1,
                }),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// True when `now` is at or past the expiry claim. Tokens without `exp` never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }
}

/// Decode the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(Error::Decode("Token must have three segments".to_string())),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Decode(format!("Token payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Decode(format!("Token payload is not JSON claims: {}", e)))
}

/// Authenticated (or anonymous) client session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    login: Option<String>,
}

impl Session {
    /// Anonymous session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            login: Some(login.into()),
        }
    }

    /// Session from a token alone; the login is taken from the `sub` claim when readable.
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let login = decode_claims(&token).ok().and_then(|c| c.sub);
        Self {
            token: Some(token),
            login,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Role derived from the token at the current time.
    pub fn role(&self) -> Role {
        self.role_at(Utc::now())
    }

    /// Role derived from the token at `now`.
    ///
    /// Missing, malformed or expired tokens yield the least-privilege role.
    pub fn role_at(&self, now: DateTime<Utc>) -> Role {
        let Some(token) = self.token.as_deref() else {
            return Role::least_privilege();
        };
        match decode_claims(token) {
            Ok(claims) if claims.is_expired_at(now) => {
                warn!(subsystem = "session", "Token expired, using least-privilege role");
                Role::least_privilege()
            }
            Ok(claims) => claims.role().unwrap_or_else(Role::least_privilege),
            Err(e) => {
                warn!(subsystem = "session", error = %e, "Token unreadable, using least-privilege role");
                Role::least_privilege()
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    /// Whether the token's expiry claim lies at or before `now`.
    ///
    /// Unreadable tokens count as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token.as_deref().map(decode_claims) {
            Some(Ok(claims)) => claims.is_expired_at(now),
            Some(Err(_)) => true,
            None => false,
        }
    }

    /// Admins may modify any row; other users only their own.
    pub fn can_modify(&self, owner_username: &str) -> bool {
        self.is_admin() || self.login.as_deref() == Some(owner_username)
    }

    /// Logged-out session. The current value is left untouched.
    pub fn reset(&self) -> Session {
        Session::default()
    }
}
