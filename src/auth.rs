//! Token authentication.
//!
//! Clients send `Authorization: Token <key>` (or `Bearer <key>`). Keys map to
//! a username and a role through the configured token table. Handlers take a
//! [`Caller`] argument; extracting it authenticates, authorizes and throttles
//! the request before the handler body runs.

use crate::config::{Role, TokenGrant};
use crate::error::{ApiError, Error, Result};
use crate::state::AppState;
use actix_web::{dev::Payload, http::Method, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use std::collections::HashMap;
use std::sync::Arc;

const NOT_PROVIDED: &str = "Authentication credentials were not provided.";
const NO_CREDENTIALS: &str = "Invalid token header. No credentials provided.";
const INVALID_TOKEN: &str = "Invalid token.";
const NOT_ALLOWED: &str = "You do not have permission to perform this action.";

/// The authenticated user behind a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub role: Role,
}

impl Caller {
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` for read-only callers.
    pub fn require_write(&self) -> Result<()> {
        match self.role {
            Role::ReadWrite => Ok(()),
            Role::ReadOnly => Err(Error::PermissionDenied(NOT_ALLOWED.to_string())),
        }
    }
}

/// Resolves `Authorization` headers against the token table.
#[derive(Clone, Debug, Default)]
pub struct Authenticator {
    tokens: Arc<HashMap<String, TokenGrant>>,
}

impl Authenticator {
    pub fn new(tokens: HashMap<String, TokenGrant>) -> Self {
        Authenticator {
            tokens: Arc::new(tokens),
        }
    }

    /// # Errors
    ///
    /// Returns `Error::Unauthorized` when the header is missing, malformed or
    /// names an unknown key.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Caller> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Unauthorized(NOT_PROVIDED.to_string()))?;

        let mut parts = header.split_whitespace();
        let scheme = parts.next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
            return Err(Error::Unauthorized(NOT_PROVIDED.to_string()));
        }
        let key = match (parts.next(), parts.next()) {
            (Some(key), None) => key,
            _ => return Err(Error::Unauthorized(NO_CREDENTIALS.to_string())),
        };

        self.tokens
            .get(key)
            .map(|grant| Caller {
                username: grant.username.clone(),
                role: grant.role,
            })
            .ok_or_else(|| Error::Unauthorized(INVALID_TOKEN.to_string()))
    }
}

/// Methods that modify records.
pub fn is_write(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let outcome = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state.admit(req),
            None => Err(ApiError::internal("application state is not configured")),
        };
        ready(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        let mut tokens = HashMap::new();
        tokens.insert(
            "abc123".to_string(),
            TokenGrant {
                username: "alice".to_string(),
                role: Role::ReadWrite,
            },
        );
        tokens.insert(
            "ro456".to_string(),
            TokenGrant {
                username: "bob".to_string(),
                role: Role::ReadOnly,
            },
        );
        Authenticator::new(tokens)
    }

    #[test]
    fn test_token_and_bearer_schemes() {
        let auth = authenticator();
        let caller = auth.authenticate(Some("Token abc123")).unwrap();
        assert_eq!(caller.username, "alice");
        assert_eq!(auth.authenticate(Some("bearer abc123")).unwrap(), caller);
    }

    #[test]
    fn test_rejections() {
        let auth = authenticator();
        for header in [None, Some(""), Some("Basic abc123")] {
            assert!(matches!(
                auth.authenticate(header),
                Err(Error::Unauthorized(ref m)) if m == NOT_PROVIDED
            ));
        }
        assert!(matches!(
            auth.authenticate(Some("Token")),
            Err(Error::Unauthorized(ref m)) if m == NO_CREDENTIALS
        ));
        assert!(matches!(
            auth.authenticate(Some("Token nope")),
            Err(Error::Unauthorized(ref m)) if m == INVALID_TOKEN
        ));
    }

    #[test]
    fn test_read_only_cannot_write() {
        let auth = authenticator();
        let reader = auth.authenticate(Some("Token ro456")).unwrap();
        assert!(matches!(
            reader.require_write(),
            Err(Error::PermissionDenied(_))
        ));
        assert!(auth
            .authenticate(Some("Token abc123"))
            .unwrap()
            .require_write()
            .is_ok());
    }

    #[test]
    fn test_write_methods() {
        assert!(is_write(&Method::POST));
        assert!(is_write(&Method::DELETE));
        assert!(!is_write(&Method::GET));
    }
}
