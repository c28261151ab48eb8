//! Shared application state handed to every handler as `web::Data`.

use crate::audit::AuditLog;
use crate::auth::{is_write, Authenticator, Caller};
use crate::backend::InMemoryBackend;
use crate::config::Settings;
use crate::error::{ApiError, Error, Result};
use crate::observability::TtlPolicy;
use crate::repository::Store;
use crate::service::ResponseCache;
use crate::throttle::RateLimiter;
use actix_web::{http::header, HttpRequest};
use std::time::Instant;

/// Services shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cache: ResponseCache<InMemoryBackend>,
    pub audit: AuditLog,
    pub auth: Authenticator,
    pub limiter: RateLimiter,
    pub settings: Settings,
}

impl AppState {
    pub fn new(store: Store, settings: Settings) -> Self {
        AppState {
            cache: ResponseCache::new(
                InMemoryBackend::new(),
                TtlPolicy::from_setting(settings.cache_ttl),
            ),
            audit: AuditLog::new(),
            auth: Authenticator::new(settings.tokens.clone()),
            limiter: RateLimiter::new(vec![settings.burst_rate, settings.sustained_rate]),
            store,
            settings,
        }
    }

    /// Authenticate, authorize and throttle a request.
    pub fn admit(&self, req: &HttpRequest) -> std::result::Result<Caller, ApiError> {
        let credentials = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let caller = self.auth.authenticate(credentials).map_err(|e| {
            self.audit
                .log_security("NotAuthenticated", "anonymous", &e.to_string());
            self.reject(e, None)
        })?;

        if is_write(req.method()) {
            caller.require_write().map_err(|e| {
                self.audit
                    .log_security("PermissionDenied", &caller.username, &e.to_string());
                self.reject(e, Some(&caller.username))
            })?;
        }

        self.limiter.check(&caller.username).map_err(|e| {
            self.audit
                .log_security("Throttled", &caller.username, &e.to_string());
            self.reject(e, Some(&caller.username))
        })?;

        Ok(caller)
    }

    /// Log a failure and convert it to the HTTP error shape.
    pub fn reject(&self, err: Error, user: Option<&str>) -> ApiError {
        self.audit.log_error(err.kind(), &err.to_string(), user);
        err.into_api_error(self.settings.debug)
    }

    /// Record timing for `operation` and convert a failure.
    pub fn finish<T>(
        &self,
        operation: &str,
        caller: &Caller,
        started: Instant,
        outcome: Result<T>,
    ) -> std::result::Result<T, ApiError> {
        self.audit.log_performance(operation, started.elapsed());
        outcome.map_err(|e| self.reject(e, Some(&caller.username)))
    }
}
