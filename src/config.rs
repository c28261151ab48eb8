//! Runtime configuration loaded from the environment.
//!
//! Every setting has a default so the service starts with an empty
//! environment. `dotenv` is applied by the binary before [`Settings::from_env`]
//! runs.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// A request budget: `count` requests per `period`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    pub count: u32,
    pub period: Duration,
}

impl Rate {
    pub fn new(count: u32, period: Duration) -> Self {
        Rate { count, period }
    }
}

impl FromStr for Rate {
    type Err = Error;

    /// Parse `<count>/<period>` where period starts with `s`, `m`, `h` or `d`
    /// (`60/min`, `1000/day`, `5/s`).
    fn from_str(s: &str) -> Result<Self> {
        let (count, period) = s
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("invalid rate `{}`", s)))?;
        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("invalid rate count in `{}`", s)))?;
        if count == 0 {
            return Err(Error::Config(format!("rate count must be positive in `{}`", s)));
        }
        let secs = match period.trim().chars().next() {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3600,
            Some('d') => 86_400,
            _ => return Err(Error::Config(format!("invalid rate period in `{}`", s))),
        };
        Ok(Rate::new(count, Duration::from_secs(secs)))
    }
}

/// What an authenticated caller may do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    ReadWrite,
    ReadOnly,
}

/// Identity bound to an API token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub username: String,
    pub role: Role,
}

/// Parse `key=user[:readonly],key2=user2` into a token table.
pub fn parse_tokens(raw: &str) -> Result<HashMap<String, TokenGrant>> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, grant) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("invalid token entry `{}`", entry)))?;
        let (username, role) = match grant.split_once(':') {
            Some((user, "readonly")) => (user, Role::ReadOnly),
            Some((user, "readwrite")) => (user, Role::ReadWrite),
            Some((_, other)) => {
                return Err(Error::Config(format!("unknown token role `{}`", other)))
            }
            None => (grant, Role::ReadWrite),
        };
        if key.is_empty() || username.is_empty() {
            return Err(Error::Config(format!("invalid token entry `{}`", entry)));
        }
        tokens.insert(
            key.to_string(),
            TokenGrant {
                username: username.to_string(),
                role,
            },
        );
    }
    Ok(tokens)
}

/// Service settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    /// Expose internal error details in 500 responses.
    pub debug: bool,
    pub max_bulk_size: usize,
    pub page_size: u64,
    pub max_page_size: u64,
    /// Response cache lifetime; `None` keeps entries until the next write.
    pub cache_ttl: Option<Duration>,
    pub burst_rate: Rate,
    pub sustained_rate: Rate,
    pub tokens: HashMap<String, TokenGrant>,
    pub log_level: log::LevelFilter,
    pub log_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite://residents.db".to_string(),
            db_max_connections: 5,
            host: "127.0.0.1".to_string(),
            port: 8080,
            debug: false,
            max_bulk_size: 100,
            page_size: 10,
            max_page_size: 100,
            cache_ttl: Some(Duration::from_secs(60 * 15)),
            burst_rate: Rate::new(60, Duration::from_secs(60)),
            sustained_rate: Rate::new(1000, Duration::from_secs(86_400)),
            tokens: HashMap::new(),
            log_level: log::LevelFilter::Info,
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup("DATABASE_URL") {
            settings.database_url = url;
        }
        if let Some(v) = lookup("DB_MAX_CONNECTIONS") {
            settings.db_max_connections = parse_var("DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(host) = lookup("SERVER_HOST") {
            settings.host = host;
        }
        if let Some(v) = lookup("SERVER_PORT") {
            settings.port = parse_var("SERVER_PORT", &v)?;
        }
        if let Some(v) = lookup("DEBUG") {
            settings.debug = parse_flag(&v);
        }
        if let Some(v) = lookup("MAX_BULK_SIZE") {
            settings.max_bulk_size = parse_var("MAX_BULK_SIZE", &v)?;
        }
        if let Some(v) = lookup("PAGE_SIZE") {
            settings.page_size = parse_var("PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("MAX_PAGE_SIZE") {
            settings.max_page_size = parse_var("MAX_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("CACHE_TTL_SECS") {
            let secs: u64 = parse_var("CACHE_TTL_SECS", &v)?;
            settings.cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = lookup("THROTTLE_BURST") {
            settings.burst_rate = v.parse()?;
        }
        if let Some(v) = lookup("THROTTLE_SUSTAINED") {
            settings.sustained_rate = v.parse()?;
        }
        if let Some(v) = lookup("API_TOKENS") {
            settings.tokens = parse_tokens(&v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            settings.log_level = parse_var("LOG_LEVEL", &v)?;
        }
        settings.log_file = lookup("LOG_FILE").filter(|f| !f.is_empty());

        if settings.page_size == 0 || settings.max_page_size < settings.page_size {
            return Err(Error::Config(
                "PAGE_SIZE must be positive and not exceed MAX_PAGE_SIZE".to_string(),
            ));
        }

        Ok(settings)
    }

    /// `host:port` the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: `{}`", name, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.max_bulk_size, 100);
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.max_page_size, 100);
        assert_eq!(settings.cache_ttl, Some(Duration::from_secs(900)));
        assert!(!settings.debug);
        assert_eq!(settings.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("MAX_BULK_SIZE", "2"),
            ("DEBUG", "true"),
            ("CACHE_TTL_SECS", "0"),
            ("THROTTLE_BURST", "5/s"),
            ("API_TOKENS", "abc=alice, def=bob:readonly"),
        ]))
        .unwrap();

        assert_eq!(settings.max_bulk_size, 2);
        assert!(settings.debug);
        assert_eq!(settings.cache_ttl, None);
        assert_eq!(settings.burst_rate, Rate::new(5, Duration::from_secs(1)));
        assert_eq!(settings.tokens["abc"].username, "alice");
        assert_eq!(settings.tokens["abc"].role, Role::ReadWrite);
        assert_eq!(settings.tokens["def"].role, Role::ReadOnly);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Settings::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Settings::from_lookup(lookup_from(&[("PAGE_SIZE", "500")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rate_parsing() {
        assert_eq!(
            "60/min".parse::<Rate>().unwrap(),
            Rate::new(60, Duration::from_secs(60))
        );
        assert_eq!(
            "1000/day".parse::<Rate>().unwrap(),
            Rate::new(1000, Duration::from_secs(86_400))
        );
        assert!("60".parse::<Rate>().is_err());
        assert!("x/min".parse::<Rate>().is_err());
        assert!("1/fortnight".parse::<Rate>().is_err());
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!("0/min".parse::<Rate>(), Err(Error::Config(_))));
        let err = Settings::from_lookup(lookup_from(&[("THROTTLE_BURST", "0/min")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_token_parsing_rejects_unknown_role() {
        assert!(parse_tokens("abc=alice:admin").is_err());
        assert!(parse_tokens("abc").is_err());
        assert!(parse_tokens("").unwrap().is_empty());
    }
}
