use axum::http::HeaderValue;
use proctor_core::RelayConfig;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http_interface::RouterOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the caller-facing HTTP surface (default: 127.0.0.1:3000).
    pub bind_addr: SocketAddr,
    /// Recognition backend base address (default: http://127.0.0.1:8000).
    pub backend_url: Url,
    /// Upper bound on one backend exchange. Never zero.
    pub backend_timeout: Duration,
    pub backend_connect_timeout: Duration,
    /// Extra attempts for verify on transport failure (enroll is never retried).
    pub verify_retries: u32,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
    /// Single allowed CORS origin; `None` allows any origin.
    pub cors_origin: Option<HeaderValue>,
}

impl Config {
    /// Load configuration from `PROCTOR_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(var("PROCTOR_BIND_ADDR"), "PROCTOR_BIND_ADDR", || {
            SocketAddr::from(([127, 0, 0, 1], 3000))
        })?;

        let backend_url = var("PROCTOR_BACKEND_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
        let backend_url = Url::parse(&backend_url).map_err(|e| ConfigError::Invalid {
            var: "PROCTOR_BACKEND_URL",
            reason: e.to_string(),
        })?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                var: "PROCTOR_BACKEND_URL",
                reason: format!("unsupported scheme {:?}", backend_url.scheme()),
            });
        }

        let timeout_secs: u64 = parse_or(
            var("PROCTOR_BACKEND_TIMEOUT_SECS"),
            "PROCTOR_BACKEND_TIMEOUT_SECS",
            || 30,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "PROCTOR_BACKEND_TIMEOUT_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let connect_secs: u64 = parse_or(
            var("PROCTOR_BACKEND_CONNECT_TIMEOUT_SECS"),
            "PROCTOR_BACKEND_CONNECT_TIMEOUT_SECS",
            || 5,
        )?;

        let cors_origin = var("PROCTOR_CORS_ORIGIN")
            .map(|origin| match origin.trim() {
                "*" => Err(ConfigError::Invalid {
                    var: "PROCTOR_CORS_ORIGIN",
                    reason: "leave unset to allow any origin".into(),
                }),
                origin => HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                    var: "PROCTOR_CORS_ORIGIN",
                    reason: e.to_string(),
                }),
            })
            .transpose()?;

        Ok(Self {
            bind_addr,
            backend_url,
            backend_timeout: Duration::from_secs(timeout_secs),
            backend_connect_timeout: Duration::from_secs(connect_secs.clamp(1, timeout_secs)),
            verify_retries: parse_or(var("PROCTOR_VERIFY_RETRIES"), "PROCTOR_VERIFY_RETRIES", || 0)?,
            max_upload_bytes: parse_or(
                var("PROCTOR_MAX_UPLOAD_BYTES"),
                "PROCTOR_MAX_UPLOAD_BYTES",
                || 10 * 1024 * 1024,
            )?,
            cors_origin,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            base_url: self.backend_url.clone(),
            timeout: self.backend_timeout,
            connect_timeout: self.backend_connect_timeout,
            verify_retries: self.verify_retries,
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            max_upload_bytes: self.max_upload_bytes,
            cors_origin: self.cors_origin.clone(),
        }
    }
}

/// Parse a set variable, or fall back to `default` when unset. A set but
/// unparsable value is an error rather than a silent default.
fn parse_or<T>(
    raw: Option<String>,
    var: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(cfg.backend_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(cfg.backend_timeout, Duration::from_secs(30));
        assert_eq!(cfg.backend_connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.verify_retries, 0);
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
        assert!(cfg.cors_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = load(&[
            ("PROCTOR_BIND_ADDR", "0.0.0.0:8080"),
            ("PROCTOR_BACKEND_URL", "http://recognizer.internal:9000/v1"),
            ("PROCTOR_BACKEND_TIMEOUT_SECS", "12"),
            ("PROCTOR_VERIFY_RETRIES", "2"),
            ("PROCTOR_MAX_UPLOAD_BYTES", "2048"),
            ("PROCTOR_CORS_ORIGIN", "http://localhost:3000"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.backend_url.host_str(), Some("recognizer.internal"));
        assert_eq!(cfg.backend_timeout, Duration::from_secs(12));
        assert_eq!(cfg.verify_retries, 2);
        assert_eq!(cfg.max_upload_bytes, 2048);
        assert_eq!(cfg.cors_origin.unwrap(), "http://localhost:3000");

        let relay = load(&[("PROCTOR_BACKEND_TIMEOUT_SECS", "3")]).unwrap().relay_config();
        assert_eq!(relay.timeout, Duration::from_secs(3));
        // Connect timeout never exceeds the total timeout.
        assert_eq!(relay.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let cfg = load(&[("PROCTOR_BACKEND_URL", "  "), ("PROCTOR_VERIFY_RETRIES", "")]).unwrap();
        assert_eq!(cfg.backend_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(cfg.verify_retries, 0);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = load(&[("PROCTOR_BACKEND_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("PROCTOR_BACKEND_TIMEOUT_SECS"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("PROCTOR_BACKEND_URL", "not a url")]).is_err());
        assert!(load(&[("PROCTOR_BACKEND_URL", "ftp://backend")]).is_err());
        assert!(load(&[("PROCTOR_BIND_ADDR", "localhost")]).is_err());
        assert!(load(&[("PROCTOR_VERIFY_RETRIES", "-1")]).is_err());
        assert!(load(&[("PROCTOR_CORS_ORIGIN", "*")]).is_err());
    }
}
