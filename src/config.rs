//! Service configuration - read once at startup and passed down by value.
//!
//! Every setting comes from `HIVEGATE_*` environment variables (optionally
//! seeded from a `.env` file). There are no ambient globals; the rest of the
//! crate receives this struct or a piece of it.

use axum::http::{HeaderName, HeaderValue, Method};
use std::env;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("env file {path}: {source}")]
    EnvFile {
        path: String,
        source: std::io::Error,
    },
}

/// Operator channel settings: bot credentials plus the recipient identity.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

/// Either everything (`*`) or an explicit comma-separated allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessList {
    Any,
    List(Vec<String>),
}

impl AccessList {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return AccessList::Any;
        }
        AccessList::List(
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn is_any(&self) -> bool {
        matches!(self, AccessList::Any)
    }
}

/// Cross-origin access parameters for the broadcast and realtime routes.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub allow_origin: AccessList,
    pub allow_methods: AccessList,
    pub allow_headers: AccessList,
    pub allow_credentials: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allow_origin: AccessList::Any,
            allow_methods: AccessList::Any,
            allow_headers: AccessList::Any,
            allow_credentials: false,
        }
    }
}

/// Immutable service configuration. Higher layers construct this once.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub operator: OperatorConfig,
    pub access: AccessConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = optional("HIVEGATE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = required("HIVEGATE_PORT")?
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid {
                key: "HIVEGATE_PORT",
                reason: e.to_string(),
            })?;

        let bot_token = required("HIVEGATE_BOT_TOKEN")?;
        let chat_id = required("HIVEGATE_CHAT_ID")?
            .parse::<i64>()
            .map_err(|e| ConfigError::Invalid {
                key: "HIVEGATE_CHAT_ID",
                reason: e.to_string(),
            })?;

        let access = access_from_env()?;

        Ok(Self {
            host,
            port,
            operator: OperatorConfig { bot_token, chat_id },
            access,
        })
    }

    /// Host + port string used both for binding and in notification text.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn access_from_env() -> Result<AccessConfig, ConfigError> {
    let allow_origin = AccessList::parse(&optional("HIVEGATE_ACCESS_ORIGIN").unwrap_or_default());
    let allow_methods = AccessList::parse(&optional("HIVEGATE_ACCESS_METHOD").unwrap_or_default());
    let allow_headers = AccessList::parse(&optional("HIVEGATE_ACCESS_HEADER").unwrap_or_default());
    let allow_credentials = match optional("HIVEGATE_ACCESS_CREDENTIAL").as_deref() {
        None => false,
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        Some(other) => {
            return Err(ConfigError::Invalid {
                key: "HIVEGATE_ACCESS_CREDENTIAL",
                reason: format!("expected true/false, got {other:?}"),
            })
        }
    };

    // tower-http panics on wildcard origin combined with credentials; reject
    // the combination at load time instead.
    if allow_credentials && allow_origin.is_any() {
        return Err(ConfigError::Invalid {
            key: "HIVEGATE_ACCESS_CREDENTIAL",
            reason: "credentials require an explicit HIVEGATE_ACCESS_ORIGIN list".into(),
        });
    }

    if let AccessList::List(origins) = &allow_origin {
        for o in origins {
            o.parse::<HeaderValue>().map_err(|_| ConfigError::Invalid {
                key: "HIVEGATE_ACCESS_ORIGIN",
                reason: format!("not a valid origin value: {o:?}"),
            })?;
        }
    }
    if let AccessList::List(methods) = &allow_methods {
        for m in methods {
            m.parse::<Method>().map_err(|_| ConfigError::Invalid {
                key: "HIVEGATE_ACCESS_METHOD",
                reason: format!("not a valid method: {m:?}"),
            })?;
        }
    }
    if let AccessList::List(headers) = &allow_headers {
        for h in headers {
            h.parse::<HeaderName>().map_err(|_| ConfigError::Invalid {
                key: "HIVEGATE_ACCESS_HEADER",
                reason: format!("not a valid header name: {h:?}"),
            })?;
        }
    }

    Ok(AccessConfig {
        allow_origin,
        allow_methods,
        allow_headers,
        allow_credentials,
    })
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Load KEY=value pairs from an env file into the process environment.
/// Existing variables win. A missing default `.env` is fine; an explicitly
/// requested file that cannot be read is a configuration error.
pub fn load_env_file(path: Option<&str>) -> Result<(), ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p, true),
        None => (".env", false),
    };
    if !explicit && !Path::new(path).exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::EnvFile {
        path: path.to_string(),
        source: e,
    })?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key.trim()).is_err() {
                env::set_var(key.trim(), value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_list_wildcard() {
        assert_eq!(AccessList::parse("*"), AccessList::Any);
        assert_eq!(AccessList::parse(""), AccessList::Any);
        assert_eq!(AccessList::parse("  * "), AccessList::Any);
    }

    #[test]
    fn access_list_explicit() {
        let list = AccessList::parse("https://a.example, https://b.example");
        assert_eq!(
            list,
            AccessList::List(vec![
                "https://a.example".into(),
                "https://b.example".into()
            ])
        );
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = ServiceConfig {
            host: "127.0.0.1".into(),
            port: 9000,
            operator: OperatorConfig {
                bot_token: "t".into(),
                chat_id: 1,
            },
            access: AccessConfig::default(),
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    }
}
