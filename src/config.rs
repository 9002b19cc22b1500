use crate::category::CategoryPolicy;
use crate::loader::DEFAULT_MAX_CELLS;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/api/auth/google/callback";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Everything the server reads from its environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub classifier: ClassifierConfig,
    pub oauth: Option<OAuthConfig>,
    /// Target spreadsheet; export is disabled without it.
    pub spreadsheet_id: Option<String>,
    pub basic_auth: Option<BasicAuthConfig>,
    pub snapshot_dir: Option<PathBuf>,
    /// Sessions idle this long leave memory (their snapshot remains).
    pub session_idle_secs: u64,
    pub max_upload_bytes: usize,
    /// Uploads whose range spans more cells than this yield an empty table.
    pub max_extract_cells: usize,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Upper bound on classification requests in flight at once.
    pub max_in_flight: usize,
    pub timeout_secs: u64,
    pub policy: CategoryPolicy,
}

#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub refresh_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicAuthConfig {
    pub user: String,
    pub pass: String,
}

impl Config {
    /// Reads the process environment after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr: SocketAddr = parse_or("BIND_ADDR", get("BIND_ADDR"), || {
            DEFAULT_BIND_ADDR.parse().ok()
        })?;

        let classifier = ClassifierConfig {
            api_key: get("GEMINI_API_KEY"),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            endpoint: get("GEMINI_ENDPOINT").unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            max_in_flight: parse_or("CLASSIFIER_MAX_IN_FLIGHT", get("CLASSIFIER_MAX_IN_FLIGHT"), || {
                Some(DEFAULT_MAX_IN_FLIGHT)
            })?
            .max(1),
            timeout_secs: parse_or("CLASSIFIER_TIMEOUT_SECS", get("CLASSIFIER_TIMEOUT_SECS"), || {
                Some(DEFAULT_TIMEOUT_SECS)
            })?,
            policy: parse_or("CATEGORY_POLICY", get("CATEGORY_POLICY"), || {
                Some(CategoryPolicy::default())
            })?,
        };

        let oauth = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_uri: get("GOOGLE_REDIRECT_URI")
                    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
                refresh_token: get("GOOGLE_REFRESH_TOKEN"),
            }),
            _ => None,
        };

        let basic_auth = match (get("BASIC_AUTH_USER"), get("BASIC_AUTH_PASS")) {
            (Some(user), Some(pass)) => Some(BasicAuthConfig { user, pass }),
            _ => None,
        };

        Ok(Config {
            bind_addr,
            classifier,
            oauth,
            spreadsheet_id: get("GOOGLE_SHEET_ID"),
            basic_auth,
            snapshot_dir: get("SNAPSHOT_DIR").map(PathBuf::from),
            session_idle_secs: parse_or("SESSION_IDLE_SECS", get("SESSION_IDLE_SECS"), || {
                Some(DEFAULT_SESSION_IDLE_SECS)
            })?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), || {
                Some(DEFAULT_MAX_UPLOAD_BYTES)
            })?,
            max_extract_cells: parse_or("MAX_EXTRACT_CELLS", get("MAX_EXTRACT_CELLS"), || {
                Some(DEFAULT_MAX_CELLS)
            })?,
        })
    }
}

fn parse_or<T, D>(key: &'static str, value: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    D: FnOnce() -> Option<T>,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => default().ok_or(ConfigError::Invalid {
            key,
            value: String::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_on_empty_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.classifier.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.classifier.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.classifier.policy, CategoryPolicy::Trust);
        assert!(config.classifier.api_key.is_none());
        assert!(config.oauth.is_none());
        assert!(config.basic_auth.is_none());
        assert!(config.snapshot_dir.is_none());
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.session_idle_secs, DEFAULT_SESSION_IDLE_SECS);
        assert_eq!(config.max_extract_cells, DEFAULT_MAX_CELLS);
    }

    #[test]
    fn reads_session_and_extraction_limits() {
        let config = config_from(&[
            ("SESSION_IDLE_SECS", "90"),
            ("MAX_EXTRACT_CELLS", "5000"),
        ])
        .unwrap();
        assert_eq!(config.session_idle_secs, 90);
        assert_eq!(config.max_extract_cells, 5000);
        assert!(config_from(&[("MAX_EXTRACT_CELLS", "-1")]).is_err());
    }

    #[test]
    fn reads_google_and_auth_settings() {
        let config = config_from(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REFRESH_TOKEN", "refresh"),
            ("GOOGLE_SHEET_ID", "sheet-123"),
            ("BASIC_AUTH_USER", "admin"),
            ("BASIC_AUTH_PASS", "hunter2"),
            ("CATEGORY_POLICY", "enforce"),
            ("CLASSIFIER_MAX_IN_FLIGHT", "0"),
        ])
        .unwrap();

        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.client_id, "id");
        assert_eq!(oauth.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(oauth.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.spreadsheet_id.as_deref(), Some("sheet-123"));
        assert_eq!(
            config.basic_auth,
            Some(BasicAuthConfig {
                user: "admin".to_string(),
                pass: "hunter2".to_string()
            })
        );
        assert_eq!(config.classifier.policy, CategoryPolicy::Enforce);
        assert_eq!(config.classifier.max_in_flight, 1);
    }

    #[test]
    fn basic_auth_needs_both_halves() {
        let config = config_from(&[("BASIC_AUTH_USER", "admin"), ("BASIC_AUTH_PASS", " ")]).unwrap();
        assert!(config.basic_auth.is_none());
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config_from(&[("CLASSIFIER_MAX_IN_FLIGHT", "lots")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "CLASSIFIER_MAX_IN_FLIGHT",
                value: "lots".to_string()
            }
        );
        assert!(config_from(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config_from(&[("CATEGORY_POLICY", "strict")]).is_err());
    }
}
