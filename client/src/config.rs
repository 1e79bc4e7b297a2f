//! Configuration management for the client.

use mirror_engine::Pagination;
use std::env;
use std::time::Duration;
use url::Url;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Server root every request URL is resolved against
    pub base_url: Url,
    /// Collection path, relative to the base URL
    pub resource: String,
    /// Records per page; the server default when unset
    pub page_size: Option<u64>,
    /// Page size query parameter; `None` disables it
    pub page_size_param: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Stop after this many pages
    pub max_pages: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup("MIRROR_BASE_URL").ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = Url::parse(&raw).map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;

        let resource = lookup("MIRROR_RESOURCE").unwrap_or_else(|| "/".to_string());

        let page_size = parse_number(&lookup, "MIRROR_PAGE_SIZE")?;

        let page_size_param = match lookup("MIRROR_PAGE_SIZE_PARAM") {
            Some(param) if param.trim().is_empty() => None,
            Some(param) => Some(param),
            None => Pagination::default().page_size_param,
        };

        let timeout = parse_number(&lookup, "MIRROR_TIMEOUT_SECS")?.unwrap_or(30);

        let max_pages = parse_number(&lookup, "MIRROR_MAX_PAGES")?;

        Ok(Self {
            base_url,
            resource,
            page_size,
            page_size_param,
            timeout: Duration::from_secs(timeout),
            max_pages,
        })
    }

    /// Pagination settings for the configured resource.
    pub fn pagination(&self) -> Pagination {
        let mut pagination = Pagination {
            page_size_param: self.page_size_param.clone(),
            ..Pagination::default()
        };
        match self.page_size {
            Some(size) => pagination.page_size = size,
            // Leave the page size to the server.
            None => pagination.page_size_param = None,
        }
        pagination
    }
}

fn parse_number<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MIRROR_BASE_URL environment variable is required")]
    MissingBaseUrl,

    #[error("Invalid MIRROR_BASE_URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid {var} value: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("MIRROR_BASE_URL", "http://localhost:8000")]))
            .unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.resource, "/");
        assert_eq!(config.page_size, None);
        assert_eq!(config.page_size_param.as_deref(), Some("page_size"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_pages, None);
        assert_eq!(config.pagination().page_size_param(), None);
    }

    #[test]
    fn all_values() {
        let config = Config::from_lookup(lookup(&[
            ("MIRROR_BASE_URL", "https://api.example.com/v1/"),
            ("MIRROR_RESOURCE", "items"),
            ("MIRROR_PAGE_SIZE", "50"),
            ("MIRROR_PAGE_SIZE_PARAM", "limit"),
            ("MIRROR_TIMEOUT_SECS", " 5 "),
            ("MIRROR_MAX_PAGES", "3"),
        ]))
        .unwrap();
        assert_eq!(config.resource, "items");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_pages, Some(3));

        let pagination = config.pagination();
        assert_eq!(pagination.page_size, 50);
        assert_eq!(pagination.page_size_param(), Some("limit"));
    }

    #[test]
    fn empty_page_size_param_disables_it() {
        let config = Config::from_lookup(lookup(&[
            ("MIRROR_BASE_URL", "http://localhost"),
            ("MIRROR_PAGE_SIZE", "10"),
            ("MIRROR_PAGE_SIZE_PARAM", ""),
        ]))
        .unwrap();
        assert_eq!(config.page_size_param, None);
        assert_eq!(config.pagination().page_size_param(), None);
    }

    #[test]
    fn missing_base_url() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl));
    }

    #[test]
    fn invalid_values() {
        let err = Config::from_lookup(lookup(&[("MIRROR_BASE_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));

        let err = Config::from_lookup(lookup(&[
            ("MIRROR_BASE_URL", "http://localhost"),
            ("MIRROR_PAGE_SIZE", "ten"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid MIRROR_PAGE_SIZE value: ten");
    }
}
