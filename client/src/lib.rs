//! # Mirror Client
//!
//! HTTP plumbing for [`mirror_engine`]: a `reqwest`-backed [`Transport`]
//! implementation plus environment-driven configuration.
//!
//! [`Transport`]: mirror_engine::Transport

pub mod config;
pub mod error;
pub mod transport;

pub use config::{Config, ConfigError};
pub use error::{ClientError, Result};
pub use transport::HttpTransport;

use mirror_engine::Collection;
use std::sync::Arc;

/// Build a collection for the configured resource, backed by HTTP.
pub fn connect(config: &Config) -> Result<Collection> {
    let transport = HttpTransport::from_config(config)?;
    Ok(Collection::builder()
        .url(config.resource.clone())
        .pagination(config.pagination())
        .transport(Arc::new(transport))
        .build())
}
