//! Adapters to services outside the crate.

pub mod ned_client;
pub mod redshift_cache;

pub use ned_client::NedClient;
pub use redshift_cache::CachedResolver;

use std::time::Duration;
use tracing::info;

use crate::config::{RedshiftConfig, RedshiftSource};
use crate::error::{LogalError, Result};
use crate::pipeline::ingestion::redshift::{NoRedshifts, RedshiftResolver, StaticRedshifts};

/// Build the redshift resolver the configuration asks for
pub fn redshift_resolver(config: &RedshiftConfig) -> Result<Box<dyn RedshiftResolver>> {
    match config.source {
        RedshiftSource::Ned => {
            let client = NedClient::new(&config.ned_url, Duration::from_secs(config.timeout_seconds))?;
            let cached = CachedResolver::open(client, &config.cache, Duration::from_millis(config.delay_ms))?;
            info!("Redshifts from NED ({}), cached in {}", config.ned_url, config.cache.display());
            Ok(Box::new(cached))
        }
        RedshiftSource::File => {
            let path = config
                .file
                .as_ref()
                .ok_or_else(|| LogalError::Config("redshift.source = \"file\" needs redshift.file".to_string()))?;
            let table = StaticRedshifts::from_file(path)?;
            info!("Redshifts from {} ({} names)", path.display(), table.len());
            Ok(Box::new(table))
        }
        RedshiftSource::None => {
            info!("Redshift lookups disabled");
            Ok(Box::new(NoRedshifts))
        }
    }
}
