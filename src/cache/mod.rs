mod client;
mod ops;

use anyhow::Result;

pub use client::CacheClient;

use crate::config::CacheSettings;

/// Cache handle: the Redis client plus the configured key layout.
///
/// Cheap to clone; every pipeline component that touches the cache holds
/// one of these.
#[derive(Clone)]
pub struct Cache {
    pub client: CacheClient,
    pub(crate) settings: CacheSettings,
}

impl Cache {
    pub async fn connect(settings: CacheSettings) -> Result<Self> {
        let client = CacheClient::connect(&settings).await?;
        Ok(Self { client, settings })
    }
}
