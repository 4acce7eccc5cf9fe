//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration shared by every collection of a [`CollectionCache`](crate::CollectionCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
	/// Timeout for a collection fetch, in seconds. `0` waits forever.
	#[serde(default = "default_fetch_timeout")]
	pub fetch_timeout_secs: u64,
}

/// Returns the default fetch timeout in seconds.
fn default_fetch_timeout() -> u64 {
	30
}

impl Default for CollectionConfig {
	fn default() -> Self {
		Self {
			fetch_timeout_secs: default_fetch_timeout(),
		}
	}
}

impl CollectionConfig {
	/// Parses a configuration from TOML.
	pub fn from_toml_str(source: &str) -> Result<Self> {
		toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
	}

	/// Set the fetch timeout in seconds.
	pub fn fetch_timeout(mut self, secs: u64) -> Self {
		self.fetch_timeout_secs = secs;
		self
	}

	/// Returns the fetch timeout, or `None` when fetches may wait forever.
	pub fn fetch_timeout_duration(&self) -> Option<Duration> {
		(self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
	}
}
