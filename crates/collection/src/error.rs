/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Collection errors.
///
/// Every error is local to one collection key and is reported to that collection's
/// subscribers only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The connection failed a fetch or subscription request.
	#[error(transparent)]
	Connection(#[from] hearth_connection::Error),
	/// The initial fetch did not resolve within the configured timeout.
	#[error("fetch for collection `{key}` timed out")]
	FetchTimeout {
		/// Collection key.
		key: String,
	},
	/// The key is already cached with a different snapshot type.
	#[error("collection `{key}` is cached with a different snapshot type")]
	KeyTypeMismatch {
		/// Collection key.
		key: String,
	},
	/// Every subscriber left before the collection became ready.
	#[error("collection `{key}` was torn down before it became ready")]
	Evicted {
		/// Collection key.
		key: String,
	},
	/// The initialization task stopped without publishing an outcome.
	#[error("initialization of collection `{key}` was aborted")]
	InitAborted {
		/// Collection key.
		key: String,
	},
	/// Collections can only be subscribed to from within a tokio runtime.
	#[error("no tokio runtime to initialize collections on")]
	NoRuntime,
	/// The configuration could not be parsed.
	#[error("invalid collection config: {0}")]
	Config(String),
}
