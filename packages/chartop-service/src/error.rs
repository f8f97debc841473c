use serde_json::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure surfaced to callers. Only the message of a variant is ever shown to a client;
/// the source of an [`Error::Upstream`] is for logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String, data: Option<Value> },
	#[error("{message}")]
	Upstream {
		message: String,
		#[source]
		source: UpstreamFault,
	},
}
impl Error {
	pub fn status_code(&self) -> u16 {
		match self {
			Self::InvalidRequest { .. } => 400,
			Self::NotFound { .. } => 404,
			Self::Upstream { .. } => 500,
		}
	}

	pub fn public_message(&self) -> &str {
		match self {
			Self::InvalidRequest { message }
			| Self::NotFound { message, .. }
			| Self::Upstream { message, .. } => message,
		}
	}

	pub fn data(&self) -> Option<&Value> {
		match self {
			Self::NotFound { data, .. } => data.as_ref(),
			_ => None,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamFault {
	#[error(transparent)]
	Storage(#[from] chartop_storage::Error),
	#[error("Malformed metric payload: {0}")]
	Decode(#[from] serde_json::Error),
}

/// Wraps a storage or assembly failure into the operation's generic error, logging the cause.
pub(crate) fn upstream(
	operation: &'static str,
	message: &'static str,
	fault: impl Into<UpstreamFault>,
) -> Error {
	let source = fault.into();

	tracing::error!(operation, error = %source, "{message}");

	Error::Upstream { message: message.to_string(), source }
}

pub(crate) fn invalid_request(message: impl Into<String>) -> Error {
	Error::InvalidRequest { message: message.into() }
}
