//! Crate-wide error types and `Result` alias.

// crates.io
use http::StatusCode;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the helpdesk auth crate.
///
/// Expected failure modes (bad tokens, unreachable IdP, unmapped tenants, denied actions) have
/// dedicated variants; the transparent variants cover unexpected faults and surface as 500.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] config::ConfigError),
	#[error(transparent)]
	Join(#[from] tokio::task::JoinError),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Authentication failed.")]
	AuthenticationFailed,
	#[error("Authorization denied: {reason}")]
	AuthorizationDenied { reason: String },
	#[error("Configuration invalid for {field}: {reason}")]
	Configuration { field: &'static str, reason: String },
	#[error("{resource} already exists.")]
	Conflict { resource: String },
	#[error("Dependency {dependency} unavailable: {reason}")]
	DependencyUnavailable { dependency: &'static str, reason: String },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: StatusCode, url: url::Url, body: Option<String> },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("{resource} not found.")]
	NotFound { resource: String },
	#[error(transparent)]
	TenantResolution(#[from] TenantResolutionError),
}
impl Error {
	/// Transport status the request boundary answers with.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
			Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
			Self::Conflict { .. } => StatusCode::CONFLICT,
			Self::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			Self::NotFound { .. } => StatusCode::NOT_FOUND,
			Self::TenantResolution(err) => err.status(),
			Self::Config(_)
			| Self::Configuration { .. }
			| Self::HttpStatus { .. }
			| Self::Join(_)
			| Self::Metrics(_)
			| Self::Reqwest(_)
			| Self::Serde(_)
			| Self::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Message safe to hand back to a client.
	///
	/// Authentication failures are deliberately undifferentiated and internal faults never leak
	/// their detail; both are only visible in server-side logs.
	pub fn client_message(&self) -> String {
		match self {
			Self::AuthenticationFailed => "Invalid credentials or token could not be verified.".into(),
			Self::AuthorizationDenied { reason } => reason.clone(),
			Self::Conflict { .. } | Self::NotFound { .. } | Self::TenantResolution(_) =>
				self.to_string(),
			Self::DependencyUnavailable { .. } =>
				"Identity provider is temporarily unavailable.".into(),
			_ => "Internal server error.".into(),
		}
	}

	/// Whether this error is an unexpected fault rather than a tagged outcome.
	pub fn is_internal(&self) -> bool {
		self.status() == StatusCode::INTERNAL_SERVER_ERROR
	}

	/// Collapse transport-level failures talking to the IdP into `DependencyUnavailable`.
	///
	/// Malformed payloads and configuration problems pass through untouched.
	pub fn into_dependency(self, dependency: &'static str) -> Self {
		match self {
			Self::Reqwest(err) => Self::DependencyUnavailable { dependency, reason: err.to_string() },
			Self::HttpStatus { status, url, .. } => Self::DependencyUnavailable {
				dependency,
				reason: format!("Upstream {url} answered with {status}."),
			},
			other => other,
		}
	}
}

/// Failures mapping a caller's IdP groups onto a tenant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TenantResolutionError {
	/// No IdP group carries the given full path.
	#[error("No tenant group matches path '{path}'.")]
	GroupNotFound {
		/// Normalized group path that was searched.
		path: String,
	},
	/// The caller belongs to no tenant group at all.
	#[error("Account is not assigned to any tenant group.")]
	NoTenantGroup,
	/// The caller belongs to several tenants and did not name one.
	#[error("Account belongs to {candidates} tenants; a tenant must be specified.")]
	AmbiguousTenant {
		/// Number of tenants the caller resolved to.
		candidates: usize,
	},
	/// The IdP group exists but no local tenant is linked to it.
	#[error("No local tenant is linked to IdP group {group_id}.")]
	TenantNotProvisioned {
		/// External group identifier.
		group_id: uuid::Uuid,
	},
}
impl TenantResolutionError {
	/// Transport status for a resolution failure on a mutating operation.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::NoTenantGroup => StatusCode::FORBIDDEN,
			_ => StatusCode::BAD_REQUEST,
		}
	}
}
