//! Identity provider settings and derived endpoints.
//!
//! Settings are read from `HELPDESK_`-prefixed environment variables; the OIDC and admin endpoints
//! are derived from the issuer URL, which must have the `{base}/realms/{realm}` shape.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use config::{Config, Environment, Map};
use serde::Deserialize;
use url::Url;
// self
use crate::{_prelude::*, security};

/// Prefix shared by every environment variable the crate reads.
pub const ENV_PREFIX: &str = "HELPDESK";
/// Default timeout applied to every outbound IdP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_HTTP_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// A secret value whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wrap a secret value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Reveal the secret for use on the wire.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str("Secret(***)")
	}
}

/// Settings describing the IdP realm the services trust.
#[derive(Clone, Debug, Deserialize)]
pub struct IdpConfig {
	/// Issuer URL expected in the `iss` claim, e.g. `https://idp.example.com/realms/helpdesk`.
	pub issuer_url: Url,
	/// Audience the tokens must be minted for.
	pub audience: String,
	/// Override for the JWKS endpoint; derived from the issuer when absent.
	#[serde(default)]
	pub jwks_url: Option<Url>,
	/// Client id used for the client-credentials grant against the admin API.
	#[serde(default)]
	pub admin_client_id: Option<String>,
	/// Client secret paired with `admin_client_id`.
	#[serde(default)]
	pub admin_client_secret: Option<Secret>,
	/// Shared secret presented by other helpdesk services on internal calls.
	#[serde(default)]
	pub internal_service_secret: Option<Secret>,
	/// Per-call timeout for outbound IdP requests, in milliseconds.
	#[serde(default = "default_http_timeout_ms")]
	pub http_timeout_ms: u64,
	/// Whether IdP endpoints must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
}
impl IdpConfig {
	/// Construct settings with defaults for everything but issuer and audience.
	pub fn new(issuer_url: impl AsRef<str>, audience: impl Into<String>) -> Result<Self> {
		Ok(Self {
			issuer_url: Url::parse(issuer_url.as_ref())?,
			audience: audience.into(),
			jwks_url: None,
			admin_client_id: None,
			admin_client_secret: None,
			internal_service_secret: None,
			http_timeout_ms: default_http_timeout_ms(),
			require_https: true,
		})
	}

	/// Load and validate settings from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_environment(Environment::with_prefix(ENV_PREFIX))
	}

	/// Load and validate settings from an explicit variable map instead of the process
	/// environment.
	pub fn from_env_map<I, K, V>(vars: I) -> Result<Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let source: Map<String, String> =
			vars.into_iter().map(|(key, value)| (key.into(), value.into())).collect();

		Self::from_environment(Environment::with_prefix(ENV_PREFIX).source(Some(source)))
	}

	fn from_environment(environment: Environment) -> Result<Self> {
		let config: Self = Config::builder()
			.add_source(environment.try_parsing(true))
			.build()?
			.try_deserialize()?;

		config.validate()?;

		tracing::info!(
			issuer = %config.issuer_url,
			audience = %config.audience,
			admin_client = config.admin_client_id.is_some(),
			internal_secret = config.internal_service_secret.is_some(),
			"identity provider settings loaded"
		);

		Ok(config)
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Attach the administrative client credentials.
	pub fn with_admin_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.admin_client_id = Some(client_id.into());
		self.admin_client_secret = Some(Secret::new(client_secret));

		self
	}

	/// Attach the shared secret for service-to-service calls.
	pub fn with_internal_service_secret(mut self, secret: impl Into<String>) -> Self {
		self.internal_service_secret = Some(Secret::new(secret));

		self
	}

	/// Override the per-call outbound timeout.
	pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Validate the settings against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		self.realm_parts()?;

		if self.audience.trim().is_empty() {
			return Err(Error::Configuration {
				field: "audience",
				reason: "Must not be empty.".into(),
			});
		}
		if self.require_https {
			security::enforce_https("issuer_url", &self.issuer_url)?;

			if let Some(jwks_url) = &self.jwks_url {
				security::enforce_https("jwks_url", jwks_url)?;
			}
		}

		let timeout = self.http_timeout();

		if !(MIN_HTTP_TIMEOUT..=MAX_HTTP_TIMEOUT).contains(&timeout) {
			return Err(Error::Configuration {
				field: "http_timeout_ms",
				reason: format!("Must be between {MIN_HTTP_TIMEOUT:?} and {MAX_HTTP_TIMEOUT:?}."),
			});
		}
		if self.admin_client_id.is_some() != self.admin_client_secret.is_some() {
			return Err(Error::Configuration {
				field: "admin_client_secret",
				reason: "Admin client id and secret must be configured together.".into(),
			});
		}

		Ok(())
	}

	/// Per-call timeout for outbound IdP requests.
	pub fn http_timeout(&self) -> Duration {
		Duration::from_millis(self.http_timeout_ms)
	}

	/// Issuer string exactly as it must appear in the `iss` claim.
	pub fn issuer(&self) -> &str {
		self.issuer_url.as_str().trim_end_matches('/')
	}

	/// Realm name taken from the issuer URL.
	pub fn realm(&self) -> Result<&str> {
		self.realm_parts().map(|(_, realm)| realm)
	}

	/// Published JWKS endpoint.
	pub fn jwks_endpoint(&self) -> Result<Url> {
		match &self.jwks_url {
			Some(url) => Ok(url.clone()),
			None => Ok(Url::parse(&format!("{}/protocol/openid-connect/certs", self.issuer()))?),
		}
	}

	/// Token endpoint used for the client-credentials grant.
	pub fn token_endpoint(&self) -> Result<Url> {
		Ok(Url::parse(&format!("{}/protocol/openid-connect/token", self.issuer()))?)
	}

	/// Base URL of the realm's administrative REST API.
	pub fn admin_realm_url(&self) -> Result<Url> {
		let (base, realm) = self.realm_parts()?;

		Ok(Url::parse(&format!("{base}/admin/realms/{realm}"))?)
	}

	fn realm_parts(&self) -> Result<(&str, &str)> {
		let issuer = self.issuer();

		match issuer.rsplit_once("/realms/") {
			Some((base, realm)) if !base.is_empty() && !realm.is_empty() && !realm.contains('/') =>
				Ok((base, realm)),
			_ => Err(Error::Configuration {
				field: "issuer_url",
				reason: format!("Expected '{{base}}/realms/{{realm}}', got '{issuer}'."),
			}),
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_http_timeout_ms() -> u64 {
	u64::try_from(DEFAULT_HTTP_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
