//! Bearer token verification against the cached signing keys.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
// self
use crate::{
	_prelude::*,
	cache::SigningKeyCache,
	claims::{RawClaims, TokenClaims},
	config::IdpConfig,
};

/// Validates RS256 bearer tokens and decodes them into [`TokenClaims`].
///
/// Every token defect collapses into [`Error::AuthenticationFailed`]; the specific cause is only
/// logged at debug level. A key set that cannot be fetched surfaces as
/// [`Error::DependencyUnavailable`] instead.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
	keys: SigningKeyCache,
	issuer: String,
	audience: String,
}
impl TokenVerifier {
	/// Create a verifier expecting the configured issuer and audience.
	pub fn new(config: &IdpConfig, keys: SigningKeyCache) -> Self {
		Self { keys, issuer: config.issuer().to_owned(), audience: config.audience.clone() }
	}

	/// Signing key cache backing this verifier.
	pub fn keys(&self) -> &SigningKeyCache {
		&self.keys
	}

	/// Verify `token` and return its claims.
	#[tracing::instrument(skip_all)]
	pub async fn verify(&self, token: &str) -> Result<TokenClaims> {
		let header = decode_header(token).map_err(|err| reject("malformed header", err))?;
		let Some(kid) = header.kid else {
			return Err(reject("missing kid", "token header carries no key id"));
		};
		let keys = self.keys.get_keys().await?;
		let Some(jwk) = keys.find(&kid) else {
			return Err(reject("unknown kid", kid));
		};
		let key = DecodingKey::from_jwk(jwk).map_err(|err| reject("unusable jwk", err))?;
		let data = decode::<RawClaims>(token, &key, &self.validation())
			.map_err(|err| reject("validation failed", err))?;
		let claims = TokenClaims::try_from(data.claims)?;

		tracing::debug!(subject = %claims.subject, roles = ?claims.raw_roles, "token verified");

		Ok(claims)
	}

	fn validation(&self) -> Validation {
		let mut validation = Validation::new(Algorithm::RS256);

		validation.set_issuer(&[&self.issuer]);
		validation.set_audience(&[&self.audience]);
		validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
		validation.leeway = 0;

		validation
	}
}

fn reject(stage: &'static str, detail: impl std::fmt::Display) -> Error {
	tracing::debug!(stage, %detail, "token rejected");

	Error::AuthenticationFailed
}
