//! Transport and service-to-service guards.
//!
//! # Threat Model
//! Outbound IdP traffic must not be downgraded to plain HTTP outside local development, and the
//! shared secret that services exchange on internal calls must be compared without leaking its
//! length or prefix through timing.

// crates.io
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;
// self
use crate::_prelude::*;

/// Header carrying the shared secret on service-to-service calls.
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(field: &'static str, url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Configuration { field, reason: format!("Upstream URL {url} must use HTTPS.") })
	}
}

/// Validate the shared secret presented by another helpdesk service.
///
/// An unconfigured secret is a server fault, a missing header is an authentication failure, and a
/// wrong value is a denial.
pub fn verify_internal_secret(expected: Option<&str>, presented: Option<&str>) -> Result<()> {
	let Some(expected) = expected.filter(|value| !value.is_empty()) else {
		tracing::error!("internal service secret is not configured");

		return Err(Error::Configuration {
			field: "internal_service_secret",
			reason: "Secret is not configured.".into(),
		});
	};
	let Some(presented) = presented else {
		tracing::warn!("internal call without {INTERNAL_SECRET_HEADER} header");

		return Err(Error::AuthenticationFailed);
	};

	let expected = Sha256::digest(expected);
	let presented = Sha256::digest(presented);

	if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
		Ok(())
	} else {
		tracing::warn!("internal call presented an invalid secret");

		Err(Error::AuthorizationDenied { reason: "Invalid internal service secret.".into() })
	}
}
