//! Shared authentication and authorization layer for the helpdesk services.
//!
//! Verifies IdP-issued bearer tokens against a cached signing key set, maps the caller's IdP
//! groups onto local tenants, and decides whether a role may perform an action on a resource.
//! The IdP admin API client and tenant provisioning live alongside, sharing one admin token cache.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod admin;
pub mod authz;
pub mod boundary;
pub mod cache;
pub mod claims;
pub mod clock;
pub mod config;
pub mod http;
pub mod idp;
pub mod metrics;
pub mod security;
pub mod tenant;
pub mod verifier;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	admin::{AdminApi, TenantProvisioner},
	authz::{Action, AuthorizationContext, Decision, DenyReason, ListFilter, ResourceRef},
	boundary::{Authenticator, TenantScopePolicy},
	cache::{AdminCredentialCache, SigningKeyCache},
	claims::{Role, RoleSet, TokenClaims},
	config::IdpConfig,
	error::{Error, Result, TenantResolutionError},
	idp::{IdentityProvider, KeycloakClient},
	tenant::{GroupId, Tenant, TenantDirectory, TenantId, TenantResolver},
	verifier::TokenVerifier,
};
