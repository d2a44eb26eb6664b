//! Request boundary: bearer extraction, tenant scoping, and transport error mapping.
//!
//! [`Authenticator`] ties the verifier, the tenant resolver, and the local tenant directory
//! together for a service's request handlers. Framework glue stays outside this crate; handlers
//! pass in an [`http::HeaderMap`] and turn errors into responses with [`error_response`].

// crates.io
use http::{
	HeaderMap, HeaderValue, Response, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
};
// self
use crate::{
	_prelude::*,
	authz::{self, Action, AuthorizationContext, ListFilter, ResourceRef},
	claims::{Role, TokenClaims},
	config::IdpConfig,
	error::TenantResolutionError,
	security::{self, INTERNAL_SECRET_HEADER},
	tenant::{TenantDirectory, TenantId, TenantResolver},
	verifier::TokenVerifier,
};

/// How tenant resolution failures affect an operation.
///
/// With both flags set, a failure to resolve any of the caller's groups aborts a create, while a
/// list simply drops the unresolved groups and may come back empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TenantScopePolicy {
	/// Any resolution failure on a create is an error.
	pub fail_closed_on_create: bool,
	/// Resolution failures on a list are dropped from the caller's tenant set.
	pub fail_open_on_list: bool,
}
impl Default for TenantScopePolicy {
	fn default() -> Self {
		Self { fail_closed_on_create: true, fail_open_on_list: true }
	}
}

/// Extract the bearer token from an `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
	let value = headers
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.ok_or(Error::AuthenticationFailed)?;
	let (scheme, token) = value.split_once(' ').ok_or(Error::AuthenticationFailed)?;
	let token = token.trim();

	if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
		return Err(Error::AuthenticationFailed);
	}

	Ok(token)
}

/// Check the shared secret on a service-to-service call.
pub fn verify_internal_call(config: &IdpConfig, headers: &HeaderMap) -> Result<()> {
	security::verify_internal_secret(
		config.internal_service_secret.as_ref().map(|secret| secret.expose()),
		headers.get(INTERNAL_SECRET_HEADER).and_then(|value| value.to_str().ok()),
	)
}

/// Build the response for a failed request.
///
/// Unexpected faults are logged in full and answered with a generic body; authentication failures
/// carry `WWW-Authenticate: Bearer`.
pub fn error_response(err: &Error) -> Response<String> {
	let status = err.status();

	if err.is_internal() {
		tracing::error!(error = %err, "request failed with an internal error");
	} else if status == StatusCode::SERVICE_UNAVAILABLE {
		tracing::warn!(error = %err, "request failed on an unavailable dependency");
	}

	let body = serde_json::json!({ "detail": err.client_message() }).to_string();
	let mut response = Response::new(body);

	*response.status_mut() = status;
	response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

	if status == StatusCode::UNAUTHORIZED {
		response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
	}

	response
}

/// Authenticates requests and scopes them to the caller's tenants.
#[derive(Clone, Debug)]
pub struct Authenticator {
	verifier: TokenVerifier,
	resolver: TenantResolver,
	directory: Arc<dyn TenantDirectory>,
	policy: TenantScopePolicy,
}
impl Authenticator {
	/// Create an authenticator with the default [`TenantScopePolicy`].
	pub fn new(
		verifier: TokenVerifier,
		resolver: TenantResolver,
		directory: Arc<dyn TenantDirectory>,
	) -> Self {
		Self { verifier, resolver, directory, policy: TenantScopePolicy::default() }
	}

	/// Replace the tenant scope policy.
	pub fn with_policy(mut self, policy: TenantScopePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Verify the request's bearer token.
	pub async fn authenticate(&self, headers: &HeaderMap) -> Result<TokenClaims> {
		let token = bearer_token(headers)?;

		self.verifier.verify(token).await
	}

	/// Decide `action` for the caller, returning the tenant the action applies to.
	#[tracing::instrument(skip(self, claims, resource), fields(subject = %claims.subject))]
	pub async fn authorize(
		&self,
		claims: &TokenClaims,
		action: Action,
		resource: Option<ResourceRef>,
		tenant_override: Option<TenantId>,
	) -> Result<Option<TenantId>> {
		let tenants = match Scoping::of(claims, action, tenant_override) {
			Scoping::Skip => Vec::new(),
			Scoping::BestEffort => self.resolve_tenants(claims, action, resolution_failure).await?,
			Scoping::Policy => self.caller_tenants(claims, action).await?,
		};
		let ctx = AuthorizationContext {
			roles: claims.roles.clone(),
			subject: claims.subject,
			tenants,
			action,
			resource,
			tenant_override,
		};

		authz::decide(&ctx).into_result()
	}

	/// Row filter for a list operation by the caller.
	#[tracing::instrument(skip(self, claims), fields(subject = %claims.subject))]
	pub async fn list_scope(&self, claims: &TokenClaims) -> Result<ListFilter> {
		let tenants = if claims.has_role(Role::GeneralAdmin) {
			Vec::new()
		} else {
			self.caller_tenants(claims, Action::List).await?
		};
		let ctx = AuthorizationContext::new(claims.roles.clone(), claims.subject, tenants, Action::List);

		Ok(authz::list_filter(&ctx))
	}

	/// Resolve every tenant group of the caller to a local tenant, applying the scope policy.
	pub async fn caller_tenants(&self, claims: &TokenClaims, action: Action) -> Result<Vec<TenantId>> {
		self.resolve_tenants(claims, action, |err| self.tolerates(action, err)).await
	}

	async fn resolve_tenants(
		&self,
		claims: &TokenClaims,
		action: Action,
		tolerate: impl Fn(&Error) -> bool,
	) -> Result<Vec<TenantId>> {
		let mut tenants = Vec::with_capacity(claims.tenant_groups.len());

		for path in &claims.tenant_groups {
			match self.tenant_for_path(path).await {
				Ok(tenant) =>
					if !tenants.contains(&tenant) {
						tenants.push(tenant);
					},
				Err(err) if tolerate(&err) => {
					tracing::warn!(%path, %action, error = %err, "dropping unresolved tenant group");
				},
				Err(err) => return Err(err),
			}
		}

		Ok(tenants)
	}

	/// Resolve one group path to the local tenant linked to it.
	pub async fn tenant_for_path(&self, path: &str) -> Result<TenantId> {
		let group = self.resolver.resolve(path).await?;
		let tenant = self
			.directory
			.lookup_tenant_by_external_group_id(group)
			.await?
			.ok_or(TenantResolutionError::TenantNotProvisioned { group_id: group.0 })?;

		Ok(tenant.id)
	}

	fn tolerates(&self, action: Action, err: &Error) -> bool {
		match action {
			Action::Create => !self.policy.fail_closed_on_create && resolution_failure(err),
			Action::List => self.policy.fail_open_on_list && resolution_failure(err),
			// A group that no longer maps simply grants nothing; an outage still surfaces.
			_ => matches!(err, Error::TenantResolution(_)),
		}
	}
}

/// How much tenant resolution a decision needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scoping {
	/// The decision never reads the caller's tenants.
	Skip,
	/// Tenants only refine the decision; unresolved groups are dropped.
	BestEffort,
	/// Resolution failures follow the [`TenantScopePolicy`].
	Policy,
}
impl Scoping {
	fn of(claims: &TokenClaims, action: Action, tenant_override: Option<TenantId>) -> Self {
		if claims.has_role(Role::GeneralAdmin) {
			match (action, tenant_override) {
				(Action::Create, None) => Self::BestEffort,
				_ => Self::Skip,
			}
		} else if claims.has_role(Role::CustomerUser) && action != Action::Create {
			// Customers are scoped by creator outside of creates.
			Self::Skip
		} else {
			Self::Policy
		}
	}
}

fn resolution_failure(err: &Error) -> bool {
	matches!(err, Error::TenantResolution(_) | Error::DependencyUnavailable { .. })
}
