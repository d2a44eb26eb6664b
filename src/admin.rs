//! Administrative IdP operations and tenant provisioning.
//!
//! [`AdminApi`] wraps the realm's admin REST API (groups, users, memberships, realm roles) using
//! the shared [`AdminCredentialCache`]. Group renames and deletions drop the tenant resolver's
//! cached mapping for that group. [`TenantProvisioner`] creates a tenant on both sides: the IdP
//! group first, then the local record linked to it.

// std
use std::collections::BTreeSet;
// crates.io
use ::http::{StatusCode, header::LOCATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	cache::AdminCredentialCache,
	claims::{Role, TokenClaims},
	http,
	idp::{GroupRepresentation, KeycloakClient},
	tenant::{GroupId, Tenant, TenantDirectory, TenantResolver},
};

/// Page size used when listing users or groups.
pub const PAGE_SIZE: usize = 100;

const DEPENDENCY: &str = "admin_api";

/// User as exchanged with the admin API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
	/// IdP user id; absent on create.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<Uuid>,
	/// Login name.
	pub username: String,
	/// E-mail address.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Given name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub first_name: Option<String>,
	/// Family name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_name: Option<String>,
	/// Whether the account may log in.
	#[serde(default)]
	pub enabled: bool,
	/// Whether the e-mail address is verified.
	#[serde(default)]
	pub email_verified: bool,
}

/// Realm role as exchanged with the admin API.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRepresentation {
	/// Role id.
	pub id: String,
	/// Role name.
	pub name: String,
	/// Free-form description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Whether the role is composite.
	#[serde(default)]
	pub composite: bool,
	/// Whether the role belongs to a client rather than the realm.
	#[serde(default)]
	pub client_role: bool,
	/// Owning realm or client id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub container_id: Option<String>,
}

/// Client for the realm's administrative REST API.
#[derive(Clone, Debug)]
pub struct AdminApi {
	client: KeycloakClient,
	tokens: AdminCredentialCache,
	resolver: Option<TenantResolver>,
}
impl AdminApi {
	/// Create an admin client sharing `tokens` with the rest of the process.
	pub fn new(client: KeycloakClient, tokens: AdminCredentialCache) -> Self {
		Self { client, tokens, resolver: None }
	}

	/// Keep `resolver` consistent with group renames and deletions made through this client.
	pub fn with_resolver(mut self, resolver: TenantResolver) -> Self {
		self.resolver = Some(resolver);

		self
	}

	/// Create a top-level group; an existing group with that name is a [`Error::Conflict`].
	#[tracing::instrument(skip(self))]
	pub async fn create_group(&self, name: &str) -> Result<GroupId> {
		let request = self.request(Method::POST, &["groups"]).await?.json(&json!({ "name": name }));
		let response = self
			.execute(request)
			.await
			.map_err(|err| conflict_or_upstream(err, || format!("IdP group '{name}'")))?;
		let id = created_id(&response)?;

		tracing::info!(%id, "group created");

		Ok(GroupId(id))
	}

	/// Rename a group, keeping the rest of its representation.
	#[tracing::instrument(skip(self))]
	pub async fn rename_group(&self, id: GroupId, name: &str) -> Result<()> {
		let group = id.to_string();
		let request = self.request(Method::GET, &["groups", &group]).await?;
		let mut representation: Value = self
			.execute_json(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP group {id}")))?;

		representation["name"] = Value::from(name);

		let request = self.request(Method::PUT, &["groups", &group]).await?.json(&representation);

		self.execute(request).await.map_err(upstream)?;
		self.forget_group(id).await;

		tracing::info!("group renamed");

		Ok(())
	}

	/// Delete a group; returns whether it existed.
	#[tracing::instrument(skip(self))]
	pub async fn delete_group(&self, id: GroupId) -> Result<bool> {
		let request = self.request(Method::DELETE, &["groups", &id.to_string()]).await?;
		let existed = self.execute_optional(request).await?.is_some();

		self.forget_group(id).await;

		Ok(existed)
	}

	/// Every group in the realm, fetched page by page.
	pub async fn list_groups(&self) -> Result<Vec<GroupRepresentation>> {
		self.paginate(&["groups"], &[("briefRepresentation", "false")]).await
	}

	/// Create a user; an existing username or e-mail is a [`Error::Conflict`].
	#[tracing::instrument(skip(self, user), fields(username = %user.username))]
	pub async fn create_user(&self, user: &UserRepresentation) -> Result<Uuid> {
		let request = self.request(Method::POST, &["users"]).await?.json(user);
		let response = self
			.execute(request)
			.await
			.map_err(|err| conflict_or_upstream(err, || format!("IdP user '{}'", user.username)))?;
		let id = created_id(&response)?;

		tracing::info!(%id, "user created");

		Ok(id)
	}

	/// Fetch a user, `None` when it does not exist.
	pub async fn get_user(&self, id: Uuid) -> Result<Option<UserRepresentation>> {
		let request = self.request(Method::GET, &["users", &id.to_string()]).await?;

		match self.execute_optional(request).await? {
			Some(response) => Ok(Some(decode_body(response.bytes().await)?)),
			None => Ok(None),
		}
	}

	/// Replace a user's attributes.
	pub async fn update_user(&self, id: Uuid, user: &UserRepresentation) -> Result<()> {
		let request = self.request(Method::PUT, &["users", &id.to_string()]).await?.json(user);

		self.execute(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {id}")))?;

		Ok(())
	}

	/// Delete a user; returns whether it existed.
	pub async fn delete_user(&self, id: Uuid) -> Result<bool> {
		let request = self.request(Method::DELETE, &["users", &id.to_string()]).await?;

		Ok(self.execute_optional(request).await?.is_some())
	}

	/// Every user in the realm, fetched page by page.
	pub async fn list_users(&self) -> Result<Vec<UserRepresentation>> {
		self.paginate(&["users"], &[]).await
	}

	/// Set a user's password.
	#[tracing::instrument(skip(self, password))]
	pub async fn reset_password(&self, id: Uuid, password: &str, temporary: bool) -> Result<()> {
		let credential = json!({ "type": "password", "value": password, "temporary": temporary });
		let request = self
			.request(Method::PUT, &["users", &id.to_string(), "reset-password"])
			.await?
			.json(&credential);

		self.execute(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {id}")))?;

		Ok(())
	}

	/// Add a user to a group.
	pub async fn add_user_to_group(&self, user: Uuid, group: GroupId) -> Result<()> {
		self.membership(Method::PUT, user, group).await
	}

	/// Remove a user from a group.
	pub async fn remove_user_from_group(&self, user: Uuid, group: GroupId) -> Result<()> {
		self.membership(Method::DELETE, user, group).await
	}

	/// Groups the user is a direct member of.
	pub async fn user_groups(&self, user: Uuid) -> Result<Vec<GroupRepresentation>> {
		let request = self.request(Method::GET, &["users", &user.to_string(), "groups"]).await?;

		self.execute_json(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {user}")))
	}

	/// Look a realm role up by name, `None` when it does not exist.
	pub async fn realm_role(&self, name: &str) -> Result<Option<RoleRepresentation>> {
		let request = self.request(Method::GET, &["roles", name]).await?;

		match self.execute_optional(request).await? {
			Some(response) => Ok(Some(decode_body(response.bytes().await)?)),
			None => Ok(None),
		}
	}

	/// Grant realm roles to a user; unknown role names are skipped.
	#[tracing::instrument(skip(self))]
	pub async fn assign_realm_roles(&self, user: Uuid, names: &[&str]) -> Result<()> {
		let mut roles = Vec::with_capacity(names.len());

		for name in names {
			match self.realm_role(name).await? {
				Some(role) => roles.push(role),
				None => tracing::warn!(role = name, "realm role does not exist; skipping"),
			}
		}

		self.role_mappings(Method::POST, user, &roles).await
	}

	/// Make the user's realm roles exactly `names`, adding and removing as needed.
	#[tracing::instrument(skip(self))]
	pub async fn set_realm_roles(&self, user: Uuid, names: &[&str]) -> Result<()> {
		let request = self.request(Method::GET, &["roles"]).await?;
		let available: Vec<RoleRepresentation> = self.execute_json(request).await.map_err(upstream)?;
		let request = self
			.request(Method::GET, &["users", &user.to_string(), "role-mappings", "realm"])
			.await?;
		let current: Vec<RoleRepresentation> = self
			.execute_json(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {user}")))?;
		let wanted: BTreeSet<&str> = names.iter().copied().collect();
		let held: BTreeSet<&str> = current.iter().map(|role| role.name.as_str()).collect();
		let pick = |names: BTreeSet<&str>| -> Vec<RoleRepresentation> {
			available.iter().filter(|role| names.contains(role.name.as_str())).cloned().collect()
		};
		let to_remove = pick(held.difference(&wanted).copied().collect());
		let to_add = pick(wanted.difference(&held).copied().collect());

		self.role_mappings(Method::DELETE, user, &to_remove).await?;
		self.role_mappings(Method::POST, user, &to_add).await?;

		tracing::info!(added = to_add.len(), removed = to_remove.len(), "realm roles replaced");

		Ok(())
	}

	async fn membership(&self, method: Method, user: Uuid, group: GroupId) -> Result<()> {
		let request = self
			.request(method, &["users", &user.to_string(), "groups", &group.to_string()])
			.await?;

		self.execute(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {user} or group {group}")))?;

		Ok(())
	}

	async fn role_mappings(
		&self,
		method: Method,
		user: Uuid,
		roles: &[RoleRepresentation],
	) -> Result<()> {
		if roles.is_empty() {
			return Ok(());
		}

		let request = self
			.request(method, &["users", &user.to_string(), "role-mappings", "realm"])
			.await?
			.json(roles);

		self.execute(request)
			.await
			.map_err(|err| not_found_or_upstream(err, || format!("IdP user {user}")))?;

		Ok(())
	}

	async fn paginate<T>(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Vec<T>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut all = Vec::new();
		let mut first = 0;

		loop {
			let request = self
				.request(Method::GET, segments)
				.await?
				.query(query)
				.query(&[("first", first), ("max", PAGE_SIZE)]);
			let page: Vec<T> = self.execute_json(request).await.map_err(upstream)?;
			let len = page.len();

			all.extend(page);

			if len < PAGE_SIZE {
				return Ok(all);
			}

			first += PAGE_SIZE;
		}
	}

	async fn forget_group(&self, id: GroupId) {
		if let Some(resolver) = &self.resolver {
			let dropped = resolver.invalidate_group(id).await;

			tracing::debug!(%id, dropped, "tenant resolver entries dropped");
		}
	}

	async fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
		let token = self.tokens.get_admin_token().await?;
		let url = self.client.admin_url(segments)?;

		Ok(self.client.admin_request(method, url, &token))
	}

	async fn execute(&self, request: RequestBuilder) -> Result<Response> {
		let result = http::send(request).await;

		if let Err(Error::HttpStatus { status: StatusCode::UNAUTHORIZED, .. }) = &result {
			self.tokens.invalidate().await;
		}

		result
	}

	async fn execute_json<T>(&self, request: RequestBuilder) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let response = self.execute(request).await?;

		decode_body(response.bytes().await)
	}

	// `None` on 404.
	async fn execute_optional(&self, request: RequestBuilder) -> Result<Option<Response>> {
		match self.execute(request).await {
			Ok(response) => Ok(Some(response)),
			Err(Error::HttpStatus { status: StatusCode::NOT_FOUND, .. }) => Ok(None),
			Err(err) => Err(upstream(err)),
		}
	}
}

/// Creates tenants on the IdP and in the local directory.
#[derive(Clone, Debug)]
pub struct TenantProvisioner {
	admin: AdminApi,
	directory: Arc<dyn TenantDirectory>,
}
impl TenantProvisioner {
	/// Create a provisioner.
	pub fn new(admin: AdminApi, directory: Arc<dyn TenantDirectory>) -> Self {
		Self { admin, directory }
	}

	/// Provision tenant `name` on behalf of `caller`, who must be a general admin.
	#[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
	pub async fn provision(&self, caller: &TokenClaims, name: &str) -> Result<Tenant> {
		if !caller.has_role(Role::GeneralAdmin) {
			return Err(Error::AuthorizationDenied {
				reason: "Only general admins may create tenants.".into(),
			});
		}
		if self.directory.lookup_tenant_by_name(name).await?.is_some() {
			return Err(Error::Conflict { resource: format!("Tenant '{name}'") });
		}

		let group = self.admin.create_group(name).await?;

		if let Some(existing) = self.directory.lookup_tenant_by_external_group_id(group).await? {
			tracing::error!(%group, tenant = %existing.id, "new IdP group is already linked locally");

			return Err(Error::Conflict { resource: format!("Tenant linked to IdP group {group}") });
		}

		let tenant = self.directory.create_tenant(name, group).await?;

		tracing::info!(tenant = %tenant.id, %group, "tenant provisioned");

		Ok(tenant)
	}
}

fn created_id(response: &Response) -> Result<Uuid> {
	response
		.headers()
		.get(LOCATION)
		.and_then(|value| value.to_str().ok())
		.and_then(id_from_location)
		.ok_or_else(|| Error::DependencyUnavailable {
			dependency: DEPENDENCY,
			reason: "Created resource carried no usable Location header.".into(),
		})
}

fn id_from_location(location: &str) -> Option<Uuid> {
	location.trim_end_matches('/').rsplit('/').next().and_then(|id| Uuid::parse_str(id).ok())
}

// A body that cannot be read is an upstream failure; one that cannot be parsed is not.
fn decode_body<T, B>(body: reqwest::Result<B>) -> Result<T>
where
	T: serde::de::DeserializeOwned,
	B: AsRef<[u8]>,
{
	let body = body.map_err(|err| upstream(err.into()))?;

	Ok(serde_json::from_slice(body.as_ref())?)
}

fn upstream(err: Error) -> Error {
	err.into_dependency(DEPENDENCY)
}

fn conflict_or_upstream(err: Error, resource: impl FnOnce() -> String) -> Error {
	match err {
		Error::HttpStatus { status: StatusCode::CONFLICT, .. } => Error::Conflict { resource: resource() },
		err => upstream(err),
	}
}

fn not_found_or_upstream(err: Error, resource: impl FnOnce() -> String) -> Error {
	match err {
		Error::HttpStatus { status: StatusCode::NOT_FOUND, .. } => Error::NotFound { resource: resource() },
		err => upstream(err),
	}
}
