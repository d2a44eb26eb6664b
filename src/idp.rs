//! Identity provider endpoints consumed by the caches and the tenant resolver.
//!
//! [`IdentityProvider`] is the seam tests replace with an in-process fake; [`KeycloakClient`] is the
//! reqwest-backed implementation talking to the realm's OIDC and admin endpoints.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	config::{IdpConfig, Secret},
	http,
};

/// Lifetime assumed for an admin token whose response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 300;

/// Upstream calls the auth layer depends on.
#[async_trait]
pub trait IdentityProvider: Debug + Send + Sync {
	/// Fetch the realm's published signing key set.
	async fn fetch_jwks(&self) -> Result<JwkSet>;

	/// Run a client-credentials grant with the administrative client.
	async fn client_credentials(&self) -> Result<AccessTokenResponse>;

	/// Search groups by exact name, returning every group the IdP reports.
	async fn search_groups(&self, admin_token: &str, name: &str)
	-> Result<Vec<GroupRepresentation>>;
}

/// Token endpoint response for a client-credentials grant.
#[derive(Clone, Deserialize)]
pub struct AccessTokenResponse {
	/// Opaque bearer token.
	pub access_token: String,
	/// Lifetime in seconds.
	#[serde(default = "default_expires_in")]
	pub expires_in: u64,
}
impl Debug for AccessTokenResponse {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AccessTokenResponse")
			.field("access_token", &"***")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Group as reported by the admin API.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRepresentation {
	/// Group identifier assigned by the IdP.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Full hierarchical path, e.g. `/Acme`.
	#[serde(default)]
	pub path: String,
	/// Nested groups, present on hierarchical search results.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub sub_groups: Vec<GroupRepresentation>,
}
impl GroupRepresentation {
	/// Flatten this group and its descendants into a single list.
	pub fn flatten(self) -> Vec<GroupRepresentation> {
		let mut out = Vec::new();
		let mut pending = vec![self];

		while let Some(mut group) = pending.pop() {
			pending.append(&mut group.sub_groups);
			out.push(group);
		}

		out
	}
}

/// Reqwest-backed client for a Keycloak-compatible realm.
#[derive(Clone)]
pub struct KeycloakClient {
	client: Client,
	jwks_url: Url,
	token_url: Url,
	admin_realm_url: Url,
	admin_credentials: Option<(String, Secret)>,
}
impl KeycloakClient {
	/// Build a client from validated settings.
	pub fn new(config: &IdpConfig) -> Result<Self> {
		Self::with_client(config, http::build_client(config)?)
	}

	/// Build a client reusing the supplied reqwest client.
	pub fn with_client(config: &IdpConfig, client: Client) -> Result<Self> {
		config.validate()?;

		let admin_credentials = config
			.admin_client_id
			.clone()
			.zip(config.admin_client_secret.clone());

		Ok(Self {
			client,
			jwks_url: config.jwks_endpoint()?,
			token_url: config.token_endpoint()?,
			admin_realm_url: config.admin_realm_url()?,
			admin_credentials,
		})
	}

	/// Base URL of the realm's administrative REST API.
	pub fn admin_realm_url(&self) -> &Url {
		&self.admin_realm_url
	}

	/// Resolve `segments` beneath the admin realm URL, percent-encoding each one.
	pub fn admin_url<I, S>(&self, segments: I) -> Result<Url>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut url = self.admin_realm_url.clone();

		url.path_segments_mut()
			.map_err(|_| Error::Configuration {
				field: "issuer_url",
				reason: "Admin realm URL cannot carry path segments.".into(),
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	/// Start an authorized request against the admin API.
	pub fn admin_request(
		&self,
		method: reqwest::Method,
		url: Url,
		admin_token: &str,
	) -> RequestBuilder {
		self.client.request(method, url).bearer_auth(admin_token)
	}
}
impl Debug for KeycloakClient {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("KeycloakClient")
			.field("jwks_url", &self.jwks_url.as_str())
			.field("token_url", &self.token_url.as_str())
			.field("admin_realm_url", &self.admin_realm_url.as_str())
			.field("admin_client", &self.admin_credentials.as_ref().map(|(id, _)| id))
			.finish()
	}
}
#[async_trait]
impl IdentityProvider for KeycloakClient {
	#[tracing::instrument(skip(self), fields(url = %self.jwks_url))]
	async fn fetch_jwks(&self) -> Result<JwkSet> {
		http::send_json(self.client.get(self.jwks_url.clone())).await
	}

	#[tracing::instrument(skip(self), fields(url = %self.token_url))]
	async fn client_credentials(&self) -> Result<AccessTokenResponse> {
		let Some((client_id, client_secret)) = &self.admin_credentials else {
			return Err(Error::Configuration {
				field: "admin_client_id",
				reason: "Admin client credentials are not configured.".into(),
			});
		};
		let form = [
			("grant_type", "client_credentials"),
			("client_id", client_id.as_str()),
			("client_secret", client_secret.expose()),
		];

		http::send_json(self.client.post(self.token_url.clone()).form(&form)).await
	}

	#[tracing::instrument(skip(self, admin_token))]
	async fn search_groups(
		&self,
		admin_token: &str,
		name: &str,
	) -> Result<Vec<GroupRepresentation>> {
		let mut url = self.admin_url(["groups"])?;

		url.query_pairs_mut()
			.append_pair("search", name)
			.append_pair("exact", "true")
			.append_pair("briefRepresentation", "false");

		let groups: Vec<GroupRepresentation> =
			http::send_json(self.admin_request(reqwest::Method::GET, url, admin_token)).await?;

		Ok(groups.into_iter().flat_map(GroupRepresentation::flatten).collect())
	}
}

fn default_expires_in() -> u64 {
	DEFAULT_TOKEN_LIFETIME_SECS
}
