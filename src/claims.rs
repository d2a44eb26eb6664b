//! Verified token claims, realm roles, and tenant group path normalization.

// std
use std::{collections::BTreeSet, fmt, str::FromStr};
// crates.io
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Canonical form of an IdP group path: exactly one leading `/`.
///
/// Repeated leading slashes collapse to one and a missing one is prepended; nothing past the
/// leading run is touched. The empty string stays empty. Token claims and the tenant resolver both
/// go through this function so their cache keys agree.
pub fn normalize_group_path(raw: &str) -> String {
	if raw.is_empty() {
		return String::new();
	}

	format!("/{}", raw.trim_start_matches('/'))
}

/// Realm roles the helpdesk understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
	/// Platform operator; bypasses tenant scoping.
	GeneralAdmin,
	/// Customer account belonging to exactly one tenant.
	CustomerUser,
	/// Support staff working tickets for their tenants.
	Agent,
	/// Tenant-scoped staff administrator.
	HelpdeskAdmin,
}
impl Role {
	/// Realm role name as issued by the IdP.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::GeneralAdmin => "general-admin",
			Self::CustomerUser => "customer-user",
			Self::Agent => "agent",
			Self::HelpdeskAdmin => "helpdesk-admin",
		}
	}
}
impl FromStr for Role {
	type Err = ();

	fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
		match value {
			"general-admin" => Ok(Self::GeneralAdmin),
			"customer-user" => Ok(Self::CustomerUser),
			"agent" => Ok(Self::Agent),
			"helpdesk-admin" | "helpdesk_admin" => Ok(Self::HelpdeskAdmin),
			_ => Err(()),
		}
	}
}
impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Closed set of recognized roles held by a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<Role>);
impl RoleSet {
	/// Parse role names, ignoring any the helpdesk does not know.
	pub fn from_names<I, S>(names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self(names.into_iter().filter_map(|name| name.as_ref().parse().ok()).collect())
	}

	/// Whether the set holds `role`.
	pub fn contains(&self, role: Role) -> bool {
		self.0.contains(&role)
	}

	/// Whether no recognized role is held.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterate the held roles in precedence order.
	pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
		self.0.iter().copied()
	}
}
impl FromIterator<Role> for RoleSet {
	fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// Pick the raw realm role names out of a token.
///
/// The flat `roles` claim wins when it is present and non-empty; otherwise the nested
/// `realm_access.roles` list is used.
pub fn extract_roles(flat: Option<&[String]>, realm_access: Option<&[String]>) -> Vec<String> {
	match flat {
		Some(roles) if !roles.is_empty() => roles.to_vec(),
		_ => realm_access.map(<[String]>::to_vec).unwrap_or_default(),
	}
}

/// Structured claims of a verified bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
	/// Stable external user id (`sub`).
	pub subject: Uuid,
	/// Token issuer (`iss`).
	pub issuer: String,
	/// Audiences the token was minted for (`aud`).
	pub audience: Vec<String>,
	/// Expiry (`exp`).
	pub expires_at: DateTime<Utc>,
	/// Recognized realm roles.
	pub roles: RoleSet,
	/// Realm role names exactly as found in the token.
	pub raw_roles: Vec<String>,
	/// Group paths exactly as found in the token.
	pub groups: Vec<String>,
	/// Normalized, de-duplicated tenant group paths.
	pub tenant_groups: Vec<String>,
	/// `email` claim, if present.
	pub email: Option<String>,
	/// `name` claim, if present.
	pub name: Option<String>,
	/// `preferred_username` claim, if present.
	pub preferred_username: Option<String>,
}
impl TokenClaims {
	/// Whether the caller holds `role`.
	pub fn has_role(&self, role: Role) -> bool {
		self.roles.contains(role)
	}
}

/// Token payload as decoded by `jsonwebtoken`, before normalization.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
	sub: String,
	iss: String,
	#[serde(deserialize_with = "one_or_many")]
	aud: Vec<String>,
	exp: i64,
	#[serde(default)]
	roles: Option<Value>,
	#[serde(default)]
	realm_access: Option<RealmAccess>,
	#[serde(default)]
	groups: Option<Value>,
	#[serde(default)]
	email: Option<String>,
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	preferred_username: Option<String>,
}
impl TryFrom<RawClaims> for TokenClaims {
	type Error = Error;

	fn try_from(raw: RawClaims) -> Result<Self> {
		let subject = Uuid::parse_str(&raw.sub).map_err(|err| {
			tracing::debug!(error = %err, "token subject is not a uuid");

			Error::AuthenticationFailed
		})?;
		let expires_at =
			DateTime::<Utc>::from_timestamp(raw.exp, 0).ok_or(Error::AuthenticationFailed)?;
		let flat = raw.roles.as_ref().map(string_list);
		let realm_access = raw.realm_access.map(|access| access.roles);
		let raw_roles = extract_roles(flat.as_deref(), realm_access.as_deref());
		let groups = raw.groups.as_ref().map(string_list).unwrap_or_default();
		let mut tenant_groups = Vec::with_capacity(groups.len());

		for path in groups.iter().map(|group| normalize_group_path(group)) {
			if !path.is_empty() && !tenant_groups.contains(&path) {
				tenant_groups.push(path);
			}
		}

		Ok(Self {
			subject,
			issuer: raw.iss,
			audience: raw.aud,
			expires_at,
			roles: RoleSet::from_names(&raw_roles),
			raw_roles,
			groups,
			tenant_groups,
			email: raw.email,
			name: raw.name,
			preferred_username: raw.preferred_username,
		})
	}
}

#[derive(Debug, Deserialize)]
struct RealmAccess {
	#[serde(default)]
	roles: Vec<String>,
}

// Non-string entries are skipped; a non-array value counts as absent.
fn string_list(value: &Value) -> Vec<String> {
	value
		.as_array()
		.map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
		.unwrap_or_default()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum OneOrMany {
		One(String),
		Many(Vec<String>),
	}

	Ok(match OneOrMany::deserialize(deserializer)? {
		OneOrMany::One(aud) => vec![aud],
		OneOrMany::Many(aud) => aud,
	})
}
