//! Tenant identities and the local tenant directory collaborator.

pub mod resolver;

pub use resolver::TenantResolver;

// std
use std::fmt;
// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Local tenant (company) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);
impl fmt::Display for TenantId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// IdP group identifier backing a tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);
impl fmt::Display for GroupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Local tenant record as exposed by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tenant {
	/// Local identifier.
	pub id: TenantId,
	/// Display name, unique across tenants.
	pub name: String,
	/// IdP group linked to this tenant, if provisioned.
	pub external_group_id: Option<GroupId>,
}

/// Narrow lookup/create contract over the local tenant store.
#[async_trait]
pub trait TenantDirectory: fmt::Debug + Send + Sync {
	/// Look a tenant up by its local id.
	async fn lookup_tenant_by_local_id(&self, id: TenantId) -> Result<Option<Tenant>>;

	/// Look a tenant up by the IdP group it is linked to.
	async fn lookup_tenant_by_external_group_id(&self, group: GroupId) -> Result<Option<Tenant>>;

	/// Look a tenant up by display name.
	async fn lookup_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>>;

	/// Create a tenant linked to `external_group_id`.
	async fn create_tenant(&self, name: &str, external_group_id: GroupId) -> Result<Tenant>;
}
