//! Resolution of IdP group paths to group identifiers, cached without expiry.

// std
use std::collections::HashMap;
// crates.io
use http::StatusCode;
use tokio::sync::RwLock;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	cache::AdminCredentialCache,
	claims::normalize_group_path,
	error::TenantResolutionError,
	idp::IdentityProvider,
	metrics::{self, CacheStats},
	tenant::GroupId,
};

const CACHE_NAME: &str = "tenant_groups";

/// Maps normalized group paths to IdP group ids through the admin group-search API.
///
/// Mappings are kept for the life of the process; a renamed or deleted group stays mapped until
/// [`TenantResolver::invalidate`] or [`TenantResolver::invalidate_all`] is called.
#[derive(Clone, Debug)]
pub struct TenantResolver {
	idp: Arc<dyn IdentityProvider>,
	admin: AdminCredentialCache,
	mappings: Arc<RwLock<HashMap<String, GroupId>>>,
	stats: Arc<CacheStats>,
}
impl TenantResolver {
	/// Create a resolver sharing the given admin credential cache.
	pub fn new(idp: Arc<dyn IdentityProvider>, admin: AdminCredentialCache) -> Self {
		Self { idp, admin, mappings: Arc::default(), stats: CacheStats::new() }
	}

	/// Resolve `group_path` to the id of the IdP group carrying exactly that path.
	#[tracing::instrument(skip(self))]
	pub async fn resolve(&self, group_path: &str) -> Result<GroupId> {
		let path = normalize_group_path(group_path);

		if let Some(id) = self.mappings.read().await.get(&path).copied() {
			self.stats.record_hit();
			metrics::record_cache_hit(CACHE_NAME);

			tracing::debug!(%path, %id, "group mapping served from cache");

			return Ok(id);
		}

		self.stats.record_miss();
		metrics::record_cache_miss(CACHE_NAME);

		// Group search matches on names; the full path is checked against the results.
		let search = path.rsplit('/').next().unwrap_or_default();

		if search.is_empty() {
			return Err(TenantResolutionError::GroupNotFound { path }.into());
		}

		let started = Instant::now();
		let admin_token = self.admin.get_admin_token().await?;
		let candidates = match self.idp.search_groups(&admin_token, search).await {
			Ok(candidates) => candidates,
			Err(err) => {
				if matches!(err, Error::HttpStatus { status: StatusCode::UNAUTHORIZED, .. }) {
					self.admin.invalidate().await;
				}

				self.stats.record_refresh_error();
				metrics::record_refresh_error(CACHE_NAME);

				return Err(err.into_dependency("group_search"));
			},
		};
		let mut matches = candidates
			.iter()
			.filter(|group| normalize_group_path(&group.path) == path)
			.filter_map(|group| match Uuid::parse_str(&group.id) {
				Ok(id) => Some(GroupId(id)),
				Err(err) => {
					tracing::warn!(id = %group.id, error = %err, "skipping group with non-uuid id");

					None
				},
			});
		let Some(id) = matches.next() else {
			tracing::warn!(
				%path,
				found = ?candidates.iter().map(|group| group.path.as_str()).collect::<Vec<_>>(),
				"no group matches path"
			);

			return Err(TenantResolutionError::GroupNotFound { path }.into());
		};

		if matches.next().is_some() {
			tracing::warn!(%path, %id, "several groups share this path; using the first");
		}

		self.mappings.write().await.insert(path.clone(), id);
		self.stats.record_refresh_success(started.elapsed());
		metrics::record_refresh_success(CACHE_NAME, started.elapsed());

		tracing::info!(%path, %id, "group mapping cached");

		Ok(id)
	}

	/// Forget the mapping for `group_path`.
	pub async fn invalidate(&self, group_path: &str) -> bool {
		let path = normalize_group_path(group_path);
		let removed = self.mappings.write().await.remove(&path).is_some();

		tracing::info!(%path, removed, "group mapping invalidated");

		removed
	}

	/// Forget the mapping pointing at `id`, whatever path it was cached under.
	pub async fn invalidate_group(&self, id: GroupId) -> usize {
		let mut mappings = self.mappings.write().await;
		let before = mappings.len();

		mappings.retain(|_, cached| *cached != id);

		before - mappings.len()
	}

	/// Forget every cached mapping.
	pub async fn invalidate_all(&self) {
		self.mappings.write().await.clear();

		tracing::info!("all group mappings invalidated");
	}

	/// Cached id for `group_path`, if any.
	pub async fn cached(&self, group_path: &str) -> Option<GroupId> {
		self.mappings.read().await.get(&normalize_group_path(group_path)).copied()
	}

	/// Per-cache counters.
	pub fn stats(&self) -> Arc<CacheStats> {
		self.stats.clone()
	}
}
