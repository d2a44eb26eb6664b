//! Role and tenant authorization decisions for ticket-domain resources.
//!
//! Decisions come from an ordered rule table: the first rule whose role the caller holds decides,
//! and a caller matching no rule is denied. Evaluation is pure; the only side effect is the
//! decision counter.

// std
use std::fmt;
// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	claims::{Role, RoleSet},
	error::TenantResolutionError,
	metrics,
	tenant::TenantId,
};

/// Operations on ticket-domain resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
	/// Create a resource in a tenant.
	Create,
	/// Read a single resource.
	Read,
	/// List a collection; see [`list_filter`].
	List,
	/// Modify a resource.
	Update,
	/// Remove a resource.
	Delete,
	/// Comment on a resource.
	Comment,
	/// Attach a file to a resource.
	Attach,
	/// Download an attachment of a resource.
	Download,
}
impl Action {
	/// Lowercase action name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Create => "create",
			Self::Read => "read",
			Self::List => "list",
			Self::Update => "update",
			Self::Delete => "delete",
			Self::Comment => "comment",
			Self::Attach => "attach",
			Self::Download => "download",
		}
	}
}
impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Ownership facts of an existing resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRef {
	/// Tenant the resource belongs to.
	pub tenant: TenantId,
	/// Subject that created the resource.
	pub creator: Uuid,
}

/// Everything a decision depends on, fully resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationContext {
	/// Caller's recognized roles.
	pub roles: RoleSet,
	/// Caller's subject id.
	pub subject: Uuid,
	/// Tenants the caller's groups resolved to.
	pub tenants: Vec<TenantId>,
	/// Requested action.
	pub action: Action,
	/// Target resource; absent for create and list.
	pub resource: Option<ResourceRef>,
	/// Tenant explicitly chosen by the caller for a create.
	pub tenant_override: Option<TenantId>,
}
impl AuthorizationContext {
	/// Context for `action` with no resource and no override.
	pub fn new(roles: RoleSet, subject: Uuid, tenants: Vec<TenantId>, action: Action) -> Self {
		Self { roles, subject, tenants, action, resource: None, tenant_override: None }
	}

	/// Attach the target resource.
	pub fn with_resource(mut self, resource: ResourceRef) -> Self {
		self.resource = Some(resource);

		self
	}

	/// Attach an explicit tenant choice for a create.
	pub fn with_tenant_override(mut self, tenant: TenantId) -> Self {
		self.tenant_override = Some(tenant);

		self
	}
}

/// Outcome of [`decide`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
	/// The action may proceed.
	Permit {
		/// Tenant the action applies to: the target tenant of a create, or the resource's tenant.
		/// `None` when no single tenant is implied (list, or a general-admin create without one).
		tenant: Option<TenantId>,
	},
	/// The action is refused.
	Deny(DenyReason),
}
impl Decision {
	/// Whether the decision permits the action.
	pub fn is_permit(&self) -> bool {
		matches!(self, Self::Permit { .. })
	}

	/// Convert into the tenant the action applies to, or the error the boundary answers with.
	pub fn into_result(self) -> Result<Option<TenantId>> {
		match self {
			Self::Permit { tenant } => Ok(tenant),
			Self::Deny(reason) => Err(reason.into()),
		}
	}
}

/// Why an action was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
	/// The caller belongs to no tenant; the account is misconfigured.
	NoTenantGroup,
	/// The caller belongs to several tenants and did not choose one.
	AmbiguousTenant {
		/// Number of tenants the caller resolved to.
		candidates: usize,
	},
	/// The chosen or targeted tenant is not one of the caller's tenants.
	TenantMismatch,
	/// A customer acted on a resource created by someone else.
	NotCreator,
	/// The caller's role never allows this action.
	ActionNotPermitted {
		/// Role that decided.
		role: Role,
		/// Refused action.
		action: Action,
	},
	/// The action targets a resource but none was supplied.
	MissingResource,
	/// The caller holds no recognized role.
	NoRecognizedRole,
}
impl From<DenyReason> for Error {
	fn from(reason: DenyReason) -> Self {
		match reason {
			DenyReason::NoTenantGroup => TenantResolutionError::NoTenantGroup.into(),
			DenyReason::AmbiguousTenant { candidates } =>
				TenantResolutionError::AmbiguousTenant { candidates }.into(),
			DenyReason::TenantMismatch =>
				Error::AuthorizationDenied { reason: "Resource belongs to another tenant.".into() },
			DenyReason::NotCreator => Error::AuthorizationDenied {
				reason: "Customers may only access resources they created.".into(),
			},
			DenyReason::ActionNotPermitted { role, action } => Error::AuthorizationDenied {
				reason: format!("Role {role} may not {action} this resource."),
			},
			DenyReason::MissingResource =>
				Error::AuthorizationDenied { reason: "No target resource was supplied.".into() },
			DenyReason::NoRecognizedRole =>
				Error::AuthorizationDenied { reason: "No recognized role.".into() },
		}
	}
}

/// Row filter for list operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListFilter {
	/// No restriction.
	Everything,
	/// Only resources in `tenants`, and created by `creator` when set.
	Scoped {
		/// Permitted tenants; never empty.
		tenants: Vec<TenantId>,
		/// Required creator.
		creator: Option<Uuid>,
	},
	/// Empty result.
	Nothing,
}
impl ListFilter {
	/// Whether `resource` passes the filter.
	pub fn admits(&self, resource: &ResourceRef) -> bool {
		match self {
			Self::Everything => true,
			Self::Scoped { tenants, creator } =>
				tenants.contains(&resource.tenant)
					&& creator.is_none_or(|creator| creator == resource.creator),
			Self::Nothing => false,
		}
	}
}

struct Rule {
	name: &'static str,
	applies: fn(&RoleSet) -> bool,
	decide: fn(&AuthorizationContext) -> Decision,
	filter: fn(&AuthorizationContext) -> ListFilter,
}

const RULES: &[Rule] = &[
	Rule {
		name: "general-admin",
		applies: is_general_admin,
		decide: general_admin,
		filter: general_admin_filter,
	},
	Rule { name: "customer-user", applies: is_customer, decide: customer, filter: customer_filter },
	Rule { name: "staff", applies: is_staff, decide: staff, filter: staff_filter },
];

/// Decide whether the caller may perform `ctx.action`.
pub fn decide(ctx: &AuthorizationContext) -> Decision {
	let (rule, decision) = match RULES.iter().find(|rule| (rule.applies)(&ctx.roles)) {
		Some(rule) => (rule.name, (rule.decide)(ctx)),
		None => ("default", Decision::Deny(DenyReason::NoRecognizedRole)),
	};

	match &decision {
		Decision::Permit { tenant } => {
			metrics::record_decision("permit");

			tracing::debug!(rule, action = %ctx.action, ?tenant, "action permitted");
		},
		Decision::Deny(reason) => {
			metrics::record_decision("deny");

			tracing::info!(rule, action = %ctx.action, subject = %ctx.subject, ?reason, "action denied");
		},
	}

	decision
}

/// Filter a list operation must apply for the caller.
///
/// `ctx.action` and `ctx.resource` are ignored. An empty resolved tenant set yields
/// [`ListFilter::Nothing`] for tenant-scoped roles.
pub fn list_filter(ctx: &AuthorizationContext) -> ListFilter {
	RULES
		.iter()
		.find(|rule| (rule.applies)(&ctx.roles))
		.map(|rule| (rule.filter)(ctx))
		.unwrap_or(ListFilter::Nothing)
}

fn is_general_admin(roles: &RoleSet) -> bool {
	roles.contains(Role::GeneralAdmin)
}

fn is_customer(roles: &RoleSet) -> bool {
	roles.contains(Role::CustomerUser)
}

fn is_staff(roles: &RoleSet) -> bool {
	roles.contains(Role::Agent) || roles.contains(Role::HelpdeskAdmin)
}

fn general_admin(ctx: &AuthorizationContext) -> Decision {
	let tenant = match ctx.action {
		Action::Create => ctx.tenant_override.or(match ctx.tenants.as_slice() {
			[only] => Some(*only),
			_ => None,
		}),
		Action::List => None,
		_ => ctx.resource.map(|resource| resource.tenant),
	};

	Decision::Permit { tenant }
}

fn customer(ctx: &AuthorizationContext) -> Decision {
	match ctx.action {
		Action::Create => {
			let tenant = match ctx.tenants.as_slice() {
				[] => return Decision::Deny(DenyReason::NoTenantGroup),
				[only] => *only,
				many => return Decision::Deny(DenyReason::AmbiguousTenant { candidates: many.len() }),
			};

			if ctx.tenant_override.is_some_and(|chosen| chosen != tenant) {
				return Decision::Deny(DenyReason::TenantMismatch);
			}

			Decision::Permit { tenant: Some(tenant) }
		},
		Action::List => Decision::Permit { tenant: None },
		Action::Update | Action::Delete => Decision::Deny(DenyReason::ActionNotPermitted {
			role: Role::CustomerUser,
			action: ctx.action,
		}),
		Action::Read | Action::Comment | Action::Attach | Action::Download => match ctx.resource {
			None => Decision::Deny(DenyReason::MissingResource),
			Some(resource) if resource.creator != ctx.subject => Decision::Deny(DenyReason::NotCreator),
			Some(resource) => Decision::Permit { tenant: Some(resource.tenant) },
		},
	}
}

fn staff(ctx: &AuthorizationContext) -> Decision {
	match ctx.action {
		Action::Create => match (ctx.tenant_override, ctx.tenants.as_slice()) {
			(_, []) => Decision::Deny(DenyReason::NoTenantGroup),
			(Some(chosen), tenants) if tenants.contains(&chosen) =>
				Decision::Permit { tenant: Some(chosen) },
			(Some(_), _) => Decision::Deny(DenyReason::TenantMismatch),
			(None, [only]) => Decision::Permit { tenant: Some(*only) },
			(None, many) => Decision::Deny(DenyReason::AmbiguousTenant { candidates: many.len() }),
		},
		Action::List => Decision::Permit { tenant: None },
		Action::Delete if !ctx.roles.contains(Role::HelpdeskAdmin) =>
			Decision::Deny(DenyReason::ActionNotPermitted { role: Role::Agent, action: ctx.action }),
		_ => match ctx.resource {
			None => Decision::Deny(DenyReason::MissingResource),
			Some(resource) if ctx.tenants.contains(&resource.tenant) =>
				Decision::Permit { tenant: Some(resource.tenant) },
			Some(_) => Decision::Deny(DenyReason::TenantMismatch),
		},
	}
}

fn general_admin_filter(_: &AuthorizationContext) -> ListFilter {
	ListFilter::Everything
}

fn customer_filter(ctx: &AuthorizationContext) -> ListFilter {
	scoped(ctx, Some(ctx.subject))
}

fn staff_filter(ctx: &AuthorizationContext) -> ListFilter {
	scoped(ctx, None)
}

fn scoped(ctx: &AuthorizationContext, creator: Option<Uuid>) -> ListFilter {
	if ctx.tenants.is_empty() {
		ListFilter::Nothing
	} else {
		ListFilter::Scoped { tenants: ctx.tenants.clone(), creator }
	}
}
