//! Group path resolution and tenant scoping through the admin group-search API.

// crates.io
use helpdesk_auth::{
	Action, Authenticator, Error, GroupId, ListFilter, ResourceRef, TenantResolutionError,
	TokenClaims,
};
use http::StatusCode;
use serde_json::json;
use uuid::Uuid;
use wiremock::{
	Mock, ResponseTemplate,
	matchers::{header, method, path, query_param},
};
// self
use crate::support::{self, GROUPS_PATH, Realm};

async fn verified(realm: &Realm, roles: &[&str], groups: &[&str]) -> TokenClaims {
	let token = support::mint(&realm.claims(Uuid::new_v4(), roles, groups));

	realm.verifier.verify(&token).await.expect("verified")
}

fn authenticator(realm: &Realm) -> Authenticator {
	Authenticator::new(realm.verifier.clone(), realm.resolver.clone(), realm.directory.clone())
}

#[tokio::test]
async fn agent_create_lands_in_the_single_resolved_tenant() {
	let realm = Realm::start().await;
	let acme = Uuid::new_v4();
	let tenant = realm.directory.insert("Acme", Some(GroupId(acme)));

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.and(query_param("search", "Acme"))
		.and(query_param("exact", "true"))
		.and(header("authorization", "Bearer admin-token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([support::group(
			acme, "Acme", "/Acme"
		)])))
		.expect(1)
		.mount(&realm.server)
		.await;

	let claims = verified(&realm, &["agent"], &["/Acme"]).await;
	let authenticator = authenticator(&realm);

	for _ in 0..2 {
		let placed =
			authenticator.authorize(&claims, Action::Create, None, None).await.expect("permitted");

		assert_eq!(placed, Some(tenant.id));
	}

	assert_eq!(realm.resolver.cached("/Acme").await, Some(GroupId(acme)));

	realm.server.verify().await;
}

#[tokio::test]
async fn nested_groups_with_the_same_name_do_not_match() {
	let realm = Realm::start().await;
	let nested = Uuid::new_v4();

	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.and(query_param("search", "Acme"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([{
			"id": Uuid::new_v4().to_string(),
			"name": "Partners",
			"path": "/Partners",
			"subGroups": [support::group(nested, "Acme", "/Partners/Acme")],
		}])))
		.mount(&realm.server)
		.await;

	let err = realm.resolver.resolve("Acme").await.unwrap_err();

	assert!(matches!(
		err,
		Error::TenantResolution(TenantResolutionError::GroupNotFound { ref path }) if path == "/Acme"
	));
	assert_eq!(err.status(), StatusCode::BAD_REQUEST);
	assert_eq!(realm.resolver.resolve("/Partners/Acme").await.expect("nested"), GroupId(nested));
}

#[tokio::test]
async fn rejected_admin_token_is_fetched_again() {
	let realm = Realm::start().await;
	let acme = Uuid::new_v4();

	realm.mount_admin_token(2).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(401))
		.up_to_n_times(1)
		.with_priority(1)
		.mount(&realm.server)
		.await;
	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([support::group(
			acme, "Acme", "/Acme"
		)])))
		.with_priority(2)
		.mount(&realm.server)
		.await;

	let err = realm.resolver.resolve("/Acme").await.unwrap_err();

	assert!(matches!(err, Error::DependencyUnavailable { dependency: "group_search", .. }));
	assert_eq!(realm.resolver.resolve("/Acme").await.expect("resolved"), GroupId(acme));
	assert_eq!(realm.tokens.stats().snapshot().refresh_successes, 2);

	realm.server.verify().await;
}

#[tokio::test]
async fn search_outage_fails_creates_but_empties_lists() {
	let realm = Realm::start().await;

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(503))
		.mount(&realm.server)
		.await;

	let claims = verified(&realm, &["agent"], &["/Acme"]).await;
	let authenticator = authenticator(&realm);
	let err = authenticator.authorize(&claims, Action::Create, None, None).await.unwrap_err();

	assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(authenticator.list_scope(&claims).await.expect("list scope"), ListFilter::Nothing);
}

#[tokio::test]
async fn unprovisioned_group_is_a_bad_request_on_create() {
	let realm = Realm::start().await;
	let orphan = Uuid::new_v4();

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([support::group(
			orphan, "Globex", "/Globex"
		)])))
		.mount(&realm.server)
		.await;

	let claims = verified(&realm, &["agent"], &["/Globex"]).await;
	let err = authenticator(&realm).authorize(&claims, Action::Create, None, None).await.unwrap_err();

	assert!(matches!(
		err,
		Error::TenantResolution(TenantResolutionError::TenantNotProvisioned { group_id }) if group_id == orphan
	));
	assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_outage_leaves_customer_reads_and_admin_creates_working() {
	let realm = Realm::start().await;
	let acme = realm.directory.insert("Acme", Some(GroupId(Uuid::new_v4())));

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(503))
		.mount(&realm.server)
		.await;

	let customer = verified(&realm, &["customer-user"], &["/Acme"]).await;
	let own = ResourceRef { tenant: acme.id, creator: customer.subject };
	let authenticator = authenticator(&realm);

	assert_eq!(
		authenticator.authorize(&customer, Action::Read, Some(own), None).await.expect("permitted"),
		Some(acme.id)
	);

	let admin = verified(&realm, &["general-admin"], &["/Renamed"]).await;

	assert_eq!(
		authenticator
			.authorize(&admin, Action::Create, None, Some(acme.id))
			.await
			.expect("permitted with override"),
		Some(acme.id)
	);
	assert_eq!(
		authenticator.authorize(&admin, Action::Create, None, None).await.expect("permitted"),
		None
	);
}
