//! Admin API calls and tenant provisioning against a mocked realm.

// crates.io
use helpdesk_auth::{AdminApi, Error, GroupId, TenantProvisioner, TokenClaims};
use serde_json::json;
use uuid::Uuid;
use wiremock::{
	Mock, ResponseTemplate,
	matchers::{body_partial_json, body_string_contains, method, path, query_param},
};
// self
use crate::support::{self, GROUPS_PATH, Realm};

const USERS_PATH: &str = "/admin/realms/helpdesk/users";

fn admin(realm: &Realm) -> AdminApi {
	AdminApi::new(realm.client.clone(), realm.tokens.clone()).with_resolver(realm.resolver.clone())
}

async fn caller(realm: &Realm, roles: &[&str]) -> TokenClaims {
	let token = support::mint(&realm.claims(Uuid::new_v4(), roles, &[]));

	realm.verifier.verify(&token).await.expect("verified")
}

#[tokio::test]
async fn general_admin_provisions_group_then_tenant() {
	let realm = Realm::start().await;
	let group = Uuid::new_v4();

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("POST"))
		.and(path(GROUPS_PATH))
		.and(body_partial_json(json!({ "name": "Initech" })))
		.respond_with(
			ResponseTemplate::new(201)
				.insert_header("location", format!("{}{GROUPS_PATH}/{group}", realm.server.uri())),
		)
		.expect(1)
		.mount(&realm.server)
		.await;

	let provisioner = TenantProvisioner::new(admin(&realm), realm.directory.clone());
	let claims = caller(&realm, &["general-admin"]).await;
	let tenant = provisioner.provision(&claims, "Initech").await.expect("provisioned");

	assert_eq!(tenant.name, "Initech");
	assert_eq!(tenant.external_group_id, Some(GroupId(group)));
	assert_eq!(realm.directory.len(), 1);

	realm.server.verify().await;
}

#[tokio::test]
async fn provisioning_refuses_non_admins_and_duplicates() {
	let realm = Realm::start().await;

	realm.mount_jwks(1).await;
	realm.directory.insert("Acme", Some(GroupId(Uuid::new_v4())));

	Mock::given(method("POST"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(201))
		.expect(0)
		.mount(&realm.server)
		.await;

	let provisioner = TenantProvisioner::new(admin(&realm), realm.directory.clone());
	let agent = caller(&realm, &["agent", "helpdesk_admin"]).await;
	let general = caller(&realm, &["general-admin"]).await;

	assert!(matches!(
		provisioner.provision(&agent, "Initech").await,
		Err(Error::AuthorizationDenied { .. })
	));
	assert!(matches!(provisioner.provision(&general, "Acme").await, Err(Error::Conflict { .. })));

	realm.server.verify().await;
}

#[tokio::test]
async fn existing_idp_group_is_a_conflict() {
	let realm = Realm::start().await;

	realm.mount_jwks(1).await;
	realm.mount_admin_token(1).await;

	Mock::given(method("POST"))
		.and(path(GROUPS_PATH))
		.respond_with(
			ResponseTemplate::new(409)
				.set_body_json(json!({ "errorMessage": "Top level group named 'Initech' already exists." })),
		)
		.mount(&realm.server)
		.await;

	let provisioner = TenantProvisioner::new(admin(&realm), realm.directory.clone());
	let claims = caller(&realm, &["general-admin"]).await;
	let err = provisioner.provision(&claims, "Initech").await.unwrap_err();

	assert!(matches!(err, Error::Conflict { .. }));
	assert_eq!(realm.directory.len(), 0);
}

#[tokio::test]
async fn users_are_listed_page_by_page() {
	let realm = Realm::start().await;
	let page = |count: usize| {
		(0..count)
			.map(|n| json!({ "id": Uuid::new_v4().to_string(), "username": format!("user-{n}") }))
			.collect::<Vec<_>>()
	};

	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(USERS_PATH))
		.and(query_param("first", "0"))
		.and(query_param("max", "100"))
		.respond_with(ResponseTemplate::new(200).set_body_json(page(100)))
		.expect(1)
		.mount(&realm.server)
		.await;
	Mock::given(method("GET"))
		.and(path(USERS_PATH))
		.and(query_param("first", "100"))
		.respond_with(ResponseTemplate::new(200).set_body_json(page(3)))
		.expect(1)
		.mount(&realm.server)
		.await;

	let users = admin(&realm).list_users().await.expect("users");

	assert_eq!(users.len(), 103);
	assert_eq!(users[100].username, "user-0");

	realm.server.verify().await;
}

#[tokio::test]
async fn deleting_a_group_drops_its_cached_mapping() {
	let realm = Realm::start().await;
	let acme = Uuid::new_v4();

	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path(GROUPS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([support::group(
			acme, "Acme", "/Acme"
		)])))
		.mount(&realm.server)
		.await;
	Mock::given(method("DELETE"))
		.and(path(format!("{GROUPS_PATH}/{acme}")))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&realm.server)
		.await;

	realm.resolver.resolve("/Acme").await.expect("resolved");

	assert!(admin(&realm).delete_group(GroupId(acme)).await.expect("deleted"));
	assert_eq!(realm.resolver.cached("/Acme").await, None);

	realm.server.verify().await;
}

#[tokio::test]
async fn realm_roles_are_replaced_by_difference() {
	let realm = Realm::start().await;
	let user = Uuid::new_v4();
	let mappings = format!("{USERS_PATH}/{user}/role-mappings/realm");
	let role = |name: &str| json!({ "id": format!("role-{name}"), "name": name });

	realm.mount_admin_token(1).await;

	Mock::given(method("GET"))
		.and(path("/admin/realms/helpdesk/roles"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			role("agent"),
			role("helpdesk_admin"),
			role("customer-user"),
		])))
		.mount(&realm.server)
		.await;
	Mock::given(method("GET"))
		.and(path(mappings.as_str()))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!([role("customer-user"), role("agent")])),
		)
		.mount(&realm.server)
		.await;
	Mock::given(method("DELETE"))
		.and(path(mappings.as_str()))
		.and(body_string_contains("customer-user"))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&realm.server)
		.await;
	Mock::given(method("POST"))
		.and(path(mappings.as_str()))
		.and(body_string_contains("helpdesk_admin"))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&realm.server)
		.await;

	admin(&realm).set_realm_roles(user, &["agent", "helpdesk_admin"]).await.expect("roles set");

	realm.server.verify().await;
}
