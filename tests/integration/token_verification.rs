//! Bearer verification against the realm's published signing keys.

// crates.io
use helpdesk_auth::{Authenticator, Error, Role, boundary};
use http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION};
use uuid::Uuid;
use wiremock::{
	Mock, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::support::{self, JWKS_PATH, Realm};

fn bearer(token: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).expect("header"));

	headers
}

#[tokio::test]
async fn verifies_tokens_with_one_key_fetch() {
	let realm = Realm::start().await;

	realm.mount_jwks(1).await;

	let subject = Uuid::new_v4();
	let token = support::mint(&realm.claims(subject, &["agent", "helpdesk_admin"], &["/Acme"]));

	for _ in 0..3 {
		let claims = realm.verifier.verify(&token).await.expect("verified");

		assert_eq!(claims.subject, subject);
		assert!(claims.has_role(Role::Agent));
		assert!(claims.has_role(Role::HelpdeskAdmin));
		assert_eq!(claims.tenant_groups, vec!["/Acme".to_owned()]);
	}

	assert!(realm.keys.fetched_at().await.is_some());
	assert_eq!(realm.keys.stats().snapshot().cache_hits, 2);

	realm.server.verify().await;
}

#[tokio::test]
async fn tokens_for_another_audience_are_rejected() {
	let realm = Realm::start().await;

	realm.mount_jwks(1).await;

	let mut claims = realm.claims(Uuid::new_v4(), &["agent"], &[]);

	claims["aud"] = "billing-api".into();

	let err = realm.verifier.verify(&support::mint(&claims)).await.unwrap_err();

	assert!(matches!(err, Error::AuthenticationFailed));
	assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn key_endpoint_outage_is_a_service_unavailable() {
	let realm = Realm::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(502))
		.expect(2)
		.mount(&realm.server)
		.await;

	let token = support::mint(&realm.claims(Uuid::new_v4(), &["agent"], &[]));

	for _ in 0..2 {
		let err = realm.verifier.verify(&token).await.unwrap_err();

		assert!(matches!(err, Error::DependencyUnavailable { dependency: "jwks", .. }));

		let response = boundary::error_response(&err);

		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	realm.server.verify().await;
}

#[tokio::test]
async fn missing_or_malformed_bearer_answers_with_a_challenge() {
	let realm = Realm::start().await;
	let authenticator =
		Authenticator::new(realm.verifier.clone(), realm.resolver.clone(), realm.directory.clone());

	for headers in [HeaderMap::new(), bearer("not-a-jwt")] {
		let err = authenticator.authenticate(&headers).await.unwrap_err();
		let response = boundary::error_response(&err);

		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
		assert!(response.headers().contains_key(http::header::WWW_AUTHENTICATE));
		assert!(response.body().contains("detail"));
	}
}
