//! Mock realm, token minting, and an in-memory tenant directory shared by the integration tests.

// std
use std::sync::{Arc, Mutex};
// crates.io
use async_trait::async_trait;
use chrono::Utc;
use helpdesk_auth::{
	AdminCredentialCache, GroupId, IdpConfig, KeycloakClient, Result, SigningKeyCache, Tenant,
	TenantDirectory, TenantId, TenantResolver, TokenVerifier,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string_contains, method, path},
};

pub const REALM: &str = "helpdesk";
pub const AUDIENCE: &str = "helpdesk-api";
pub const KID: &str = "helpdesk-signing-1";
pub const JWKS_PATH: &str = "/realms/helpdesk/protocol/openid-connect/certs";
pub const TOKEN_PATH: &str = "/realms/helpdesk/protocol/openid-connect/token";
pub const GROUPS_PATH: &str = "/admin/realms/helpdesk/groups";

const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing_key.pem");
const JWKS: &str = include_str!("../fixtures/jwks.json");

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

pub fn issuer(server: &MockServer) -> String {
	format!("{}/realms/{REALM}", server.uri())
}

pub fn config(server: &MockServer) -> IdpConfig {
	IdpConfig::new(issuer(server), AUDIENCE)
		.expect("config")
		.with_require_https(false)
		.with_admin_credentials("helpdesk-admin", "s3cret")
}

/// Every collaborator wired against one mock realm.
pub struct Realm {
	pub server: MockServer,
	pub client: KeycloakClient,
	pub keys: SigningKeyCache,
	pub tokens: AdminCredentialCache,
	pub verifier: TokenVerifier,
	pub resolver: TenantResolver,
	pub directory: Arc<MemoryDirectory>,
}
impl Realm {
	pub async fn start() -> Self {
		init_tracing();

		let server = MockServer::start().await;
		let config = config(&server);
		let client = KeycloakClient::new(&config).expect("client");
		let idp = Arc::new(client.clone());
		let keys = SigningKeyCache::new(idp.clone());
		let tokens = AdminCredentialCache::new(idp.clone());
		let verifier = TokenVerifier::new(&config, keys.clone());
		let resolver = TenantResolver::new(idp, tokens.clone());

		Self {
			server,
			client,
			keys,
			tokens,
			verifier,
			resolver,
			directory: Arc::new(MemoryDirectory::default()),
		}
	}

	pub fn claims(&self, subject: Uuid, roles: &[&str], groups: &[&str]) -> Value {
		json!({
			"sub": subject.to_string(),
			"iss": issuer(&self.server),
			"aud": AUDIENCE,
			"iat": Utc::now().timestamp(),
			"exp": Utc::now().timestamp() + 300,
			"realm_access": { "roles": roles },
			"groups": groups,
		})
	}

	pub async fn mount_jwks(&self, expected_calls: u64) {
		Mock::given(method("GET"))
			.and(path(JWKS_PATH))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_string(JWKS)
					.insert_header("content-type", "application/json"),
			)
			.expect(expected_calls)
			.mount(&self.server)
			.await;
	}

	pub async fn mount_admin_token(&self, expected_calls: u64) {
		Mock::given(method("POST"))
			.and(path(TOKEN_PATH))
			.and(body_string_contains("grant_type=client_credentials"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({ "access_token": "admin-token", "expires_in": 300 })),
			)
			.expect(expected_calls)
			.mount(&self.server)
			.await;
	}
}

pub fn mint(claims: &Value) -> String {
	let mut header = Header::new(Algorithm::RS256);

	header.kid = Some(KID.to_owned());

	encode(&header, claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).expect("rsa key")).expect("token")
}

pub fn group(id: Uuid, name: &str, path: &str) -> Value {
	json!({ "id": id.to_string(), "name": name, "path": path, "subGroups": [] })
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
	tenants: Mutex<Vec<Tenant>>,
}
impl MemoryDirectory {
	pub fn insert(&self, name: &str, external_group_id: Option<GroupId>) -> Tenant {
		let tenant = Tenant { id: TenantId(Uuid::new_v4()), name: name.to_owned(), external_group_id };

		self.tenants.lock().expect("tenants").push(tenant.clone());

		tenant
	}

	pub fn len(&self) -> usize {
		self.tenants.lock().expect("tenants").len()
	}

	fn find(&self, predicate: impl Fn(&Tenant) -> bool) -> Option<Tenant> {
		self.tenants.lock().expect("tenants").iter().find(|tenant| predicate(tenant)).cloned()
	}
}
#[async_trait]
impl TenantDirectory for MemoryDirectory {
	async fn lookup_tenant_by_local_id(&self, id: TenantId) -> Result<Option<Tenant>> {
		Ok(self.find(|tenant| tenant.id == id))
	}

	async fn lookup_tenant_by_external_group_id(&self, group: GroupId) -> Result<Option<Tenant>> {
		Ok(self.find(|tenant| tenant.external_group_id == Some(group)))
	}

	async fn lookup_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
		Ok(self.find(|tenant| tenant.name == name))
	}

	async fn create_tenant(&self, name: &str, external_group_id: GroupId) -> Result<Tenant> {
		Ok(self.insert(name, Some(external_group_id)))
	}
}
