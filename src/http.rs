//! HTTP client construction and JSON exchange helpers for IdP calls.

// crates.io
use reqwest::{Client, RequestBuilder, Response, redirect::Policy};
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, config::IdpConfig};

/// Build the shared reqwest client used for every outbound IdP call.
///
/// The per-call timeout bounds the whole exchange; connect is bounded by the same value.
pub fn build_client(config: &IdpConfig) -> Result<Client> {
	let timeout = config.http_timeout();
	let client = Client::builder()
		.redirect(Policy::limited(5))
		.user_agent(format!("helpdesk-auth/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(timeout)
		.timeout(timeout)
		.build()?;

	Ok(client)
}

/// Send a request and turn a non-success status into [`Error::HttpStatus`].
pub async fn send(request: RequestBuilder) -> Result<Response> {
	let start = Instant::now();
	let response = request.send().await?;
	let status = response.status();
	let url = response.url().clone();

	tracing::debug!(%url, %status, elapsed = ?start.elapsed(), "idp call complete");

	if status.is_success() {
		Ok(response)
	} else {
		let body = response.text().await.ok().filter(|body| !body.is_empty());

		Err(Error::HttpStatus { status, url, body })
	}
}

/// Send a request and decode the JSON body.
///
/// Bodies are decoded from bytes so a malformed payload surfaces as [`Error::Serde`] rather than a
/// transport failure.
pub async fn send_json<T>(request: RequestBuilder) -> Result<T>
where
	T: DeserializeOwned,
{
	let bytes = send(request).await?.bytes().await?;

	Ok(serde_json::from_slice(&bytes)?)
}
