//! End-to-end tests against a mocked identity provider.

mod admin_provisioning;
mod support;
mod tenant_resolution;
mod token_verification;
