//! Identity resolution for incoming upgrade requests.
//!
//! The relay does not authenticate anyone itself. A resolver reads the
//! identity an upstream authenticator has already established and the relay
//! trusts it as-is.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use relay_core::{AuthError, Identity};
use relay_settings::{IdentitySettings, IdentitySource};

/// The parts of a WebSocket upgrade request a resolver may inspect.
#[derive(Clone, Debug, Default)]
pub struct ConnectRequest {
    /// Request headers.
    pub headers: HeaderMap,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
}

impl ConnectRequest {
    /// Build a request from headers and query parameters.
    pub fn new(headers: HeaderMap, query: HashMap<String, String>) -> Self {
        Self { headers, query }
    }
}

/// Turns an upgrade request into the identity the connection is filed under.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the identity, or refuse the connection.
    async fn resolve(&self, request: &ConnectRequest) -> Result<Identity, AuthError>;
}

/// Reads the identity from a header set by an authenticating proxy.
#[derive(Clone, Debug)]
pub struct HeaderIdentityResolver {
    header: String,
}

impl HeaderIdentityResolver {
    /// Resolver reading `header`.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, request: &ConnectRequest) -> Result<Identity, AuthError> {
        let value = request
            .headers
            .get(self.header.as_str())
            .ok_or_else(|| AuthError::Missing(format!("header {}", self.header)))?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::Invalid(format!("header {} is not valid UTF-8", self.header)))?;
        non_empty(value, || format!("header {} is empty", self.header))
    }
}

/// Reads the identity from a query parameter.
#[derive(Clone, Debug)]
pub struct QueryIdentityResolver {
    param: String,
}

impl QueryIdentityResolver {
    /// Resolver reading `param`.
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for QueryIdentityResolver {
    async fn resolve(&self, request: &ConnectRequest) -> Result<Identity, AuthError> {
        let value = request
            .query
            .get(&self.param)
            .ok_or_else(|| AuthError::Missing(format!("query parameter {}", self.param)))?;
        non_empty(value, || format!("query parameter {} is empty", self.param))
    }
}

/// Surrounding whitespace is stripped whatever the source.
fn non_empty(value: &str, describe: impl FnOnce() -> String) -> Result<Identity, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AuthError::Invalid(describe()))
    } else {
        Ok(Identity::from(value))
    }
}

/// Build the resolver selected in settings.
pub fn resolver_from_settings(settings: &IdentitySettings) -> Arc<dyn IdentityResolver> {
    match settings.source {
        IdentitySource::Header => Arc::new(HeaderIdentityResolver::new(&settings.header)),
        IdentitySource::Query => Arc::new(QueryIdentityResolver::new(&settings.query_param)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    fn with_header(name: &'static str, value: HeaderValue) -> ConnectRequest {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(name, value);
        ConnectRequest::new(headers, HashMap::new())
    }

    fn with_query(name: &str, value: &str) -> ConnectRequest {
        let query = HashMap::from([(name.to_string(), value.to_string())]);
        ConnectRequest::new(HeaderMap::new(), query)
    }

    #[tokio::test]
    async fn header_resolver_reads_identity() {
        let resolver = HeaderIdentityResolver::new("x-relay-identity");
        let req = with_header("x-relay-identity", HeaderValue::from_static("alice@x.com"));
        let identity = resolver.resolve(&req).await.unwrap();
        assert_eq!(identity.as_str(), "alice@x.com");
    }

    #[tokio::test]
    async fn header_lookup_is_case_insensitive() {
        let resolver = HeaderIdentityResolver::new("X-Relay-Identity");
        let req = with_header("x-relay-identity", HeaderValue::from_static("bob@x.com"));
        assert_eq!(resolver.resolve(&req).await.unwrap().as_str(), "bob@x.com");
    }

    #[tokio::test]
    async fn header_missing() {
        let resolver = HeaderIdentityResolver::new("x-relay-identity");
        assert_matches!(
            resolver.resolve(&ConnectRequest::default()).await,
            Err(AuthError::Missing(place)) if place == "header x-relay-identity"
        );
    }

    #[tokio::test]
    async fn header_blank_is_invalid() {
        let resolver = HeaderIdentityResolver::new("x-relay-identity");
        let req = with_header("x-relay-identity", HeaderValue::from_static("  "));
        assert_matches!(resolver.resolve(&req).await, Err(AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn header_non_utf8_is_invalid() {
        let resolver = HeaderIdentityResolver::new("x-relay-identity");
        let req = with_header(
            "x-relay-identity",
            HeaderValue::from_bytes(&[0xe9, 0x40]).unwrap(),
        );
        assert_matches!(resolver.resolve(&req).await, Err(AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn query_resolver_reads_identity() {
        let resolver = QueryIdentityResolver::new("identity");
        let req = with_query("identity", "carol@x.com");
        assert_eq!(resolver.resolve(&req).await.unwrap().as_str(), "carol@x.com");
    }

    #[tokio::test]
    async fn query_missing_and_empty() {
        let resolver = QueryIdentityResolver::new("identity");
        assert_matches!(
            resolver.resolve(&with_query("other", "x")).await,
            Err(AuthError::Missing(_))
        );
        assert_matches!(
            resolver.resolve(&with_query("identity", "")).await,
            Err(AuthError::Invalid(_))
        );
        assert_matches!(
            resolver.resolve(&with_query("identity", "   ")).await,
            Err(AuthError::Invalid(_))
        );
    }

    #[tokio::test]
    async fn both_sources_trim_to_the_same_identity() {
        let by_header = HeaderIdentityResolver::new("x-relay-identity");
        let by_query = QueryIdentityResolver::new("identity");
        let from_header = by_header
            .resolve(&with_header(
                "x-relay-identity",
                HeaderValue::from_static(" erin@x.com "),
            ))
            .await
            .unwrap();
        let from_query = by_query
            .resolve(&with_query("identity", " erin@x.com\t"))
            .await
            .unwrap();
        assert_eq!(from_header, from_query);
        assert_eq!(from_query.as_str(), "erin@x.com");
    }

    #[tokio::test]
    async fn settings_select_resolver() {
        let mut settings = IdentitySettings::default();
        let by_header = resolver_from_settings(&settings);
        let req = with_header("x-relay-identity", HeaderValue::from_static("dave@x.com"));
        assert!(by_header.resolve(&req).await.is_ok());

        settings.source = IdentitySource::Query;
        let by_query = resolver_from_settings(&settings);
        assert!(by_query.resolve(&req).await.is_err());
        assert!(by_query.resolve(&with_query("identity", "dave@x.com")).await.is_ok());
    }
}
