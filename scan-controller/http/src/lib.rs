//! An HTTP scan API client.
//!
//! Each scan is a `POST` of a JSON document naming the changed resource to
//! the target's endpoint, authenticated with the target's bearer token.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use reqwest::{StatusCode, Url};
use scan_controller_core::{NewScanClient, ResourceKey, Revision, ScanClient};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// Builds [`HttpScanClient`]s that share one connection pool.
#[derive(Clone, Debug)]
pub struct NewHttpClient {
    client: reqwest::Client,
}

pub struct HttpScanClient {
    client: reqwest::Client,
    url: Url,
    token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NewClientError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
}

#[derive(Debug, thiserror::Error)]
#[error("scan API responded with {0}")]
pub struct ScanError(pub StatusCode);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest<'a> {
    integration_id: &'a str,
    resource: ResourceRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRef<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_version: Option<&'a str>,
}

// === impl NewHttpClient ===

impl NewHttpClient {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scan-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn endpoint(endpoint: &str) -> Result<Url, NewClientError> {
        let url = Url::parse(endpoint)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(NewClientError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

impl NewScanClient for NewHttpClient {
    fn new_client(&self, endpoint: &str, token: &str) -> anyhow::Result<Arc<dyn ScanClient>> {
        let url = Self::endpoint(endpoint)?;
        Ok(Arc::new(HttpScanClient {
            client: self.client.clone(),
            url,
            token: token.to_string(),
        }))
    }
}

// === impl HttpScanClient ===

#[async_trait::async_trait]
impl ScanClient for HttpScanClient {
    async fn scan(
        &self,
        integration_id: &str,
        key: &ResourceKey,
        revision: &Revision,
    ) -> anyhow::Result<()> {
        let body = ScanRequest::new(integration_id, key, revision);
        let mut req = self.client.post(self.url.clone()).json(&body);
        if !self.token.is_empty() {
            req = req.bearer_auth(&self.token);
        }

        let status = req.send().await?.status();
        if !status.is_success() {
            return Err(ScanError(status).into());
        }
        Ok(())
    }
}

// === impl ScanRequest ===

impl<'a> ScanRequest<'a> {
    fn new(integration_id: &'a str, key: &'a ResourceKey, revision: &'a Revision) -> Self {
        Self {
            integration_id,
            resource: ResourceRef {
                kind: key.kind.as_str(),
                namespace: key.namespace(),
                name: &key.name,
                uid: revision.uid.as_deref(),
                resource_version: revision.resource_version.as_deref(),
            },
        }
    }
}
