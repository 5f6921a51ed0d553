use crate::NamespaceFilter;
use std::fmt;

/// Tenant configuration for a single scan destination.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TargetSpec {
    pub endpoint: String,
    pub token: String,
    pub integration_id: String,
    pub namespaces: Vec<String>,
    pub namespaces_exclude: Vec<String>,
}

impl TargetSpec {
    pub fn namespace_filter(&self) -> NamespaceFilter {
        NamespaceFilter::new(&self.namespaces, &self.namespaces_exclude)
    }
}

// The token is a credential and must not end up in logs.
impl fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSpec")
            .field("endpoint", &self.endpoint)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("integration_id", &self.integration_id)
            .field("namespaces", &self.namespaces)
            .field("namespaces_exclude", &self.namespaces_exclude)
            .finish()
    }
}
