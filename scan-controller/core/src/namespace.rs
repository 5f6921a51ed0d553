use wildmatch::WildMatch;

/// Selects the namespaces whose resources may be dispatched to a target.
///
/// A non-empty include list admits only namespaces matching one of its
/// patterns; otherwise every namespace not matching an exclude pattern is
/// admitted. Cluster-scoped resources are always admitted.
#[derive(Clone, Debug, Default)]
pub struct NamespaceFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

/// A namespace glob supporting `*` and `?`.
///
/// Patterns that can never match a namespace name are kept as `Invalid` so
/// that they match nothing, rather than disappearing from the filter.
#[derive(Clone, Debug)]
pub enum Pattern {
    Glob(WildMatch),
    Invalid(InvalidPattern),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid namespace pattern {pattern:?}: {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    reason: &'static str,
}

// === impl NamespaceFilter ===

impl NamespaceFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: include
                .into_iter()
                .map(|p| Pattern::new(p.as_ref()))
                .collect(),
            exclude: exclude
                .into_iter()
                .map(|p| Pattern::new(p.as_ref()))
                .collect(),
        }
    }

    /// Returns true if resources in `namespace` may be dispatched.
    /// `None` denotes a cluster-scoped resource.
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        let Some(ns) = namespace else {
            return true;
        };

        if !self.include.is_empty() {
            return self.include.iter().any(|p| p.matches(ns));
        }

        !self.exclude.iter().any(|p| p.matches(ns))
    }

    pub fn invalid_patterns(&self) -> impl Iterator<Item = &InvalidPattern> {
        self.include
            .iter()
            .chain(self.exclude.iter())
            .filter_map(|p| match p {
                Pattern::Invalid(error) => Some(error),
                Pattern::Glob(_) => None,
            })
    }
}

// === impl Pattern ===

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        match Self::validate(pattern) {
            Ok(()) => Self::Glob(WildMatch::new(pattern)),
            Err(reason) => Self::Invalid(InvalidPattern {
                pattern: pattern.to_string(),
                reason,
            }),
        }
    }

    // Namespace names are DNS-1123 labels, so anything outside that alphabet
    // (besides the wildcards) can never match.
    fn validate(pattern: &str) -> Result<(), &'static str> {
        if pattern.is_empty() {
            return Err("empty pattern");
        }
        if !pattern
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '*' | '?'))
        {
            return Err("expected lowercase alphanumerics, '-', '*', or '?'");
        }
        Ok(())
    }

    pub fn matches(&self, namespace: &str) -> bool {
        match self {
            Self::Glob(glob) => glob.matches(namespace),
            Self::Invalid(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everything() {
        let filter = NamespaceFilter::default();
        assert!(filter.allows(Some("default")));
        assert!(filter.allows(Some("kube-system")));
        assert!(filter.allows(None));
    }

    #[test]
    fn include_list() {
        let filter = NamespaceFilter::new(["ns-a"], Vec::<String>::new());
        assert!(filter.allows(Some("ns-a")));
        assert!(!filter.allows(Some("ns-b")));
    }

    #[test]
    fn exclude_list() {
        let filter = NamespaceFilter::new(Vec::<String>::new(), ["ns-b"]);
        assert!(filter.allows(Some("ns-a")));
        assert!(!filter.allows(Some("ns-b")));
    }

    #[test]
    fn include_takes_precedence_over_exclude() {
        let filter = NamespaceFilter::new(["team-*"], ["team-a"]);
        assert!(filter.allows(Some("team-a")));
        assert!(filter.allows(Some("team-b")));
        assert!(!filter.allows(Some("default")));
    }

    #[test]
    fn globs() {
        let filter = NamespaceFilter::new(Vec::<String>::new(), ["kube-*", "tmp-?"]);
        assert!(!filter.allows(Some("kube-system")));
        assert!(!filter.allows(Some("kube-public")));
        assert!(!filter.allows(Some("tmp-1")));
        assert!(filter.allows(Some("tmp-12")));
        assert!(filter.allows(Some("default")));
    }

    #[test]
    fn cluster_scoped_bypasses_filter() {
        let filter = NamespaceFilter::new(["ns-a"], ["*"]);
        assert!(filter.allows(None));
    }

    #[test]
    fn invalid_patterns_never_match() {
        // An invalid include pattern must not widen the filter to everything.
        let filter = NamespaceFilter::new(["Prod_[1]"], Vec::<String>::new());
        assert!(!filter.allows(Some("prod_1")));
        assert!(!filter.allows(Some("default")));
        assert_eq!(filter.invalid_patterns().count(), 1);

        // An invalid exclude pattern excludes nothing.
        let filter = NamespaceFilter::new(Vec::<String>::new(), ["", "ns-b"]);
        assert!(filter.allows(Some("ns-a")));
        assert!(!filter.allows(Some("ns-b")));
        assert_eq!(
            filter
                .invalid_patterns()
                .map(|e| e.pattern.as_str())
                .collect::<Vec<_>>(),
            vec![""]
        );
    }
}
