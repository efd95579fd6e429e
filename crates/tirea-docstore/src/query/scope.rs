use crate::Path;
use serde::{Deserialize, Serialize};

/// Allow/deny path-prefix filter for query reads.
///
/// A path is readable when no deny entry is a prefix of it and either the
/// allow list is empty or one of its entries is a prefix of it.
///
/// ```
/// use tirea_docstore::{path, query::CapabilityScope};
///
/// let scope = CapabilityScope::new().allow(path!("public")).deny(path!("public", "secret"));
/// assert!(scope.can_read(&path!("public", "title")));
/// assert!(!scope.can_read(&path!("public", "secret", "key")));
/// assert!(!scope.can_read(&path!("private")));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityScope {
    #[serde(default)]
    pub allow: Vec<Path>,
    #[serde(default)]
    pub deny: Vec<Path>,
}

impl CapabilityScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, path: Path) -> Self {
        self.allow.push(path);
        self
    }

    pub fn deny(mut self, path: Path) -> Self {
        self.deny.push(path);
        self
    }

    pub fn can_read(&self, path: &Path) -> bool {
        if self.deny.iter().any(|d| d.is_prefix_of(path)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a.is_prefix_of(path))
    }
}
