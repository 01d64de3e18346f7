//! Collaborator seams for compiling views and managing their cached artifacts.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::types::ViewAddress;

/// Environment dependency that selects the editable rendering of a view.
pub const EDITABLE_DEPENDENCY: &str = "cms.editable";

/// Length of the hex tag that distinguishes compiled artifacts per environment.
pub const CACHE_TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("view `{address}` not found")]
    NotFound { address: String },
    #[error("view `{address}` failed to compile: {message}")]
    Compile { address: String, message: String },
    #[error("view cache operation failed for `{path}`: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("content lookup failed while compiling `{address}`: {source}")]
    Content {
        address: String,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ViewError {
    pub fn compile(address: &ViewAddress, message: impl Into<String>) -> Self {
        Self::Compile {
            address: address.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(address: &ViewAddress) -> Self {
        Self::NotFound {
            address: address.to_string(),
        }
    }

    pub fn cache(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            source,
        }
    }

    /// True when the template itself is missing or broken, as opposed to a
    /// storage or file system failure met while compiling it.
    pub fn is_template_failure(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Compile { .. })
    }
}

/// Named boolean dependencies injected into a compilation.
///
/// Two environments with the same dependencies produce the same cache tag, so
/// each distinct environment maps to exactly one compiled artifact per view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewEnvironment {
    dependencies: BTreeMap<String, bool>,
}

impl ViewEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(&self, name: impl Into<String>, value: bool) -> Self {
        let mut next = self.clone();
        next.dependencies.insert(name.into(), value);
        next
    }

    pub fn dependency(&self, name: &str) -> Option<bool> {
        self.dependencies.get(name).copied()
    }

    pub fn is_editable(&self) -> bool {
        self.dependency(EDITABLE_DEPENDENCY).unwrap_or(false)
    }

    pub fn cache_tag(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.dependencies {
            hasher.update(name.as_bytes());
            hasher.update(if *value { b"=1;" } else { b"=0;" });
        }
        let mut tag = hex::encode(hasher.finalize());
        tag.truncate(CACHE_TAG_LEN);
        tag
    }
}

/// Output of a single compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledView {
    pub address: ViewAddress,
    pub editable: bool,
    pub path: PathBuf,
    pub html: String,
}

#[async_trait]
pub trait ViewCompiler: Send + Sync {
    /// Base environment that callers extend with their own dependencies.
    fn environment(&self) -> ViewEnvironment;

    /// Compile `address` under `environment`; `force` skips any cached artifact.
    async fn compile(
        &self,
        address: &ViewAddress,
        environment: &ViewEnvironment,
        force: bool,
    ) -> Result<CompiledView, ViewError>;
}

#[async_trait]
pub trait ViewCacheLocator: Send + Sync {
    /// Every compiled artifact currently cached for `address`, across environments.
    async fn cache_files(&self, address: &ViewAddress) -> Result<Vec<PathBuf>, ViewError>;
}

#[async_trait]
pub trait FileManager: Send + Sync {
    async fn delete(&self, path: &Path) -> Result<(), ViewError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_tag_depends_on_dependencies_only() {
        let base = ViewEnvironment::new();
        let editable = base.with_dependency(EDITABLE_DEPENDENCY, true);
        let plain = base.with_dependency(EDITABLE_DEPENDENCY, false);

        assert_eq!(editable.cache_tag().len(), CACHE_TAG_LEN);
        assert_ne!(editable.cache_tag(), plain.cache_tag());
        assert_eq!(
            editable.cache_tag(),
            ViewEnvironment::new()
                .with_dependency(EDITABLE_DEPENDENCY, true)
                .cache_tag()
        );
        assert!(editable.is_editable());
        assert!(!plain.is_editable());
        assert!(!base.is_editable());
    }

    #[test]
    fn with_dependency_leaves_original_untouched() {
        let base = ViewEnvironment::new().with_dependency("theme.dark", true);
        let extended = base.with_dependency(EDITABLE_DEPENDENCY, true);

        assert_eq!(base.dependency(EDITABLE_DEPENDENCY), None);
        assert_eq!(extended.dependency("theme.dark"), Some(true));
    }
}
