use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::application::views::{
    CACHE_TAG_LEN, FileManager, ViewCacheLocator, ViewEnvironment, ViewError,
};
use crate::domain::types::ViewAddress;

const ARTIFACT_EXTENSION: &str = "html";

/// Layout of compiled artifacts: `<root>/<namespace>/<view>.<tag>.html`.
#[derive(Debug, Clone)]
pub struct FsViewCache {
    root: PathBuf,
}

impl FsViewCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, address: &ViewAddress, environment: &ViewEnvironment) -> PathBuf {
        let (dir, stem) = self.split(address);
        dir.join(format!(
            "{stem}.{}.{ARTIFACT_EXTENSION}",
            environment.cache_tag()
        ))
    }

    fn split(&self, address: &ViewAddress) -> (PathBuf, String) {
        let mut dir = self.root.join(address.namespace());
        let mut segments: Vec<&str> = address.segments().collect();
        let stem = segments.pop().unwrap_or_default().to_string();
        for segment in segments {
            dir.push(segment);
        }
        (dir, stem)
    }
}

fn is_artifact_of(file_name: &str, stem: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(stem) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('.') else {
        return false;
    };
    let Some(tag) = rest.strip_suffix(ARTIFACT_EXTENSION) else {
        return false;
    };
    let Some(tag) = tag.strip_suffix('.') else {
        return false;
    };
    tag.len() == CACHE_TAG_LEN && tag.bytes().all(|b| b.is_ascii_hexdigit())
}

#[async_trait]
impl ViewCacheLocator for FsViewCache {
    async fn cache_files(&self, address: &ViewAddress) -> Result<Vec<PathBuf>, ViewError> {
        let (dir, stem) = self.split(address);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ViewError::cache(dir, err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ViewError::cache(&dir, err))?
        {
            let name = entry.file_name();
            if name.to_str().is_some_and(|name| is_artifact_of(name, &stem)) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Deletes cached artifacts from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileManager;

#[async_trait]
impl FileManager for FsFileManager {
    async fn delete(&self, path: &Path) -> Result<(), ViewError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(
                    target = "tessera::views",
                    path = %path.display(),
                    "cached artifact removed"
                );
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ViewError::cache(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::views::EDITABLE_DEPENDENCY;

    #[test]
    fn artifact_path_nests_view_segments() {
        let cache = FsViewCache::new("/var/cache/tessera");
        let address = ViewAddress::new("site", "blog/index").expect("address");
        let env = ViewEnvironment::new().with_dependency(EDITABLE_DEPENDENCY, true);

        let path = cache.artifact_path(&address, &env);
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/var/cache/tessera/site/blog/index.{}.html",
                env.cache_tag()
            ))
        );
    }

    #[test]
    fn artifact_names_require_a_full_tag() {
        assert!(is_artifact_of("index.0123456789abcdef.html", "index"));
        assert!(!is_artifact_of("index.html", "index"));
        assert!(!is_artifact_of("index.0123.html", "index"));
        assert!(!is_artifact_of("index-old.0123456789abcdef.html", "index"));
        assert!(!is_artifact_of("index.0123456789abcdeg.html", "index"));
    }

    #[tokio::test]
    async fn cache_files_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FsViewCache::new(dir.path());
        let address = ViewAddress::new("site", "home").expect("address");

        let files = cache.cache_files(&address).await.expect("listing");
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_file_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        FsFileManager
            .delete(&dir.path().join("gone.html"))
            .await
            .expect("delete");
    }
}
