use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::pieces::PieceCatalog;
use crate::application::repos::RepoError;
use crate::application::views::{CompiledView, ViewCompiler, ViewEnvironment, ViewError};
use crate::domain::entities::PageMetaFields;
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

use super::cache::FsViewCache;
use super::markup::{self, ResolvedSlots, Slot, SlotKind};

const SOURCE_EXTENSION: &str = "html";

/// Compiles templates from `<source>/<namespace>/<view>.html` into cached
/// artifacts, creating any piece or page meta the template references.
#[derive(Clone)]
pub struct FsViewEngine {
    source_dir: PathBuf,
    cache: FsViewCache,
    catalog: Arc<PieceCatalog>,
    environment: ViewEnvironment,
}

impl FsViewEngine {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        cache: FsViewCache,
        catalog: Arc<PieceCatalog>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            cache,
            catalog,
            environment: ViewEnvironment::new(),
        }
    }

    pub fn source_path(&self, address: &ViewAddress) -> PathBuf {
        let mut path = self.source_dir.join(address.namespace());
        let mut segments = address.segments().peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.{SOURCE_EXTENSION}"));
            }
        }
        path
    }

    async fn read_source(&self, address: &ViewAddress) -> Result<String, ViewError> {
        match tokio::fs::read_to_string(self.source_path(address)).await {
            Ok(source) => Ok(source),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ViewError::not_found(address)),
            Err(err) => Err(ViewError::Io(err)),
        }
    }

    async fn resolve(
        &self,
        address: &ViewAddress,
        slots: Vec<Slot>,
    ) -> Result<ResolvedSlots, ViewError> {
        let content_error = |source: RepoError| ViewError::Content {
            address: address.to_string(),
            source,
        };

        let mut resolved = ResolvedSlots::default();
        for slot in slots {
            let code = ContentCode::parse(&slot.code)
                .map_err(|err| ViewError::compile(address, err.to_string()))?;

            match slot.kind {
                SlotKind::Piece => {
                    if resolved.pieces.contains_key(code.as_str()) {
                        continue;
                    }
                    let piece = self
                        .catalog
                        .get_piece(&code, &slot.default, address)
                        .await
                        .map_err(content_error)?;
                    resolved.pieces.insert(code.to_string(), piece.content);
                }
                SlotKind::Meta => {
                    let defaults = PageMetaFields {
                        title: Some(slot.default).filter(|title| !title.is_empty()),
                        ..PageMetaFields::default()
                    };
                    let key = MetaKey::new(address.clone(), code.clone());
                    let meta = self
                        .catalog
                        .get_meta(&key, defaults)
                        .await
                        .map_err(content_error)?;
                    resolved.meta.insert(code.to_string(), meta.fields());
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ViewCompiler for FsViewEngine {
    fn environment(&self) -> ViewEnvironment {
        self.environment.clone()
    }

    async fn compile(
        &self,
        address: &ViewAddress,
        environment: &ViewEnvironment,
        force: bool,
    ) -> Result<CompiledView, ViewError> {
        let started_at = Instant::now();
        let editable = environment.is_editable();
        let path = self.cache.artifact_path(address, environment);

        if !force {
            match tokio::fs::read_to_string(&path).await {
                Ok(html) => {
                    return Ok(CompiledView {
                        address: address.clone(),
                        editable,
                        path,
                        html,
                    });
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "tessera::views",
                        op = "views::compile",
                        result = "cache_read_error",
                        cache_path = %path.display(),
                        error = %err,
                        "failed to read compiled view; recompiling"
                    );
                }
            }
        }

        let source = self.read_source(address).await?;
        let slots = markup::collect_slots(&source)
            .map_err(|err| ViewError::compile(address, err.to_string()))?;
        let resolved = self.resolve(address, slots).await?;
        let html = markup::render(&source, address, &resolved, editable)
            .map_err(|err| ViewError::compile(address, err.to_string()))?;

        write_artifact(&path, &html).await?;

        info!(
            target = "tessera::views",
            op = "views::compile",
            result = "compiled",
            namespace = address.namespace(),
            view = address.view(),
            editable,
            forced = force,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            cache_path = %path.display(),
            "view compiled"
        );

        Ok(CompiledView {
            address: address.clone(),
            editable,
            path,
            html,
        })
    }
}

/// Write through a temporary file in the target directory so readers never
/// observe a partial artifact.
async fn write_artifact(path: &Path, html: &str) -> Result<(), ViewError> {
    let Some(dir) = path.parent().map(Path::to_path_buf) else {
        return Err(ViewError::cache(
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "artifact path has no parent"),
        ));
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| ViewError::cache(&dir, err))?;

    let target = path.to_path_buf();
    let contents = html.to_owned();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix(".compile-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        file.persist(&target).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result);

    result.map_err(|err| ViewError::cache(path, err))
}
