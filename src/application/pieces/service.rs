use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::access::{Actor, PermissionGate};
use crate::application::repos::{RepoError, UpdatePageMetaParams};
use crate::application::views::{
    CompiledView, EDITABLE_DEPENDENCY, FileManager, ViewCacheLocator, ViewCompiler, ViewError,
};
use crate::domain::entities::{PageMetaFields, PageMetaRecord, PieceEntry, PieceRecord};
use crate::domain::error::DomainError;
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

use super::catalog::PieceCatalog;

pub const DEFAULT_EDIT_PERMISSION: &str = "cms.edit";

#[derive(Debug, Error)]
pub enum PieceError {
    #[error("actor is not allowed to edit content")]
    Forbidden,
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    View(#[from] ViewError),
}

/// A location removed during a refresh. The stored address may no longer be
/// a valid [`ViewAddress`], so the raw parts are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedLocation {
    pub namespace: String,
    pub view: String,
}

/// Outcome of refreshing every location a piece appears in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub compiled: Vec<ViewAddress>,
    /// Locations removed because their view no longer compiles.
    pub pruned: Vec<PrunedLocation>,
}

#[derive(Clone)]
pub struct PieceService {
    catalog: Arc<PieceCatalog>,
    views: Arc<dyn ViewCompiler>,
    cache: Arc<dyn ViewCacheLocator>,
    files: Arc<dyn FileManager>,
    permissions: Arc<dyn PermissionGate>,
    edit_permission: String,
}

impl PieceService {
    pub fn new(
        catalog: Arc<PieceCatalog>,
        views: Arc<dyn ViewCompiler>,
        cache: Arc<dyn ViewCacheLocator>,
        files: Arc<dyn FileManager>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        Self {
            catalog,
            views,
            cache,
            files,
            permissions,
            edit_permission: DEFAULT_EDIT_PERMISSION.to_string(),
        }
    }

    pub fn with_edit_permission(mut self, permission: impl Into<String>) -> Self {
        self.edit_permission = permission.into();
        self
    }

    /// Anonymous callers never edit; everyone else needs the edit permission.
    pub fn can_edit(&self, actor: Option<&Actor>) -> bool {
        match actor {
            Some(actor) => self.permissions.allows(actor, &self.edit_permission),
            None => false,
        }
    }

    pub async fn find_piece(&self, code: &ContentCode) -> Result<Option<PieceRecord>, RepoError> {
        self.catalog.find_piece(code).await
    }

    pub async fn find_meta(&self, key: &MetaKey) -> Result<Option<PageMetaRecord>, RepoError> {
        self.catalog.find_meta(key).await
    }

    pub async fn get_piece(
        &self,
        code: &ContentCode,
        default_content: &str,
        address: &ViewAddress,
    ) -> Result<PieceRecord, RepoError> {
        self.catalog.get_piece(code, default_content, address).await
    }

    pub async fn get_meta(
        &self,
        key: &MetaKey,
        defaults: PageMetaFields,
    ) -> Result<PageMetaRecord, RepoError> {
        self.catalog.get_meta(key, defaults).await
    }

    pub async fn ensure_location(
        &self,
        piece: PieceEntry,
        address: &ViewAddress,
    ) -> Result<PieceRecord, RepoError> {
        self.catalog.ensure_location(piece, address).await
    }

    /// Drop every cached artifact of `address` and rebuild both the editable and
    /// the plain rendering.
    pub async fn compile_view(&self, address: &ViewAddress) -> Result<(), ViewError> {
        let stale = self.cache.cache_files(address).await?;
        for path in &stale {
            self.files.delete(path).await?;
        }
        if !stale.is_empty() {
            counter!("tessera_view_cache_evicted_total").increment(stale.len() as u64);
        }

        let base = self.views.environment();
        for editable in [true, false] {
            let environment = base.with_dependency(EDITABLE_DEPENDENCY, editable);
            if let Err(err) = self.views.compile(address, &environment, true).await {
                counter!("tessera_view_compile_failed_total").increment(1);
                return Err(err);
            }
            counter!("tessera_view_compile_total").increment(1);
        }

        debug!(
            target = "tessera::pieces",
            namespace = address.namespace(),
            view = address.view(),
            evicted = stale.len(),
            "view recompiled"
        );
        Ok(())
    }

    /// Recompile every location of `piece`. A location whose template is
    /// missing, broken or unaddressable is deleted and the remaining locations
    /// are still refreshed; storage and cache failures abort the refresh and
    /// leave every location in place.
    pub async fn refresh_piece(&self, piece: &PieceRecord) -> Result<RefreshReport, PieceError> {
        let locations = self.catalog.pieces().list_locations(piece.id).await?;
        let mut report = RefreshReport::default();

        for location in locations {
            let failure = match location.address() {
                Ok(address) => match self.compile_view(&address).await {
                    Ok(()) => {
                        report.compiled.push(address);
                        continue;
                    }
                    Err(err) if err.is_template_failure() => err.to_string(),
                    Err(err) => {
                        error!(
                            target = "tessera::pieces",
                            code = %piece.code,
                            namespace = %location.namespace,
                            view = %location.view,
                            error = %err,
                            "refresh aborted"
                        );
                        return Err(err.into());
                    }
                },
                Err(err) => err.to_string(),
            };

            warn!(
                target = "tessera::pieces",
                code = %piece.code,
                namespace = %location.namespace,
                view = %location.view,
                error = %failure,
                "view failed to compile; removing piece location"
            );
            self.catalog.pieces().delete_location(location.id).await?;
            counter!("tessera_piece_location_pruned_total").increment(1);
            report.pruned.push(PrunedLocation {
                namespace: location.namespace,
                view: location.view,
            });
        }

        info!(
            target = "tessera::pieces",
            code = %piece.code,
            compiled = report.compiled.len(),
            pruned = report.pruned.len(),
            "piece refreshed"
        );
        Ok(report)
    }

    pub async fn refresh_meta(&self, meta: &PageMetaRecord) -> Result<(), PieceError> {
        let address = meta.address()?;
        self.compile_view(&address).await?;
        info!(
            target = "tessera::pieces",
            namespace = address.namespace(),
            view = address.view(),
            code = %meta.code,
            "page meta refreshed"
        );
        Ok(())
    }

    /// Replace the content of an existing piece and refresh every view it
    /// appears in.
    pub async fn save_piece(
        &self,
        actor: Option<&Actor>,
        code: &ContentCode,
        content: &str,
    ) -> Result<(PieceRecord, RefreshReport), PieceError> {
        self.ensure_editor(actor)?;

        let piece = self
            .catalog
            .find_piece(code)
            .await?
            .ok_or_else(|| PieceError::NotFound {
                entity: "piece",
                key: code.to_string(),
            })?;

        let updated = self
            .catalog
            .pieces()
            .update_piece_content(piece.id, content)
            .await?;
        let report = self.refresh_piece(&updated).await?;
        Ok((updated, report))
    }

    /// Replace the metadata fields of an existing record and recompile its view.
    pub async fn save_meta(
        &self,
        actor: Option<&Actor>,
        key: &MetaKey,
        fields: PageMetaFields,
    ) -> Result<PageMetaRecord, PieceError> {
        self.ensure_editor(actor)?;

        let meta = self
            .catalog
            .find_meta(key)
            .await?
            .ok_or_else(|| PieceError::NotFound {
                entity: "page meta",
                key: format!("{}:{}", key.address, key.code),
            })?;

        let updated = self
            .catalog
            .meta()
            .update_meta(UpdatePageMetaParams {
                id: meta.id,
                fields,
            })
            .await?;
        self.refresh_meta(&updated).await?;
        Ok(updated)
    }

    /// Serve the rendering matching the actor's rights, compiling on a cache miss.
    pub async fn render_view(
        &self,
        actor: Option<&Actor>,
        address: &ViewAddress,
    ) -> Result<CompiledView, ViewError> {
        let environment = self
            .views
            .environment()
            .with_dependency(EDITABLE_DEPENDENCY, self.can_edit(actor));
        self.views.compile(address, &environment, false).await
    }

    fn ensure_editor(&self, actor: Option<&Actor>) -> Result<(), PieceError> {
        if self.can_edit(actor) {
            Ok(())
        } else {
            Err(PieceError::Forbidden)
        }
    }
}
