use std::sync::Arc;

use tracing::debug;

use crate::application::repos::{
    CreateLocationParams, CreatePageMetaParams, CreatePieceParams, PageMetaRepo, PiecesRepo,
    RepoError,
};
use crate::domain::entities::{NewPiece, PageMetaFields, PageMetaRecord, PieceEntry, PieceRecord};
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

/// Lookup and get-or-create access to pieces, their locations, and page meta.
///
/// Uniqueness is owned by the repositories. When a create loses a race against
/// a concurrent writer the repository reports `RepoError::Duplicate` and the
/// catalog returns the record that won.
#[derive(Clone)]
pub struct PieceCatalog {
    pieces: Arc<dyn PiecesRepo>,
    meta: Arc<dyn PageMetaRepo>,
}

impl PieceCatalog {
    pub fn new(pieces: Arc<dyn PiecesRepo>, meta: Arc<dyn PageMetaRepo>) -> Self {
        Self { pieces, meta }
    }

    pub fn pieces(&self) -> &Arc<dyn PiecesRepo> {
        &self.pieces
    }

    pub fn meta(&self) -> &Arc<dyn PageMetaRepo> {
        &self.meta
    }

    pub async fn find_piece(&self, code: &ContentCode) -> Result<Option<PieceRecord>, RepoError> {
        self.pieces.find_piece_by_code(code).await
    }

    pub async fn find_meta(&self, key: &MetaKey) -> Result<Option<PageMetaRecord>, RepoError> {
        self.meta.find_meta(key).await
    }

    /// Return the piece stored under `code`, creating it with `default_content`
    /// when absent, and make sure it is linked to `address`.
    pub async fn get_piece(
        &self,
        code: &ContentCode,
        default_content: &str,
        address: &ViewAddress,
    ) -> Result<PieceRecord, RepoError> {
        let entry = match self.find_piece(code).await? {
            Some(record) => PieceEntry::Stored(record),
            None => PieceEntry::Draft(NewPiece {
                code: code.clone(),
                content: default_content.to_string(),
            }),
        };

        self.ensure_location(entry, address).await
    }

    /// Return the meta record for `key`, creating it from `defaults` when absent.
    /// Defaults never touch a record that already exists.
    pub async fn get_meta(
        &self,
        key: &MetaKey,
        defaults: PageMetaFields,
    ) -> Result<PageMetaRecord, RepoError> {
        if let Some(record) = self.find_meta(key).await? {
            return Ok(record);
        }

        let created = self
            .meta
            .create_meta(CreatePageMetaParams {
                key: key.clone(),
                fields: defaults,
            })
            .await;

        match created {
            Ok(record) => {
                debug!(
                    target = "tessera::catalog",
                    namespace = key.address.namespace(),
                    view = key.address.view(),
                    code = %key.code,
                    "page meta created"
                );
                Ok(record)
            }
            Err(err) if err.is_duplicate() => self.find_meta(key).await?.ok_or(err),
            Err(err) => Err(err),
        }
    }

    /// Persist `piece` if it is still a draft, then link it to `address` unless
    /// a location for that address already exists.
    pub async fn ensure_location(
        &self,
        piece: PieceEntry,
        address: &ViewAddress,
    ) -> Result<PieceRecord, RepoError> {
        let piece = match piece {
            PieceEntry::Stored(record) => record,
            PieceEntry::Draft(draft) => self.persist_draft(draft).await?,
        };

        let locations = self.pieces.list_locations(piece.id).await?;
        if locations.iter().any(|location| location.is_at(address)) {
            return Ok(piece);
        }

        let created = self
            .pieces
            .create_location(CreateLocationParams {
                piece_id: piece.id,
                address: address.clone(),
            })
            .await;

        match created {
            Ok(_) => {
                debug!(
                    target = "tessera::catalog",
                    code = %piece.code,
                    namespace = address.namespace(),
                    view = address.view(),
                    "piece location linked"
                );
                Ok(piece)
            }
            Err(err) if err.is_duplicate() => Ok(piece),
            Err(err) => Err(err),
        }
    }

    async fn persist_draft(&self, draft: NewPiece) -> Result<PieceRecord, RepoError> {
        let code = draft.code.clone();
        let created = self
            .pieces
            .create_piece(CreatePieceParams {
                code: draft.code,
                content: draft.content,
            })
            .await;

        match created {
            Ok(record) => {
                debug!(target = "tessera::catalog", code = %code, "piece created");
                Ok(record)
            }
            Err(err) if err.is_duplicate() => self.find_piece(&code).await?.ok_or(err),
            Err(err) => Err(err),
        }
    }
}
