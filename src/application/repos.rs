//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{PageMetaFields, PageMetaRecord, PieceLocationRecord, PieceRecord};
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CreatePieceParams {
    pub code: ContentCode,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreateLocationParams {
    pub piece_id: Uuid,
    pub address: ViewAddress,
}

#[derive(Debug, Clone)]
pub struct CreatePageMetaParams {
    pub key: MetaKey,
    pub fields: PageMetaFields,
}

#[derive(Debug, Clone)]
pub struct UpdatePageMetaParams {
    pub id: Uuid,
    pub fields: PageMetaFields,
}

#[async_trait]
pub trait PiecesRepo: Send + Sync {
    async fn find_piece_by_code(
        &self,
        code: &ContentCode,
    ) -> Result<Option<PieceRecord>, RepoError>;

    /// Insert a piece; a second piece with the same code is `RepoError::Duplicate`.
    async fn create_piece(&self, params: CreatePieceParams) -> Result<PieceRecord, RepoError>;

    async fn update_piece_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> Result<PieceRecord, RepoError>;

    async fn list_locations(&self, piece_id: Uuid) -> Result<Vec<PieceLocationRecord>, RepoError>;

    /// Insert a location; a second one for the same (piece, view, namespace) is
    /// `RepoError::Duplicate`.
    async fn create_location(
        &self,
        params: CreateLocationParams,
    ) -> Result<PieceLocationRecord, RepoError>;

    async fn delete_location(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait PageMetaRepo: Send + Sync {
    async fn find_meta(&self, key: &MetaKey) -> Result<Option<PageMetaRecord>, RepoError>;

    async fn create_meta(&self, params: CreatePageMetaParams) -> Result<PageMetaRecord, RepoError>;

    async fn update_meta(&self, params: UpdatePageMetaParams) -> Result<PageMetaRecord, RepoError>;
}
