//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieceRecord {
    pub id: Uuid,
    pub code: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A piece that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPiece {
    pub code: ContentCode,
    pub content: String,
}

/// Either a stored piece or one still waiting for its first write.
#[derive(Debug, Clone, PartialEq)]
pub enum PieceEntry {
    Stored(PieceRecord),
    Draft(NewPiece),
}

impl From<PieceRecord> for PieceEntry {
    fn from(record: PieceRecord) -> Self {
        Self::Stored(record)
    }
}

impl From<NewPiece> for PieceEntry {
    fn from(draft: NewPiece) -> Self {
        Self::Draft(draft)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieceLocationRecord {
    pub id: Uuid,
    pub piece_id: Uuid,
    pub namespace: String,
    pub view: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PieceLocationRecord {
    pub fn is_at(&self, address: &ViewAddress) -> bool {
        self.view == address.view() && self.namespace == address.namespace()
    }

    pub fn address(&self) -> Result<ViewAddress, DomainError> {
        ViewAddress::new(&self.namespace, &self.view)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMetaRecord {
    pub id: Uuid,
    pub namespace: String,
    pub view: String,
    pub code: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PageMetaRecord {
    pub fn fields(&self) -> PageMetaFields {
        PageMetaFields {
            title: self.title.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
        }
    }

    pub fn address(&self) -> Result<ViewAddress, DomainError> {
        ViewAddress::new(&self.namespace, &self.view)
    }

    pub fn key_matches(&self, key: &MetaKey) -> bool {
        self.namespace == key.address.namespace()
            && self.view == key.address.view()
            && self.code == key.code.as_str()
    }
}

/// Mutable metadata carried by a page meta record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetaFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
}
