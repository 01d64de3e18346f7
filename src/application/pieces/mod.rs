//! Editable content pieces, page meta, and the view recompilation they trigger.

mod catalog;
mod service;

pub use catalog::PieceCatalog;
pub use service::{
    DEFAULT_EDIT_PERMISSION, PieceError, PieceService, PrunedLocation, RefreshReport,
};
