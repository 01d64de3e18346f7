use serde::{Deserialize, Serialize};

use crate::application::pieces::RefreshReport;
use crate::domain::entities::PieceRecord;

#[derive(Debug, Deserialize)]
pub struct SavePieceRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ViewLocation {
    pub namespace: String,
    pub view: String,
}

#[derive(Debug, Serialize)]
pub struct SavePieceResponse {
    pub piece: PieceRecord,
    pub compiled: Vec<ViewLocation>,
    /// Locations dropped because their view no longer compiles.
    pub pruned: Vec<ViewLocation>,
}

impl SavePieceResponse {
    pub fn new(piece: PieceRecord, report: RefreshReport) -> Self {
        Self {
            piece,
            compiled: report
                .compiled
                .into_iter()
                .map(|address| ViewLocation {
                    namespace: address.namespace().to_string(),
                    view: address.view().to_string(),
                })
                .collect(),
            pruned: report
                .pruned
                .into_iter()
                .map(|pruned| ViewLocation {
                    namespace: pruned.namespace,
                    view: pruned.view,
                })
                .collect(),
        }
    }
}
