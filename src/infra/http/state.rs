use std::sync::Arc;

use crate::application::pieces::PieceService;
use crate::infra::access::ActorDirectory;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct CmsState {
    pub pieces: Arc<PieceService>,
    pub actors: Arc<ActorDirectory>,
    /// Probed by `/health` when the service runs against Postgres.
    pub db: Option<Arc<PostgresRepositories>>,
}
