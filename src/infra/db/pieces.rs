use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateLocationParams, CreatePieceParams, PiecesRepo, RepoError},
    domain::{
        entities::{PieceLocationRecord, PieceRecord},
        types::ContentCode,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PieceRow {
    id: Uuid,
    code: String,
    content: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PieceRow> for PieceRecord {
    fn from(row: PieceRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PieceLocationRow {
    id: Uuid,
    piece_id: Uuid,
    namespace: String,
    view: String,
    created_at: OffsetDateTime,
}

impl From<PieceLocationRow> for PieceLocationRecord {
    fn from(row: PieceLocationRow) -> Self {
        Self {
            id: row.id,
            piece_id: row.piece_id,
            namespace: row.namespace,
            view: row.view,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PiecesRepo for PostgresRepositories {
    async fn find_piece_by_code(
        &self,
        code: &ContentCode,
    ) -> Result<Option<PieceRecord>, RepoError> {
        let row = sqlx::query_as::<_, PieceRow>(
            "SELECT id, code, content, created_at, updated_at FROM pieces WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PieceRecord::from))
    }

    async fn create_piece(&self, params: CreatePieceParams) -> Result<PieceRecord, RepoError> {
        let row = sqlx::query_as::<_, PieceRow>(
            r#"
            INSERT INTO pieces (id, code, content)
            VALUES ($1, $2, $3)
            RETURNING id, code, content, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.code.as_str())
        .bind(&params.content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_piece_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> Result<PieceRecord, RepoError> {
        let row = sqlx::query_as::<_, PieceRow>(
            r#"
            UPDATE pieces
            SET content = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, code, content, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn list_locations(&self, piece_id: Uuid) -> Result<Vec<PieceLocationRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PieceLocationRow>(
            r#"
            SELECT id, piece_id, namespace, view, created_at
            FROM piece_locations
            WHERE piece_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(piece_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PieceLocationRecord::from).collect())
    }

    async fn create_location(
        &self,
        params: CreateLocationParams,
    ) -> Result<PieceLocationRecord, RepoError> {
        let row = sqlx::query_as::<_, PieceLocationRow>(
            r#"
            INSERT INTO piece_locations (id, piece_id, namespace, view)
            VALUES ($1, $2, $3, $4)
            RETURNING id, piece_id, namespace, view, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.piece_id)
        .bind(params.address.namespace())
        .bind(params.address.view())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_location(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM piece_locations WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
