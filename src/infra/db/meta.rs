use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreatePageMetaParams, PageMetaRepo, RepoError, UpdatePageMetaParams},
    domain::{entities::PageMetaRecord, types::MetaKey},
};

use super::{PostgresRepositories, map_sqlx_error};

const META_COLUMNS: &str =
    "id, namespace, view, code, title, description, keywords, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageMetaRow {
    id: Uuid,
    namespace: String,
    view: String,
    code: String,
    title: Option<String>,
    description: Option<String>,
    keywords: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PageMetaRow> for PageMetaRecord {
    fn from(row: PageMetaRow) -> Self {
        Self {
            id: row.id,
            namespace: row.namespace,
            view: row.view,
            code: row.code,
            title: row.title,
            description: row.description,
            keywords: row.keywords,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PageMetaRepo for PostgresRepositories {
    async fn find_meta(&self, key: &MetaKey) -> Result<Option<PageMetaRecord>, RepoError> {
        let sql = format!(
            "SELECT {META_COLUMNS} FROM page_meta WHERE namespace = $1 AND view = $2 AND code = $3"
        );
        let row = sqlx::query_as::<_, PageMetaRow>(&sql)
            .bind(key.address.namespace())
            .bind(key.address.view())
            .bind(key.code.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PageMetaRecord::from))
    }

    async fn create_meta(&self, params: CreatePageMetaParams) -> Result<PageMetaRecord, RepoError> {
        let sql = format!(
            "INSERT INTO page_meta (id, namespace, view, code, title, description, keywords) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {META_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PageMetaRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.key.address.namespace())
            .bind(params.key.address.view())
            .bind(params.key.code.as_str())
            .bind(params.fields.title.as_deref())
            .bind(params.fields.description.as_deref())
            .bind(params.fields.keywords.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_meta(&self, params: UpdatePageMetaParams) -> Result<PageMetaRecord, RepoError> {
        let sql = format!(
            "UPDATE page_meta SET title = $2, description = $3, keywords = $4, updated_at = now() \
             WHERE id = $1 RETURNING {META_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PageMetaRow>(&sql)
            .bind(params.id)
            .bind(params.fields.title.as_deref())
            .bind(params.fields.description.as_deref())
            .bind(params.fields.keywords.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
