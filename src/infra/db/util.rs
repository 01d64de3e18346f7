use sqlx::error::{DatabaseError, ErrorKind};

use crate::application::repos::RepoError;

const QUERY_CANCELED: &str = "57014";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> RepoError {
    let constraint = db.constraint().unwrap_or("unknown");
    match db.kind() {
        ErrorKind::UniqueViolation => RepoError::Duplicate {
            constraint: constraint.to_string(),
        },
        ErrorKind::ForeignKeyViolation => RepoError::InvalidInput {
            message: format!("{constraint}: {}", db.message()),
        },
        ErrorKind::NotNullViolation | ErrorKind::CheckViolation => RepoError::Integrity {
            message: db.message().to_string(),
        },
        _ => match db.code().as_deref() {
            Some(QUERY_CANCELED) => RepoError::Timeout,
            Some(INVALID_TEXT_REPRESENTATION) => RepoError::InvalidInput {
                message: db.message().to_string(),
            },
            _ => RepoError::from_persistence(db.message()),
        },
    }
}
