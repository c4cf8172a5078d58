use rl_core::error::RepoError;
use rl_core::store::RegistrationRepository;
use rl_core::types::{RepoId, Repository};
use rusqlite::{Connection, ErrorCode, OptionalExtension};

use crate::util::{from_rfc3339, to_rfc3339};

pub struct RegistrationRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> RegistrationRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const COLUMNS: &str = "id, organization, project, name, url, platform_repo_id, hook_id, \
                       created_at, updated_at";

impl<'a> RegistrationRepository for RegistrationRepo<'a> {
    fn insert(&self, repository: &Repository) -> Result<(), RepoError> {
        let sql = format!("INSERT INTO repositories ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)");
        self.conn
            .execute(
                &sql,
                (
                    repository.id.as_str(),
                    &repository.organization,
                    &repository.project,
                    &repository.name,
                    &repository.url,
                    &repository.platform_repo_id,
                    repository.hook_id.as_deref(),
                    to_rfc3339(&repository.created_at),
                    to_rfc3339(&repository.updated_at),
                ),
            )
            .map_err(repo_err)?;
        Ok(())
    }

    fn set_hook(&self, id: &RepoId, hook_id: Option<&str>) -> Result<Repository, RepoError> {
        let affected = self
            .conn
            .execute(
                "UPDATE repositories SET hook_id = ?2, updated_at = ?3 WHERE id = ?1",
                (id.as_str(), hook_id, to_rfc3339(&chrono::Utc::now())),
            )
            .map_err(repo_err)?;
        if affected == 0 {
            return Err(RepoError::NotFound);
        }
        self.get(id)?.ok_or(RepoError::NotFound)
    }

    fn get(&self, id: &RepoId) -> Result<Option<Repository>, RepoError> {
        self.query_one("id = ?1", id.as_str())
    }

    fn get_by_platform_id(&self, platform_repo_id: &str) -> Result<Option<Repository>, RepoError> {
        self.query_one("platform_repo_id = ?1", platform_repo_id)
    }

    fn get_by_url(&self, url: &str) -> Result<Option<Repository>, RepoError> {
        self.query_one("url = ?1", url)
    }

    fn list(&self) -> Result<Vec<Repository>, RepoError> {
        let sql = format!("SELECT {COLUMNS} FROM repositories ORDER BY created_at ASC");
        let mut stmt = self.conn.prepare(&sql).map_err(repo_err)?;
        let rows = stmt
            .query_map([], map_repository_row)
            .map_err(repo_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(repo_err)?;
        rows.into_iter().map(finish_row).collect()
    }

    fn delete(&self, id: &RepoId) -> Result<Repository, RepoError> {
        let existing = self.get(id)?.ok_or(RepoError::NotFound)?;
        self.conn
            .execute("DELETE FROM repositories WHERE id = ?1", [id.as_str()])
            .map_err(repo_err)?;
        Ok(existing)
    }
}

impl<'a> RegistrationRepo<'a> {
    fn query_one(&self, predicate: &str, param: &str) -> Result<Option<Repository>, RepoError> {
        let sql = format!("SELECT {COLUMNS} FROM repositories WHERE {predicate}");
        let row = self
            .conn
            .query_row(&sql, [param], map_repository_row)
            .optional()
            .map_err(repo_err)?;
        row.map(finish_row).transpose()
    }
}

/// Column tuple before timestamp/id parsing, which cannot fail inside the
/// rusqlite row callback without losing the error detail.
type RawRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
);

fn map_repository_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn finish_row(raw: RawRow) -> Result<Repository, RepoError> {
    let (id, organization, project, name, url, platform_repo_id, hook_id, created_at, updated_at) =
        raw;
    Ok(Repository {
        id: RepoId::new(id).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?,
        organization,
        project,
        name,
        url,
        platform_repo_id,
        hook_id,
        created_at: from_rfc3339(&created_at).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?,
        updated_at: from_rfc3339(&updated_at).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?,
    })
}

fn repo_err(err: rusqlite::Error) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.code {
            ErrorCode::ConstraintViolation => return RepoError::AlreadyRegistered,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen => {
                return RepoError::Store {
                    message: err.to_string(),
                }
            }
            _ => {}
        }
    }
    RepoError::InvalidInput {
        message: err.to_string(),
    }
}
