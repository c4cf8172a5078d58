use chrono::Utc;
use rl_core::error::StoreError;
use rl_core::store::WatermarkRepository;
use rl_core::types::RepoId;
use rusqlite::{Connection, OptionalExtension};

use crate::util::{store_err, to_rfc3339};

pub struct WatermarkRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> WatermarkRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> WatermarkRepository for WatermarkRepo<'a> {
    fn set(&self, repository_id: &RepoId, pr_id: i64, iteration_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO watermarks (repository_id, pr_id, iteration_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (repository_id, pr_id) DO UPDATE SET
                     iteration_id = excluded.iteration_id,
                     updated_at = excluded.updated_at",
                (
                    repository_id.as_str(),
                    pr_id,
                    iteration_id,
                    to_rfc3339(&Utc::now()),
                ),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn get(&self, repository_id: &RepoId, pr_id: i64) -> Result<Option<i64>, StoreError> {
        self.conn
            .query_row(
                "SELECT iteration_id FROM watermarks WHERE repository_id = ?1 AND pr_id = ?2",
                (repository_id.as_str(), pr_id),
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;

    #[test]
    fn set_then_get_then_overwrite() {
        let conn = with_test_db().unwrap();
        let watermarks = WatermarkRepo::new(&conn);
        let repo = RepoId::generate();

        assert_eq!(watermarks.get(&repo, 101).unwrap(), None);
        watermarks.set(&repo, 101, 1).unwrap();
        assert_eq!(watermarks.get(&repo, 101).unwrap(), Some(1));
        watermarks.set(&repo, 101, 2).unwrap();
        assert_eq!(watermarks.get(&repo, 101).unwrap(), Some(2));
        // Other PRs are untouched.
        assert_eq!(watermarks.get(&repo, 102).unwrap(), None);
    }
}
