use chrono::Utc;
use rl_core::error::StoreError;
use rl_core::store::{ClaimOutcome, ClaimRepository};
use rl_core::types::{AgentId, RepoId};
use rusqlite::{Connection, OptionalExtension};

use crate::util::{store_err, to_rfc3339};

pub struct ClaimRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> ClaimRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> ClaimRepository for ClaimRepo<'a> {
    fn claim(
        &self,
        repository_id: &RepoId,
        pr_id: i64,
        agent_id: &AgentId,
    ) -> Result<ClaimOutcome, StoreError> {
        // INSERT .. DO NOTHING is the compare-and-set: exactly one of two
        // racing agents inserts the row.
        let inserted = self
            .conn
            .execute(
                "INSERT INTO pr_claims (repository_id, pr_id, agent_id, claimed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (repository_id, pr_id) DO NOTHING",
                (
                    repository_id.as_str(),
                    pr_id,
                    agent_id.as_str(),
                    to_rfc3339(&Utc::now()),
                ),
            )
            .map_err(store_err)?;
        if inserted == 1 {
            return Ok(ClaimOutcome::Acquired);
        }
        match self.holder(repository_id, pr_id)? {
            Some(by) => Ok(ClaimOutcome::Held { by }),
            // Holder released between our insert and read; let the caller
            // retry its claim.
            None => Ok(ClaimOutcome::Held {
                by: agent_id.clone(),
            }),
        }
    }

    fn release(
        &self,
        repository_id: &RepoId,
        pr_id: i64,
        agent_id: &AgentId,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM pr_claims
                 WHERE repository_id = ?1 AND pr_id = ?2 AND agent_id = ?3",
                (repository_id.as_str(), pr_id, agent_id.as_str()),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn force_release(&self, repository_id: &RepoId, pr_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM pr_claims WHERE repository_id = ?1 AND pr_id = ?2",
                (repository_id.as_str(), pr_id),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn holder(&self, repository_id: &RepoId, pr_id: i64) -> Result<Option<AgentId>, StoreError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT agent_id FROM pr_claims WHERE repository_id = ?1 AND pr_id = ?2",
                (repository_id.as_str(), pr_id),
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        value
            .map(|raw| {
                AgentId::new(raw).map_err(|err| StoreError::InvalidInput {
                    message: err.to_string(),
                })
            })
            .transpose()
    }
}
