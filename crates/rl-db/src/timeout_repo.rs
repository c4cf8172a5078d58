use chrono::{DateTime, Utc};
use rl_core::error::StoreError;
use rl_core::store::TimeoutRepository;
use rl_core::types::AgentId;
use rusqlite::Connection;

use crate::util::{store_err, to_rfc3339};

pub struct TimeoutRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> TimeoutRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> TimeoutRepository for TimeoutRepo<'a> {
    fn schedule(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO agent_timeouts (agent_id, deadline) VALUES (?1, ?2)
                 ON CONFLICT (agent_id) DO UPDATE SET deadline = excluded.deadline",
                (agent_id.as_str(), to_rfc3339(&at)),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn cancel(&self, agent_id: &AgentId) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM agent_timeouts WHERE agent_id = ?1",
                [agent_id.as_str()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn due(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT agent_id FROM agent_timeouts WHERE deadline <= ?1 ORDER BY deadline ASC",
            )
            .map_err(store_err)?;
        let ids = stmt
            .query_map([to_rfc3339(&now)], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        ids.into_iter()
            .map(|raw| {
                AgentId::new(raw).map_err(|err| StoreError::InvalidInput {
                    message: err.to_string(),
                })
            })
            .collect()
    }
}
