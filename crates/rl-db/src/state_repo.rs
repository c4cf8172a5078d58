use chrono::{DateTime, Utc};
use rl_core::error::StoreError;
use rl_core::store::StateRepository;
use rl_core::types::{AgentId, AgentState};
use rusqlite::{Connection, OptionalExtension};

use crate::util::{decode_json, encode_json, store_err, to_rfc3339};

/// Checkpoint blobs above this size are rejected rather than stored.
const MAX_STATE_BYTES: usize = 1024 * 1024;

pub struct StateRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> StateRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> StateRepository for StateRepo<'a> {
    fn put(&self, agent_id: &AgentId, state: &AgentState) -> Result<(), StoreError> {
        let json = encode_json(state)?;
        if json.len() > MAX_STATE_BYTES {
            return Err(StoreError::InvalidInput {
                message: format!("state blob {} bytes exceeds 1 MiB cap", json.len()),
            });
        }
        self.conn
            .execute(
                "INSERT INTO agent_states (agent_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (agent_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                (agent_id.as_str(), &json, to_rfc3339(&Utc::now())),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn get(&self, agent_id: &AgentId) -> Result<Option<AgentState>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state_json FROM agent_states WHERE agent_id = ?1",
                [agent_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        json.as_deref().map(decode_json).transpose()
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u32, StoreError> {
        let purged = self
            .conn
            .execute(
                "DELETE FROM agent_states WHERE updated_at < ?1",
                [to_rfc3339(&cutoff)],
            )
            .map_err(store_err)?;
        Ok(purged as u32)
    }
}
