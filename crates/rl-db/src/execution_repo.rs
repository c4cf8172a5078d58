use chrono::{DateTime, Utc};
use rl_core::error::StoreError;
use rl_core::store::ExecutionRepository;
use rl_core::types::{AgentExecution, AgentId, AgentPhase, AgentStatus, RepoId, RunTotals};
use rusqlite::{params, Connection, Row};

use crate::util::{decode_enum, encode_enum, from_rfc3339, store_err, to_rfc3339};

pub struct ExecutionRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> ExecutionRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<AgentExecution>, StoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(store_err)?;
        let mut rows = stmt.query(params).map_err(store_err)?;
        let mut executions = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            executions.push(map_execution_row(row)?);
        }
        Ok(executions)
    }
}

const COLUMNS: &str = "agent_id, repository_id, pr_id, dedup_key, phase, status, started_at, \
                       deadline, ended_at, duration_ms, files_analyzed, findings_posted, \
                       duplicates_skipped, resolutions_marked, api_calls, api_errors, error";

impl<'a> ExecutionRepository for ExecutionRepo<'a> {
    fn insert(&self, execution: &AgentExecution) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO agent_executions ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    execution.agent_id.as_str(),
                    execution.repository_id.as_str(),
                    execution.pr_id,
                    &execution.dedup_key,
                    encode_enum(&execution.phase)?,
                    encode_enum(&execution.status)?,
                    to_rfc3339(&execution.started_at),
                    to_rfc3339(&execution.deadline),
                    execution.ended_at.as_ref().map(to_rfc3339),
                    execution.duration_ms,
                    execution.files_analyzed,
                    execution.findings_posted,
                    execution.duplicates_skipped,
                    execution.resolutions_marked,
                    execution.api_calls,
                    execution.api_errors,
                    execution.error.as_deref(),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn set_phase(&self, agent_id: &AgentId, phase: AgentPhase) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE agent_executions SET phase = ?2 WHERE agent_id = ?1",
                (agent_id.as_str(), encode_enum(&phase)?),
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn finish(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        totals: &RunTotals,
        error: Option<&str>,
    ) -> Result<AgentExecution, StoreError> {
        let existing = self.get(agent_id)?.ok_or(StoreError::NotFound)?;
        let ended_at = Utc::now();
        let duration_ms = (ended_at - existing.started_at).num_milliseconds();
        self.conn
            .execute(
                "UPDATE agent_executions SET
                     status = ?2, ended_at = ?3, duration_ms = ?4,
                     files_analyzed = ?5, findings_posted = ?6, duplicates_skipped = ?7,
                     resolutions_marked = ?8, api_calls = ?9, api_errors = ?10, error = ?11
                 WHERE agent_id = ?1",
                (
                    agent_id.as_str(),
                    encode_enum(&status)?,
                    to_rfc3339(&ended_at),
                    duration_ms,
                    totals.files_analyzed,
                    totals.findings_posted,
                    totals.duplicates_skipped,
                    totals.resolutions_marked,
                    totals.api_calls,
                    totals.api_errors,
                    error,
                ),
            )
            .map_err(store_err)?;
        self.get(agent_id)?.ok_or(StoreError::NotFound)
    }

    fn get(&self, agent_id: &AgentId) -> Result<Option<AgentExecution>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM agent_executions WHERE agent_id = ?1");
        Ok(self.query(&sql, [agent_id.as_str()])?.into_iter().next())
    }

    fn list(&self, limit: Option<u32>) -> Result<Vec<AgentExecution>, StoreError> {
        let sql =
            format!("SELECT {COLUMNS} FROM agent_executions ORDER BY started_at DESC LIMIT ?1");
        self.query(&sql, [limit.unwrap_or(100)])
    }

    fn running(&self) -> Result<Vec<AgentExecution>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM agent_executions WHERE status = 'Running'");
        self.query(&sql, [])
    }

    fn dedup_seen(&self, dedup_key: &str) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM agent_executions
                 WHERE dedup_key = ?1 AND status IN ('Running', 'Completed')",
                [dedup_key],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(count > 0)
    }

    fn recover_expired(&self, now: DateTime<Utc>) -> Result<Vec<AgentExecution>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM agent_executions
             WHERE status = 'Running' AND deadline <= ?1"
        );
        let expired = self.query(&sql, [to_rfc3339(&now)])?;

        let mut recovered = Vec::with_capacity(expired.len());
        for execution in expired {
            let totals = RunTotals {
                files_analyzed: execution.files_analyzed,
                findings_posted: execution.findings_posted,
                duplicates_skipped: execution.duplicates_skipped,
                resolutions_marked: execution.resolutions_marked,
                api_calls: execution.api_calls,
                api_errors: execution.api_errors,
            };
            recovered.push(self.finish(
                &execution.agent_id,
                AgentStatus::Timeout,
                &totals,
                Some("deadline passed before process restart"),
            )?);
        }
        Ok(recovered)
    }
}

fn map_execution_row(row: &Row<'_>) -> Result<AgentExecution, StoreError> {
    let get_text = |idx: usize| -> Result<String, StoreError> {
        row.get::<_, String>(idx).map_err(store_err)
    };

    let agent_id = get_text(0)?;
    let repository_id = get_text(1)?;
    let ended_at: Option<String> = row.get(8).map_err(store_err)?;

    Ok(AgentExecution {
        agent_id: AgentId::new(agent_id).map_err(|err| StoreError::InvalidInput {
            message: err.to_string(),
        })?,
        repository_id: RepoId::new(repository_id).map_err(|err| StoreError::InvalidInput {
            message: err.to_string(),
        })?,
        pr_id: row.get(2).map_err(store_err)?,
        dedup_key: get_text(3)?,
        phase: decode_enum(&get_text(4)?)?,
        status: decode_enum(&get_text(5)?)?,
        started_at: from_rfc3339(&get_text(6)?)?,
        deadline: from_rfc3339(&get_text(7)?)?,
        ended_at: ended_at.as_deref().map(from_rfc3339).transpose()?,
        duration_ms: row.get(9).map_err(store_err)?,
        files_analyzed: row.get(10).map_err(store_err)?,
        findings_posted: row.get(11).map_err(store_err)?,
        duplicates_skipped: row.get(12).map_err(store_err)?,
        resolutions_marked: row.get(13).map_err(store_err)?,
        api_calls: row.get(14).map_err(store_err)?,
        api_errors: row.get(15).map_err(store_err)?,
        error: row.get(16).map_err(store_err)?,
    })
}
