use chrono::{Duration, Utc};
use rl_core::error::StoreError;
use rl_core::store::QueueRepository;
use rl_core::types::{PrEvent, QueueEntry};
use rusqlite::{Connection, OptionalExtension};

use crate::util::{decode_json, encode_json, from_rfc3339, store_err, to_rfc3339};

pub struct QueueRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> QueueRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> QueueRepository for QueueRepo<'a> {
    fn enqueue(&self, event: &PrEvent, dedup_key: &str) -> Result<i64, StoreError> {
        let now = to_rfc3339(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO review_queue (dedup_key, event_json, attempts, visible_at, enqueued_at)
                 VALUES (?1, ?2, 0, ?3, ?3)",
                (dedup_key, encode_json(event)?, &now),
            )
            .map_err(store_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn dequeue(
        &self,
        worker_id: &str,
        visibility: Duration,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let now = Utc::now();
        let lease_until = to_rfc3339(&(now + visibility));
        // Single-statement lease keeps delivery at-most-once per window even
        // with several workers on the same database.
        let row = self
            .conn
            .query_row(
                "UPDATE review_queue
                 SET visible_at = ?1, attempts = attempts + 1, leased_by = ?2
                 WHERE entry_id = (
                     SELECT entry_id FROM review_queue
                     WHERE visible_at <= ?3
                     ORDER BY entry_id
                     LIMIT 1
                 )
                 RETURNING entry_id, dedup_key, event_json, attempts, visible_at",
                (&lease_until, worker_id, to_rfc3339(&now)),
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?;

        let Some((entry_id, dedup_key, event_json, attempts, visible_at)) = row else {
            return Ok(None);
        };
        Ok(Some(QueueEntry {
            entry_id,
            event: decode_json(&event_json)?,
            dedup_key,
            attempts,
            visible_at: from_rfc3339(&visible_at)?,
        }))
    }

    fn ack(&self, entry_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM review_queue WHERE entry_id = ?1", [entry_id])
            .map_err(store_err)?;
        Ok(())
    }

    fn is_queued(&self, dedup_key: &str) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM review_queue WHERE dedup_key = ?1",
                [dedup_key],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(count > 0)
    }

    fn len(&self) -> Result<u32, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM review_queue", [], |row| row.get(0))
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;
    use rl_core::types::{PrEventKind, RepoId};

    fn event(pr_id: i64) -> PrEvent {
        PrEvent {
            kind: PrEventKind::Created,
            pr_id,
            repository_id: RepoId::generate(),
            platform_repo_id: "guid".to_string(),
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            source_commit: "abc".to_string(),
            target_commit: "def".to_string(),
            iteration_id: None,
            author: "dev".to_string(),
            title: "change".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn fifo_and_ack() {
        let conn = with_test_db().unwrap();
        let queue = QueueRepo::new(&conn);
        let first = event(1);
        let second = event(2);
        queue.enqueue(&first, &first.dedup_key()).unwrap();
        queue.enqueue(&second, &second.dedup_key()).unwrap();
        assert_eq!(queue.len().unwrap(), 2);

        let leased = queue
            .dequeue("worker-0", Duration::minutes(15))
            .unwrap()
            .unwrap();
        assert_eq!(leased.event.pr_id, 1);
        assert_eq!(leased.attempts, 1);

        queue.ack(leased.entry_id).unwrap();
        assert_eq!(queue.len().unwrap(), 1);
        let next = queue
            .dequeue("worker-0", Duration::minutes(15))
            .unwrap()
            .unwrap();
        assert_eq!(next.event.pr_id, 2);
    }

    #[test]
    fn leased_entry_is_invisible_until_timeout() {
        let conn = with_test_db().unwrap();
        let queue = QueueRepo::new(&conn);
        let entry = event(1);
        queue.enqueue(&entry, &entry.dedup_key()).unwrap();

        let leased = queue
            .dequeue("worker-0", Duration::minutes(15))
            .unwrap()
            .unwrap();
        // Second worker sees nothing while the lease holds.
        assert!(queue
            .dequeue("worker-1", Duration::minutes(15))
            .unwrap()
            .is_none());

        // Expired lease: redelivered with a bumped attempt counter.
        conn.execute(
            "UPDATE review_queue SET visible_at = ?1 WHERE entry_id = ?2",
            (to_rfc3339(&(Utc::now() - Duration::seconds(1))), leased.entry_id),
        )
        .unwrap();
        let redelivered = queue
            .dequeue("worker-1", Duration::minutes(15))
            .unwrap()
            .unwrap();
        assert_eq!(redelivered.entry_id, leased.entry_id);
        assert_eq!(redelivered.attempts, 2);
    }

    #[test]
    fn dedup_key_visibility() {
        let conn = with_test_db().unwrap();
        let queue = QueueRepo::new(&conn);
        let entry = event(1);
        let key = entry.dedup_key();
        assert!(!queue.is_queued(&key).unwrap());
        queue.enqueue(&entry, &key).unwrap();
        assert!(queue.is_queued(&key).unwrap());
        // Still queued while leased; only the ack clears it.
        let leased = queue
            .dequeue("worker-0", Duration::minutes(15))
            .unwrap()
            .unwrap();
        assert!(queue.is_queued(&key).unwrap());
        queue.ack(leased.entry_id).unwrap();
        assert!(!queue.is_queued(&key).unwrap());
    }
}
