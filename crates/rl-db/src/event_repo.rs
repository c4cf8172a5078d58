use rl_core::error::{RedlineError, StoreError};
use rl_core::store::EventRepository;
use rl_events::types::EventRecord;
use rusqlite::Connection;
use ulid::Ulid;

use crate::util::{decode_enum, decode_json, encode_enum, from_rfc3339, store_err, to_rfc3339};

pub struct EventRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> EventRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> EventRepository for EventRepo<'a> {
    fn append(&self, event: EventRecord) -> Result<EventRecord, RedlineError> {
        let id = format!("evt_{}", Ulid::new());
        self.conn
            .execute(
                "INSERT INTO events (id, at, correlation_id, source, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &id,
                    to_rfc3339(&event.at),
                    event.correlation_id.as_deref(),
                    encode_enum(&event.source).map_err(RedlineError::Store)?,
                    event.body.to_string(),
                ),
            )
            .map_err(|err| RedlineError::Store(store_err(err)))?;
        Ok(EventRecord {
            id,
            seq: self.conn.last_insert_rowid(),
            ..event
        })
    }

    fn list(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, RedlineError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT seq, id, at, correlation_id, source, body FROM events
                 WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
            )
            .map_err(|err| RedlineError::Store(store_err(err)))?;
        let mut rows = stmt
            .query((after.unwrap_or(0), limit.unwrap_or(200)))
            .map_err(|err| RedlineError::Store(store_err(err)))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|err| RedlineError::Store(store_err(err)))?
        {
            events.push(map_event_row(row).map_err(RedlineError::Store)?);
        }
        Ok(events)
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> Result<EventRecord, StoreError> {
    let seq: i64 = row.get(0).map_err(store_err)?;
    let id: String = row.get(1).map_err(store_err)?;
    let at: String = row.get(2).map_err(store_err)?;
    let correlation_id: Option<String> = row.get(3).map_err(store_err)?;
    let source: String = row.get(4).map_err(store_err)?;
    let body: String = row.get(5).map_err(store_err)?;

    Ok(EventRecord {
        id,
        seq,
        at: from_rfc3339(&at)?,
        correlation_id,
        source: decode_enum(&source)?,
        body: decode_json(&body)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::with_test_db;
    use chrono::Utc;
    use rl_events::types::EventSource;

    fn record(body: serde_json::Value) -> EventRecord {
        EventRecord {
            id: String::new(),
            seq: 0,
            at: Utc::now(),
            correlation_id: Some("corr_1".to_string()),
            source: EventSource::Webhook,
            body,
        }
    }

    #[test]
    fn append_assigns_monotonic_seq() {
        let conn = with_test_db().unwrap();
        let events = EventRepo::new(&conn);

        let first = events
            .append(record(serde_json::json!({"type": "ReviewQueued"})))
            .unwrap();
        let second = events
            .append(record(serde_json::json!({"type": "AgentSpawned"})))
            .unwrap();
        assert!(second.seq > first.seq);
        assert!(first.id.starts_with("evt_"));
    }

    #[test]
    fn list_pages_after_seq() {
        let conn = with_test_db().unwrap();
        let events = EventRepo::new(&conn);
        for i in 0..5 {
            events.append(record(serde_json::json!({"i": i}))).unwrap();
        }

        let all = events.list(None, None).unwrap();
        assert_eq!(all.len(), 5);
        let tail = events.list(Some(all[2].seq), None).unwrap();
        assert_eq!(tail.len(), 2);
        let capped = events.list(None, Some(2)).unwrap();
        assert_eq!(capped.len(), 2);
    }
}
