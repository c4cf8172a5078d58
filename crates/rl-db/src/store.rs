use rl_core::error::RedlineError;
use rl_core::store::Store;
use rusqlite::Connection;

use crate::claim_repo::ClaimRepo;
use crate::event_repo::EventRepo;
use crate::execution_repo::ExecutionRepo;
use crate::queue_repo::QueueRepo;
use crate::registration_repo::RegistrationRepo;
use crate::state_repo::StateRepo;
use crate::timeout_repo::TimeoutRepo;
use crate::util::store_err;
use crate::watermark_repo::WatermarkRepo;

pub struct DbStore {
    conn: Connection,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for DbStore {
    type Registrations<'a>
        = RegistrationRepo<'a>
    where
        Self: 'a;
    type Queue<'a>
        = QueueRepo<'a>
    where
        Self: 'a;
    type Claims<'a>
        = ClaimRepo<'a>
    where
        Self: 'a;
    type States<'a>
        = StateRepo<'a>
    where
        Self: 'a;
    type Watermarks<'a>
        = WatermarkRepo<'a>
    where
        Self: 'a;
    type Timeouts<'a>
        = TimeoutRepo<'a>
    where
        Self: 'a;
    type Executions<'a>
        = ExecutionRepo<'a>
    where
        Self: 'a;
    type Events<'a>
        = EventRepo<'a>
    where
        Self: 'a;

    fn registrations(&self) -> Self::Registrations<'_> {
        RegistrationRepo::new(&self.conn)
    }

    fn queue(&self) -> Self::Queue<'_> {
        QueueRepo::new(&self.conn)
    }

    fn claims(&self) -> Self::Claims<'_> {
        ClaimRepo::new(&self.conn)
    }

    fn states(&self) -> Self::States<'_> {
        StateRepo::new(&self.conn)
    }

    fn watermarks(&self) -> Self::Watermarks<'_> {
        WatermarkRepo::new(&self.conn)
    }

    fn timeouts(&self) -> Self::Timeouts<'_> {
        TimeoutRepo::new(&self.conn)
    }

    fn executions(&self) -> Self::Executions<'_> {
        ExecutionRepo::new(&self.conn)
    }

    fn events(&self) -> Self::Events<'_> {
        EventRepo::new(&self.conn)
    }

    fn with_tx<F, T>(&self, f: F) -> Result<T, RedlineError>
    where
        F: FnOnce(&Self) -> Result<T, RedlineError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|err| RedlineError::Store(store_err(err)))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|err| RedlineError::Store(store_err(err)))?;
                Ok(value)
            }
            Err(err) => {
                self.conn
                    .execute_batch("ROLLBACK")
                    .map_err(|rollback_err| RedlineError::Store(store_err(rollback_err)))?;
                Err(err)
            }
        }
    }
}
