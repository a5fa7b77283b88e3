use crate::{Connection, EngineError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The active transaction of one context. Completed-then-disposed commits;
/// disposed without completion rolls back. Operations run inside the scope
/// reuse its connection.
pub struct TransactionScope<C: Connection> {
    connection: Option<C>,
    completed: bool,
    finished: bool,
    active: Arc<AtomicBool>,
}

impl<C: Connection> TransactionScope<C> {
    pub(crate) fn new(connection: C, active: Arc<AtomicBool>) -> Self {
        Self {
            connection: Some(connection),
            completed: false,
            finished: false,
            active,
        }
    }

    /// Mark the scope successful: disposal will commit.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub(crate) fn connection_mut(&mut self) -> &mut C {
        self.connection
            .as_mut()
            .expect("transaction scope already disposed")
    }

    /// Finish the scope: commit when completed, roll back otherwise.
    /// Rolling back after a failed commit is safe.
    pub async fn dispose(mut self) -> Result<()> {
        let mut connection = self
            .connection
            .take()
            .expect("transaction scope already disposed");
        self.finished = true;
        self.active.store(false, Ordering::Release);
        if self.completed {
            if let Err(e) = connection.commit().await {
                let _ = connection.rollback().await;
                return Err(EngineError::Connection {
                    message: "transaction commit failed".into(),
                    source: Some(e),
                });
            }
        } else if let Err(e) = connection.rollback().await {
            return Err(EngineError::Connection {
                message: "transaction rollback failed".into(),
                source: Some(e),
            });
        }
        Ok(())
    }
}

impl<C: Connection> Drop for TransactionScope<C> {
    fn drop(&mut self) {
        if !self.finished {
            // The dropped connection makes the driver discard the
            // uncommitted work.
            log::error!("transaction scope dropped without dispose(); rolling back");
            self.active.store(false, Ordering::Release);
        }
    }
}
