use crate::{
    Connection, ConnectionState, DbError, DbErrorKind, Driver, EngineError, Result, RowLabeled,
    RowsAffected, SqlCommand,
};
use futures::TryStreamExt;
use std::time::Duration;

/// Read-retry settings. Mutations are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Default transient-error classifier. Timeouts, deadlocks, transport drops
/// and the known Azure SQL transient codes are retry-safe; authentication,
/// schema, permission, syntax and wrong-server failures never are.
pub fn is_transient(error: &DbError) -> bool {
    match error.kind {
        DbErrorKind::Timeout | DbErrorKind::Transport => true,
        DbErrorKind::ServerNotFound
        | DbErrorKind::Login
        | DbErrorKind::PermissionDenied
        | DbErrorKind::UnknownObject
        | DbErrorKind::Syntax
        | DbErrorKind::Cancelled => false,
        DbErrorKind::Other => matches!(
            error.code,
            // 1205 SQL Server deadlock victim, 60 ORA-00060 deadlock,
            // 40197/40501/40613/49918..49920/4221 Azure SQL transient states.
            Some(1205 | 60 | 40197 | 40501 | 40613 | 49918 | 49919 | 49920 | 4221)
        ),
    }
}

fn connection_error(message: &str, source: DbError) -> EngineError {
    EngineError::Connection {
        message: message.into(),
        source: Some(source),
    }
}

/// Bring a connection to `Open`, recreating it from the driver when it is
/// broken.
pub(crate) async fn ensure_open<D: Driver>(
    driver: &D,
    connection: &mut D::Connection,
) -> Result<()> {
    if connection.state() == ConnectionState::Broken {
        *connection = driver
            .connect()
            .await
            .map_err(|e| connection_error("cannot recreate broken connection", e))?;
    }
    if connection.state() == ConnectionState::Closed {
        connection
            .open()
            .await
            .map_err(|e| connection_error("cannot open connection", e))?;
    }
    Ok(())
}

/// A per-operation connection. Acquired lazily from the driver, health
/// checked, and released when the scope drops. A scope never carries a
/// transaction; transactional work goes through [`crate::TransactionScope`],
/// which owns its connection for the whole transaction lifetime.
pub struct ConnectionScope<D: Driver> {
    connection: D::Connection,
}

impl<D: Driver> ConnectionScope<D> {
    pub async fn acquire(driver: &D) -> Result<Self> {
        let mut connection = driver
            .connect()
            .await
            .map_err(|e| connection_error("connection factory failed", e))?;
        ensure_open(driver, &mut connection).await?;
        Ok(Self { connection })
    }

    pub fn connection(&mut self) -> &mut D::Connection {
        &mut self.connection
    }
}

/// Run a read, collecting all rows, retrying transient failures with
/// exponential backoff. The connection is health checked before every
/// attempt so a transport drop recovers on retry.
pub(crate) async fn fetch_all<D: Driver>(
    driver: &D,
    connection: &mut D::Connection,
    command: &SqlCommand,
    policy: &RetryPolicy,
    classifier: &(dyn Fn(&DbError) -> bool + Send + Sync),
    entity: &str,
) -> Result<Vec<RowLabeled>> {
    let mut attempt = 0u32;
    loop {
        ensure_open(driver, connection).await?;
        log::debug!("query: {}", command.sql);
        match connection.query(command).try_collect::<Vec<_>>().await {
            Ok(rows) => return Ok(rows),
            Err(e) if attempt < policy.max_retries && classifier(&e) => {
                log::warn!(
                    "transient failure on attempt {}: {}; retrying",
                    attempt + 1,
                    e
                );
                tokio::time::sleep(policy.base_delay * 2u32.pow(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(EngineError::execution(entity, &command.sql, e)),
        }
    }
}

/// Run a read exactly once, without retry. Used for reads that are part of
/// a mutation flow (scalar key reads, count-first checks inside a
/// transaction).
pub(crate) async fn query_once<C: Connection>(
    connection: &mut C,
    command: &SqlCommand,
    entity: &str,
) -> Result<Vec<RowLabeled>> {
    log::debug!("query: {}", command.sql);
    connection
        .query(command)
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| EngineError::execution(entity, &command.sql, e))
}

/// Run a mutation. Never retried.
pub(crate) async fn execute<C: Connection>(
    connection: &mut C,
    command: &SqlCommand,
    entity: &str,
) -> Result<RowsAffected> {
    log::debug!("execute: {}", command.sql);
    connection
        .execute(command)
        .await
        .map_err(|e| EngineError::execution(entity, &command.sql, e))
}
