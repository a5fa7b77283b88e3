use crate::{Dialect, Params, RowLabeled, RowsAffected, dialect::DbType};
use futures::Stream;
use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
    future::Future,
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Broad classification a driver assigns to its failures. The retry policy
/// keys off this together with the vendor `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Statement or connection timeout.
    Timeout,
    /// Transport-level failure on an established connection.
    Transport,
    /// The server could not be reached at all (wrong host, instance down).
    ServerNotFound,
    /// Authentication rejected.
    Login,
    PermissionDenied,
    /// Unknown table, column or other schema object.
    UnknownObject,
    Syntax,
    Cancelled,
    Other,
}

/// A failure reported by the database driver. `code` is the vendor error
/// number when one exists (e.g. 1205 for a SQL Server deadlock).
#[derive(Debug)]
pub struct DbError {
    pub kind: DbErrorKind,
    pub code: Option<i32>,
    pub message: String,
    pub source: Option<anyhow::Error>,
}

impl DbError {
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} (code {}): {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl StdError for DbError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| AsRef::<dyn StdError + Send + Sync>::as_ref(e) as &(dyn StdError + 'static))
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// A fully assembled statement: SQL text, ordered input parameters, typed
/// output parameters and an optional per-command timeout.
///
/// List-valued parameters are handed to the driver as-is; expanding them into
/// an IN list is the driver's contract.
#[derive(Debug, Clone, Default)]
pub struct SqlCommand {
    pub sql: String,
    pub params: Params,
    pub out_params: Vec<(String, DbType)>,
    pub timeout: Option<Duration>,
}

impl SqlCommand {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A single database connection as the engine consumes it. One connection is
/// owned by one scope at a time; the engine never shares it across scopes.
pub trait Connection: Send {
    fn state(&self) -> ConnectionState;

    fn open(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn close(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Start a transaction on this connection. At most one at a time.
    fn begin(&mut self, isolation: IsolationLevel) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Must be safe to call after a failed commit.
    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Run a statement and stream its rows. Rows carry the column aliases of
    /// the statement as labels.
    fn query<'s>(
        &'s mut self,
        command: &'s SqlCommand,
    ) -> impl Stream<Item = DbResult<RowLabeled>> + Send + 's;

    /// Run a mutating statement, returning the affected count and any output
    /// parameter values declared on the command.
    fn execute<'s>(
        &'s mut self,
        command: &'s SqlCommand,
    ) -> impl Future<Output = DbResult<RowsAffected>> + Send + 's;
}

/// A database family: produces connections and knows its SQL dialect.
/// `connect` is the connection factory supplied to the engine at
/// configuration time.
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;

    const NAME: &'static str;

    fn dialect(&self) -> &'static dyn Dialect;

    fn connect(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;
}
