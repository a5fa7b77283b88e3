use futures::{Stream, stream};
use gantry::{
    Connection, ConnectionState, DbError, DbErrorKind, DbResult, Dialect, Driver, IsolationLevel,
    OracleDialect, Params, RowLabeled, RowsAffected, SqlCommand, SqlServerDialect, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

static SQLSERVER: SqlServerDialect = SqlServerDialect;
static ORACLE: OracleDialect = OracleDialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Connect,
    Open,
    Close,
    Begin,
    Commit,
    Rollback,
    Query,
    Execute,
}

/// One observed driver interaction.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub kind: CommandKind,
    pub sql: String,
    pub params: Params,
}

/// A scripted response, consumed in order by query/execute calls.
pub enum Script {
    Rows(Arc<[String]>, Vec<Vec<Value>>),
    Affected(u64),
    Output(u64, Params),
    Fail(DbErrorKind, Option<i32>),
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Script>>,
    journal: Mutex<Vec<JournalEntry>>,
    connections: Mutex<u32>,
}

impl Shared {
    fn record(&self, kind: CommandKind, sql: &str, params: &Params) {
        self.journal.lock().unwrap().push(JournalEntry {
            kind,
            sql: sql.into(),
            params: params.clone(),
        });
    }
}

/// In-memory driver with scripted results and a command journal. Used by the
/// scenario suite to assert the exact SQL and parameters the engine emits.
#[derive(Clone)]
pub struct FakeDriver {
    dialect: &'static dyn Dialect,
    shared: Arc<Shared>,
}

impl FakeDriver {
    pub fn sqlserver() -> Self {
        Self {
            dialect: &SQLSERVER,
            shared: Arc::default(),
        }
    }

    pub fn oracle() -> Self {
        Self {
            dialect: &ORACLE,
            shared: Arc::default(),
        }
    }

    fn push(&self, script: Script) {
        self.shared.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a result set. All rows share the given labels.
    pub fn script_rows(&self, labels: &[&str], rows: Vec<Vec<Value>>) {
        let labels: Arc<[String]> = labels.iter().map(|l| l.to_string()).collect();
        self.push(Script::Rows(labels, rows));
    }

    pub fn script_affected(&self, rows_affected: u64) {
        self.push(Script::Affected(rows_affected));
    }

    pub fn script_output(&self, rows_affected: u64, output: Params) {
        self.push(Script::Output(rows_affected, output));
    }

    pub fn script_failure(&self, kind: DbErrorKind, code: Option<i32>) {
        self.push(Script::Fail(kind, code));
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.journal.lock().unwrap().clone()
    }

    /// Only the statements (queries and executes), in order.
    pub fn statements(&self) -> Vec<JournalEntry> {
        self.journal()
            .into_iter()
            .filter(|e| matches!(e.kind, CommandKind::Query | CommandKind::Execute))
            .collect()
    }

    pub fn connections_made(&self) -> u32 {
        *self.shared.connections.lock().unwrap()
    }
}

fn scripted_error(kind: DbErrorKind, code: Option<i32>) -> DbError {
    let error = DbError::new(kind, "scripted failure");
    match code {
        Some(code) => error.with_code(code),
        None => error,
    }
}

pub struct FakeConnection {
    shared: Arc<Shared>,
    state: ConnectionState,
    in_transaction: bool,
}

impl Connection for FakeConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> DbResult<()> {
        self.shared
            .record(CommandKind::Open, "", &Params::default());
        self.state = ConnectionState::Open;
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        self.shared
            .record(CommandKind::Close, "", &Params::default());
        self.state = ConnectionState::Closed;
        Ok(())
    }

    async fn begin(&mut self, _isolation: IsolationLevel) -> DbResult<()> {
        if self.in_transaction {
            return Err(DbError::new(
                DbErrorKind::Other,
                "transaction already started on this connection",
            ));
        }
        self.shared
            .record(CommandKind::Begin, "", &Params::default());
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.shared
            .record(CommandKind::Commit, "", &Params::default());
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.shared
            .record(CommandKind::Rollback, "", &Params::default());
        self.in_transaction = false;
        Ok(())
    }

    fn query<'s>(
        &'s mut self,
        command: &'s SqlCommand,
    ) -> impl Stream<Item = DbResult<RowLabeled>> + Send + 's {
        self.shared
            .record(CommandKind::Query, &command.sql, &command.params);
        let items: Vec<DbResult<RowLabeled>> =
            match self.shared.scripts.lock().unwrap().pop_front() {
                Some(Script::Rows(labels, rows)) => rows
                    .into_iter()
                    .map(|values| {
                        Ok(RowLabeled::new(labels.clone(), values.into_boxed_slice()))
                    })
                    .collect(),
                Some(Script::Fail(kind, code)) => vec![Err(scripted_error(kind, code))],
                Some(_) => panic!("script mismatch: a query consumed a non-row script"),
                None => Vec::new(),
            };
        stream::iter(items)
    }

    async fn execute<'s>(&'s mut self, command: &'s SqlCommand) -> DbResult<RowsAffected> {
        self.shared
            .record(CommandKind::Execute, &command.sql, &command.params);
        match self.shared.scripts.lock().unwrap().pop_front() {
            Some(Script::Affected(rows_affected)) => Ok(RowsAffected {
                rows_affected,
                output: Params::default(),
            }),
            Some(Script::Output(rows_affected, output)) => Ok(RowsAffected {
                rows_affected,
                output,
            }),
            Some(Script::Fail(kind, code)) => Err(scripted_error(kind, code)),
            Some(_) => panic!("script mismatch: an execute consumed a row script"),
            None => Ok(RowsAffected {
                rows_affected: 1,
                output: Params::default(),
            }),
        }
    }
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;

    const NAME: &'static str = "fake";

    fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    async fn connect(&self) -> DbResult<FakeConnection> {
        *self.shared.connections.lock().unwrap() += 1;
        self.shared
            .record(CommandKind::Connect, "", &Params::default());
        Ok(FakeConnection {
            shared: self.shared.clone(),
            state: ConnectionState::Closed,
            in_transaction: false,
        })
    }
}
