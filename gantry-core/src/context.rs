use crate::{
    Connection, ConnectionScope, DbError, Dialect, Driver, EngineError, Entity, EntitySet,
    IsolationLevel, ModelBuilder, ModelRegistry, Result, RetryPolicy, RowLabeled, RowsAffected,
    SqlCommand, TransactionScope, TranslationCache, connection,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Context-wide settings. Everything has a default; the builder overrides
/// individual fields.
#[derive(Clone)]
pub struct ContextOptions {
    /// Per-command timeout handed to the driver.
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
    /// Default for identity resolution during eager loads.
    pub identity_resolution: bool,
    /// Compare empty-string literals as NULL in predicates.
    pub empty_string_as_null: bool,
    pub translation_cache_capacity: usize,
    /// Override of the transient-error classifier used by read retry.
    pub transient_classifier: Option<Arc<dyn Fn(&DbError) -> bool + Send + Sync>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            identity_resolution: true,
            empty_string_as_null: false,
            translation_cache_capacity: crate::TRANSLATION_CACHE_CAPACITY,
            transient_classifier: None,
        }
    }
}

impl std::fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextOptions")
            .field("command_timeout", &self.command_timeout)
            .field("retry", &self.retry)
            .field("identity_resolution", &self.identity_resolution)
            .field("empty_string_as_null", &self.empty_string_as_null)
            .field(
                "translation_cache_capacity",
                &self.translation_cache_capacity,
            )
            .finish()
    }
}

/// The unit of work: owns the model registry, the compiled-predicate cache
/// and the transaction state. Cooperatively single-threaded; flows that need
/// concurrency use one context each. Cancellation is dropping the operation
/// future; a transaction scope left behind rolls back on disposal.
pub struct DbContext<D: Driver> {
    driver: D,
    options: ContextOptions,
    classifier: Arc<dyn Fn(&DbError) -> bool + Send + Sync>,
    registry: ModelRegistry,
    translations: TranslationCache,
    transaction_active: Arc<AtomicBool>,
}

impl<D: Driver> DbContext<D> {
    pub fn builder(driver: D) -> DbContextBuilder<D> {
        DbContextBuilder {
            driver,
            options: ContextOptions::default(),
            model: ModelBuilder::default(),
        }
    }

    /// A context with default options and no fluent model configuration.
    pub fn new(driver: D) -> Self {
        Self::builder(driver).build()
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.registry.dialect()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn translation_cache(&self) -> &TranslationCache {
        &self.translations
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The typed gateway for one entity type. Resolves (and caches) the
    /// mapping and its SQL on first use.
    pub fn set<E: Entity>(&self) -> Result<EntitySet<'_, E, D>> {
        EntitySet::new(self)
    }

    /// Start a transaction with the default isolation level.
    pub async fn begin_transaction(&self) -> Result<TransactionScope<D::Connection>> {
        self.begin_transaction_with(IsolationLevel::default()).await
    }

    /// Start a transaction. At most one per context; a second begin fails
    /// until the first scope is disposed.
    pub async fn begin_transaction_with(
        &self,
        isolation: IsolationLevel,
    ) -> Result<TransactionScope<D::Connection>> {
        if self
            .transaction_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::operation(
                "context",
                "a transaction is already active on this context",
            ));
        }
        let result = async {
            let mut connection =
                self.driver
                    .connect()
                    .await
                    .map_err(|e| EngineError::Connection {
                        message: "connection factory failed".into(),
                        source: Some(e),
                    })?;
            connection::ensure_open(&self.driver, &mut connection).await?;
            connection
                .begin(isolation)
                .await
                .map_err(|e| EngineError::Connection {
                    message: "cannot begin transaction".into(),
                    source: Some(e),
                })?;
            Ok(connection)
        }
        .await;
        match result {
            Ok(connection) => Ok(TransactionScope::new(
                connection,
                self.transaction_active.clone(),
            )),
            Err(e) => {
                self.transaction_active.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub(crate) fn command(&self, sql: impl Into<String>) -> SqlCommand {
        SqlCommand::new(sql).with_timeout(self.options.command_timeout)
    }

    /// Run a read on a fresh connection scope, with transient retry.
    pub(crate) async fn run_read(
        &self,
        entity: &str,
        command: &SqlCommand,
    ) -> Result<Vec<RowLabeled>> {
        let mut scope = ConnectionScope::<D>::acquire(&self.driver).await?;
        connection::fetch_all(
            &self.driver,
            scope.connection(),
            command,
            &self.options.retry,
            self.classifier.as_ref(),
            entity,
        )
        .await
    }

    /// Run a mutation, on the transaction's connection when one is given,
    /// else on a fresh scope. Never retried.
    pub(crate) async fn run_execute(
        &self,
        entity: &str,
        command: &SqlCommand,
        txn: Option<&mut TransactionScope<D::Connection>>,
    ) -> Result<RowsAffected> {
        match txn {
            Some(txn) => connection::execute(txn.connection_mut(), command, entity).await,
            None => {
                let mut scope = ConnectionScope::<D>::acquire(&self.driver).await?;
                connection::execute(scope.connection(), command, entity).await
            }
        }
    }

    /// Run a read that belongs to a mutation flow: no retry, and it joins
    /// the transaction's connection when one is given.
    pub(crate) async fn run_query_once(
        &self,
        entity: &str,
        command: &SqlCommand,
        txn: Option<&mut TransactionScope<D::Connection>>,
    ) -> Result<Vec<RowLabeled>> {
        match txn {
            Some(txn) => connection::query_once(txn.connection_mut(), command, entity).await,
            None => {
                let mut scope = ConnectionScope::<D>::acquire(&self.driver).await?;
                connection::query_once(scope.connection(), command, entity).await
            }
        }
    }
}

/// Builder for [`DbContext`]: options plus the fluent model configuration.
pub struct DbContextBuilder<D: Driver> {
    driver: D,
    options: ContextOptions,
    model: ModelBuilder,
}

impl<D: Driver> DbContextBuilder<D> {
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.retry.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.options.retry.base_delay = delay;
        self
    }

    pub fn identity_resolution(mut self, enabled: bool) -> Self {
        self.options.identity_resolution = enabled;
        self
    }

    pub fn empty_string_as_null(mut self, enabled: bool) -> Self {
        self.options.empty_string_as_null = enabled;
        self
    }

    pub fn translation_cache_capacity(mut self, capacity: usize) -> Self {
        self.options.translation_cache_capacity = capacity;
        self
    }

    pub fn transient_classifier(
        mut self,
        classifier: impl Fn(&DbError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.options.transient_classifier = Some(Arc::new(classifier));
        self
    }

    /// Fluent model configuration; wins over entity attributes.
    pub fn model(mut self, f: impl FnOnce(&mut ModelBuilder)) -> Self {
        f(&mut self.model);
        self
    }

    pub fn build(self) -> DbContext<D> {
        let dialect = self.driver.dialect();
        let classifier = self
            .options
            .transient_classifier
            .clone()
            .unwrap_or_else(|| Arc::new(crate::is_transient));
        DbContext {
            registry: ModelRegistry::new(dialect, self.model.into_config()),
            translations: TranslationCache::new(self.options.translation_cache_capacity),
            classifier,
            driver: self.driver,
            options: self.options,
            transaction_active: Arc::new(AtomicBool::new(false)),
        }
    }
}
