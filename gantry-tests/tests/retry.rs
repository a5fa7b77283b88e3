#[cfg(test)]
mod tests {
    use gantry::{DbErrorKind, EngineError};
    use gantry_tests::{CommandKind, FakeDriver, User, context, init_logging, int, text, flag};

    const USER_LABELS: [&str; 3] = ["id", "name", "is_active"];

    fn one_user() -> Vec<Vec<gantry::Value>> {
        vec![vec![int(1), text("Ada"), flag(true)]]
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        init_logging();
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Timeout, None);
        driver.script_rows(&USER_LABELS, one_user());
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let result = users.query().to_list().await.unwrap();
        assert_eq!(result.len(), 1);
        let queries = driver.statements();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].sql, queries[1].sql);
    }

    #[tokio::test]
    async fn deadlock_codes_are_transient() {
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Other, Some(1205));
        driver.script_rows(&USER_LABELS, one_user());
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        assert!(users.query().to_list().await.is_ok());
        assert_eq!(driver.statements().len(), 2);
    }

    #[tokio::test]
    async fn non_transient_read_failures_surface_immediately() {
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Syntax, None);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let error = users.query().to_list().await.unwrap_err();
        match &error {
            EngineError::Execution { sql, .. } => {
                assert!(sql.starts_with("SELECT"));
            }
            other => panic!("expected an execution error, got {other:?}"),
        }
        assert_eq!(driver.statements().len(), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_configured_maximum() {
        let driver = FakeDriver::sqlserver();
        for _ in 0..10 {
            driver.script_failure(DbErrorKind::Transport, None);
        }
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let error = users.query().to_list().await.unwrap_err();
        assert!(matches!(error, EngineError::Execution { .. }));
        // One initial attempt plus the default three retries.
        assert_eq!(driver.statements().len(), 4);
    }

    #[tokio::test]
    async fn mutations_are_never_retried() {
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Timeout, None);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let entity = User {
            id: 0,
            name: "Ada".into(),
            is_active: true,
        };
        let error = users.insert(&entity, None).await.unwrap_err();
        assert!(matches!(error, EngineError::Execution { .. }));
        let executes: Vec<_> = driver
            .statements()
            .into_iter()
            .filter(|e| e.kind == CommandKind::Execute)
            .collect();
        assert_eq!(executes.len(), 1);
    }

    #[tokio::test]
    async fn classifier_override_wins() {
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Timeout, None);
        let context = gantry::DbContext::builder(driver.clone())
            .retry_base_delay(std::time::Duration::from_millis(1))
            .transient_classifier(|_| false)
            .build();
        let users = context.set::<User>().unwrap();

        // A timeout is transient by default, but the override refuses retries.
        let error = users.query().to_list().await.unwrap_err();
        assert!(matches!(error, EngineError::Execution { .. }));
        assert_eq!(driver.statements().len(), 1);
    }

    #[tokio::test]
    async fn broken_connections_recover_between_attempts() {
        // A transport failure surfaces, the scope re-checks connection health on
        // the next attempt and the query succeeds.
        let driver = FakeDriver::sqlserver();
        driver.script_failure(DbErrorKind::Transport, None);
        driver.script_rows(&USER_LABELS, one_user());
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        assert_eq!(users.query().to_list().await.unwrap().len(), 1);
    }
}
