#[cfg(test)]
mod tests {
    use gantry::EngineError;
    use gantry_tests::{CommandKind, FakeDriver, User, context, init_logging};

    fn ada() -> User {
        User {
            id: 0,
            name: "Ada".into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn completed_scope_commits() {
        init_logging();
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let mut scope = context.begin_transaction().await.unwrap();
        users.insert(&ada(), Some(&mut scope)).await.unwrap();
        scope.complete();
        scope.dispose().await.unwrap();

        let kinds: Vec<CommandKind> = driver.journal().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::Connect,
                CommandKind::Open,
                CommandKind::Begin,
                CommandKind::Execute,
                CommandKind::Commit,
            ]
        );
        // The scope's connection served the operation; no extra one was made.
        assert_eq!(driver.connections_made(), 1);
    }

    #[tokio::test]
    async fn dispose_without_complete_rolls_back() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let mut scope = context.begin_transaction().await.unwrap();
        users.insert(&ada(), Some(&mut scope)).await.unwrap();
        // No complete(): disposal must roll back.
        scope.dispose().await.unwrap();

        let kinds: Vec<CommandKind> = driver.journal().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&CommandKind::Rollback));
        assert!(!kinds.contains(&CommandKind::Commit));
    }

    #[tokio::test]
    async fn one_transaction_per_context() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver);
        let first = context.begin_transaction().await.unwrap();
        let error = context.begin_transaction().await.unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
        first.dispose().await.unwrap();
        // Disposing frees the slot.
        let second = context.begin_transaction().await.unwrap();
        second.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn operations_outside_a_scope_use_fresh_connections() {
        let driver = FakeDriver::sqlserver();
        driver.script_affected(1);
        driver.script_affected(1);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        users.insert(&ada(), None).await.unwrap();
        users.insert(&ada(), None).await.unwrap();
        assert_eq!(driver.connections_made(), 2);
    }
}
