#[cfg(test)]
mod tests {
    use gantry::{EngineError, MassMutation, Params};
    use gantry_tests::{
        Account, CommandKind, FakeDriver, User, UserStats, context, flag, init_logging, int, long,
        text,
    };

    fn ada() -> User {
        User {
            id: 0,
            name: "Ada".into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn insert_parameterizes_by_property() {
        init_logging();
        let driver = FakeDriver::sqlserver();
        driver.script_affected(1);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let affected = users.insert(&ada(), None).await.unwrap();
        assert_eq!(affected, 1);
        let statement = &driver.statements()[0];
        assert_eq!(statement.kind, CommandKind::Execute);
        assert_eq!(
            statement.sql,
            "INSERT INTO [dbo].[Users] ([username],[is_active]) VALUES (@name,@is_active)"
        );
        assert_eq!(statement.params.get("name"), Some(&text("Ada")));
        assert_eq!(statement.params.get("is_active"), Some(&flag(true)));
        // The identity column never binds.
        assert!(!statement.params.contains("id"));
    }

    #[tokio::test]
    async fn insert_returning_id_reads_back_the_scalar() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["id"], vec![vec![int(42)]]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let mut entity = ada();
        let id: i32 = users.insert_returning_id(&mut entity, None).await.unwrap();
        assert_eq!(id, 42);
        assert_eq!(entity.id, 42);
        let statement = &driver.statements()[0];
        // SQL Server style runs the pair as a scalar-returning query.
        assert_eq!(statement.kind, CommandKind::Query);
        assert_eq!(
            statement.sql,
            "INSERT INTO [dbo].[Users] ([username],[is_active]) VALUES (@name,@is_active); \
             SELECT CAST(SCOPE_IDENTITY() AS int) AS [id]"
        );
    }

    #[tokio::test]
    async fn insert_returning_id_rejects_a_null_key() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["id"], vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        let error = users
            .insert_returning_id::<i32>(&mut ada(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
    }

    #[tokio::test]
    async fn oracle_sequences_return_through_output_parameters() {
        let driver = FakeDriver::oracle();
        let mut output = Params::new();
        output.push("tenant_id", long(7));
        output.push("user_id", long(99));
        driver.script_output(1, output);
        let context = context(driver.clone());
        let accounts = context.set::<Account>().unwrap();

        let mut account = Account {
            tenant_id: 0,
            user_id: 0,
            name: "Ada".into(),
        };
        let id: i64 = accounts
            .insert_returning_id(&mut account, None)
            .await
            .unwrap();
        assert_eq!(id, 7);
        assert_eq!(account.tenant_id, 7);
        assert_eq!(account.user_id, 99);
        let statement = &driver.statements()[0];
        assert_eq!(statement.kind, CommandKind::Execute);
        assert_eq!(
            statement.sql,
            r#"INSERT INTO "Accounts" ("tenant_id","user_id","username") VALUES ("tenant_seq".NEXTVAL,"user_seq".NEXTVAL,:name) RETURNING "tenant_id", "user_id" INTO :tenant_id, :user_id"#
        );
        assert_eq!(statement.params.get("name"), Some(&text("Ada")));
        // The sequence columns never bind as input parameters.
        assert!(!statement.params.contains("tenant_id"));
    }

    #[tokio::test]
    async fn validation_failures_stop_before_any_sql() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let mut short = ada();
        short.name = "A".into();
        let error = users.insert(&short, None).await.unwrap_err();
        match error {
            EngineError::Validation { errors, .. } => assert_eq!(errors.len(), 1),
            other => panic!("expected a validation error, got {other:?}"),
        }
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn read_only_entities_reject_writes() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let stats = context.set::<UserStats>().unwrap();
        let entity = UserStats {
            user_id: 1,
            order_count: 5,
        };
        let error = stats.insert(&entity, None).await.unwrap_err();
        assert!(matches!(error, EngineError::ReadOnly { .. }));
        let error = stats.delete(&entity, None).await.unwrap_err();
        assert!(matches!(error, EngineError::ReadOnly { .. }));
    }

    #[tokio::test]
    async fn update_zero_rows_is_a_concurrency_error() {
        let driver = FakeDriver::sqlserver();
        driver.script_affected(0);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        let mut entity = ada();
        entity.id = 7;
        let error = users.update(&entity, None).await.unwrap_err();
        assert!(matches!(error, EngineError::Concurrency { .. }));
        assert_eq!(
            driver.statements()[0].sql,
            "UPDATE [dbo].[Users] SET [username] = @name, [is_active] = @is_active WHERE [id] = @id"
        );
        assert_eq!(driver.statements()[0].params.get("id"), Some(&int(7)));
    }

    #[tokio::test]
    async fn delete_by_id_builds_the_key_parameters() {
        let driver = FakeDriver::sqlserver();
        driver.script_affected(1);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users.delete_by_id(7, None).await.unwrap();
        let statement = &driver.statements()[0];
        assert_eq!(statement.sql, "DELETE FROM [dbo].[Users] WHERE [id] = @id");
        assert_eq!(statement.params.get("id"), Some(&int(7)));
    }

    #[tokio::test]
    async fn delete_by_composite_id_requires_every_component() {
        let driver = FakeDriver::oracle();
        let context = context(driver.clone());
        let accounts = context.set::<Account>().unwrap();
        let error = accounts
            .delete_by_composite_id(&[("tenant_id", long(1))], None)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Configuration { .. }));
        assert!(driver.statements().is_empty());

        driver.script_affected(1);
        accounts
            .delete_by_composite_id(&[("tenant_id", long(1)), ("user_id", long(2))], None)
            .await
            .unwrap();
        assert_eq!(
            driver.statements()[0].sql,
            r#"DELETE FROM "Accounts" WHERE "tenant_id" = :tenant_id AND "user_id" = :user_id"#
        );
    }

    #[tokio::test]
    async fn update_where_rejects_unknown_columns_and_empty_filters() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let error = users
            .update_where(&ada(), &[], MassMutation::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Configuration { .. }));

        let error = users
            .update_where(
                &ada(),
                &[("status", text("pending"))],
                MassMutation::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Configuration { .. }));
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn mass_update_defaults_to_exactly_one_row() {
        let driver = FakeDriver::sqlserver();
        driver.script_affected(3);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        let error = users
            .update_where(
                &ada(),
                &[("is_active", flag(false))],
                MassMutation::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));

        let driver = FakeDriver::sqlserver();
        driver.script_affected(0);
        let context = self::context(driver);
        let users = context.set::<User>().unwrap();
        let error = users
            .delete_where(&[("is_active", flag(false))], MassMutation::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Concurrency { .. }));
    }

    #[tokio::test]
    async fn expected_rows_mismatch_rolls_back_before_mutating() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["count"], vec![vec![long(2)]]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let error = users
            .update_where(
                &ada(),
                &[("is_active", flag(true))],
                MassMutation::expect_rows(3),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));

        let journal = driver.journal();
        let kinds: Vec<CommandKind> = journal.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&CommandKind::Begin));
        assert!(kinds.contains(&CommandKind::Rollback));
        assert!(!kinds.contains(&CommandKind::Commit));
        assert!(!kinds.contains(&CommandKind::Execute));
        let count = journal
            .iter()
            .find(|e| e.kind == CommandKind::Query)
            .expect("the count ran");
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) FROM [dbo].[Users] WHERE [is_active] = @is_active"
        );
    }

    #[tokio::test]
    async fn expected_rows_match_commits_the_mutation() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["count"], vec![vec![long(2)]]);
        driver.script_affected(2);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let affected = users
            .delete_where(
                &[("is_active", flag(false))],
                MassMutation::expect_rows(2),
                None,
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let kinds: Vec<CommandKind> = driver.journal().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&CommandKind::Execute));
        assert!(kinds.contains(&CommandKind::Commit));
        assert!(!kinds.contains(&CommandKind::Rollback));
    }

    #[tokio::test]
    async fn where_parameters_dodge_set_parameter_collisions() {
        let driver = FakeDriver::sqlserver();
        driver.script_affected(1);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users
            .update_where(
                &ada(),
                &[("name", text("old"))],
                MassMutation::default(),
                None,
            )
            .await
            .unwrap();
        let statement = &driver.statements()[0];
        assert!(statement.sql.ends_with("WHERE [username] = @name_w"));
        assert_eq!(statement.params.get("name"), Some(&text("Ada")));
        assert_eq!(statement.params.get("name_w"), Some(&text("old")));
    }
}
