#[cfg(test)]
mod tests {
    use gantry::{EngineError, col, expr};
    use gantry_tests::{FakeDriver, User, context, flag, init_logging, int, long, text};

    const USER_LABELS: [&str; 3] = ["id", "name", "is_active"];

    fn user_row(id: i32, name: &str, active: bool) -> Vec<gantry::Value> {
        vec![int(id), text(name), flag(active)]
    }

    #[tokio::test]
    async fn filter_order_and_page() {
        init_logging();
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![user_row(11, "John", true)]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let result = users
            .query()
            .filter(expr!(User::is_active && User::name.starts_with("Jo")))
            .order_by(col!(User::id))
            .skip(10)
            .take(5)
            .to_list()
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "John");
        let statements = driver.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "SELECT a.[id] AS [id], a.[username] AS [name], a.[is_active] AS [is_active] \
             FROM [dbo].[Users] AS a \
             WHERE (a.[is_active] = 1 AND a.[username] LIKE @p0 ESCAPE '\\') \
             ORDER BY a.[id] OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(statements[0].params.get("p0"), Some(&text("Jo%")));
    }

    #[tokio::test]
    async fn empty_in_short_circuits_to_false() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let ids: Vec<i32> = Vec::new();
        let result = users
            .query()
            .filter(expr!(ids.contains(User::id)))
            .to_list()
            .await
            .unwrap();

        assert!(result.is_empty());
        let statements = driver.statements();
        assert!(statements[0].sql.ends_with("WHERE 1=0"));
        assert!(statements[0].params.is_empty());
    }

    #[tokio::test]
    async fn in_list_binds_the_collection_once() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![user_row(1, "Ada", true)]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let ids = vec![1, 2, 3];
        users
            .query()
            .filter(expr!(ids.contains(User::id)))
            .to_list()
            .await
            .unwrap();

        let statements = driver.statements();
        assert!(statements[0].sql.ends_with("WHERE a.[id] IN @p0"));
        match statements[0].params.get("p0") {
            Some(gantry::Value::List(Some(values), ..)) => assert_eq!(values.len(), 3),
            other => panic!("expected a bound list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn count_has_no_ordering_or_paging() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["count"], vec![vec![long(3)]]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let count = users
            .query()
            .filter(expr!(User::is_active))
            .order_by(col!(User::id))
            .skip(10)
            .take(5)
            .count()
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            driver.statements()[0].sql,
            "SELECT COUNT(*) FROM [dbo].[Users] AS a WHERE a.[is_active] = 1"
        );
    }

    #[tokio::test]
    async fn any_rides_on_count() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&["count"], vec![vec![long(0)]]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        assert!(!users.query().any().await.unwrap());
    }

    #[tokio::test]
    async fn first_takes_one_with_deterministic_order() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![user_row(1, "Ada", true)]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let first = users.query().first_or_none().await.unwrap();
        assert_eq!(first.unwrap().id, 1);
        let sql = &driver.statements()[0].sql;
        // Paging without an explicit ordering falls back to the key.
        assert!(sql.contains("ORDER BY a.[id]"));
        assert!(sql.ends_with("OFFSET 0 ROWS FETCH NEXT 1 ROWS ONLY"));
    }

    #[tokio::test]
    async fn first_on_empty_result_is_an_operation_error() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        let error = users.query().first().await.unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
    }

    #[tokio::test]
    async fn single_rejects_multiple_rows() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(
            &USER_LABELS,
            vec![user_row(1, "Ada", true), user_row(2, "Grace", true)],
        );
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let error = users.query().single().await.unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
        assert!(driver.statements()[0].sql.contains("FETCH NEXT 2 ROWS ONLY"));
    }

    #[tokio::test]
    async fn last_inverts_the_declared_ordering() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![user_row(9, "Zoe", true)]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let last = users
            .query()
            .order_by(col!(User::name))
            .last()
            .await
            .unwrap();
        assert_eq!(last.id, 9);
        assert!(
            driver.statements()[0]
                .sql
                .contains("ORDER BY a.[username] DESC")
        );
    }

    #[tokio::test]
    async fn last_without_ordering_fails() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver);
        let users = context.set::<User>().unwrap();
        let error = users.query().last().await.unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
    }

    #[tokio::test]
    async fn take_zero_is_rejected_at_execution() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        let error = users.query().take(0).to_list().await.unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn then_by_requires_order_by() {
        let driver = FakeDriver::sqlserver();
        let context = context(driver);
        let users = context.set::<User>().unwrap();
        let error = users
            .query()
            .then_by(col!(User::name))
            .to_list()
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Operation { .. }));
    }

    #[tokio::test]
    async fn then_by_appends_in_declared_order() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users
            .query()
            .order_by_desc(col!(User::is_active))
            .then_by(col!(User::id))
            .to_list()
            .await
            .unwrap();
        assert!(
            driver.statements()[0]
                .sql
                .ends_with("ORDER BY a.[is_active] DESC, a.[id]")
        );
    }

    #[tokio::test]
    async fn distinct_injects_after_select() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users.query().distinct().to_list().await.unwrap();
        assert!(driver.statements()[0].sql.starts_with("SELECT DISTINCT a.[id]"));
    }

    #[tokio::test]
    async fn ignore_case_lowers_both_sides() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users
            .query()
            .filter(expr!(User::name == "Ada"))
            .ignore_case()
            .to_list()
            .await
            .unwrap();
        let statement = &driver.statements()[0];
        assert!(statement.sql.contains("LOWER(a.[username]) = LOWER(@p0)"));
        assert_eq!(statement.params.get("p0"), Some(&text("ada")));
    }

    #[tokio::test]
    async fn find_uses_the_precomputed_select_by_id() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![user_row(7, "Ada", true)]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let found = users.find(7).await.unwrap().unwrap();
        assert_eq!(found.id, 7);
        let statement = &driver.statements()[0];
        assert!(statement.sql.ends_with("WHERE a.[id] = @id"));
        assert_eq!(statement.params.get("id"), Some(&int(7)));
    }

    #[tokio::test]
    async fn null_comparison_collapses() {
        let driver = FakeDriver::sqlserver();
        driver.script_rows(&USER_LABELS, vec![]);
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();
        users
            .query()
            .filter(expr!(User::name != NULL))
            .to_list()
            .await
            .unwrap();
        assert!(
            driver.statements()[0]
                .sql
                .ends_with("WHERE a.[username] IS NOT NULL")
        );
    }

    #[tokio::test]
    async fn paging_partition_reassembles_the_whole_set() {
        // Three pages of two over a six-row table equal the unpaged set.
        let all: Vec<Vec<gantry::Value>> = (1..=6).map(|i| user_row(i, "u", true)).collect();
        let driver = FakeDriver::sqlserver();
        for page in all.chunks(2) {
            driver.script_rows(&USER_LABELS, page.to_vec());
        }
        driver.script_rows(&USER_LABELS, all.clone());
        let context = context(driver.clone());
        let users = context.set::<User>().unwrap();

        let mut paged = Vec::new();
        for page in 0..3 {
            let chunk = users
                .query()
                .order_by(col!(User::id))
                .skip(page * 2)
                .take(2)
                .to_list()
                .await
                .unwrap();
            paged.extend(chunk);
        }
        let unpaged = users
            .query()
            .order_by(col!(User::id))
            .to_list()
            .await
            .unwrap();
        let ids: Vec<i32> = paged.iter().map(|u| u.id).collect();
        let all_ids: Vec<i32> = unpaged.iter().map(|u| u.id).collect();
        assert_eq!(ids, all_ids);
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }
}
