//! Batch runs over several aliases

use test_utils::{
    entry_names, with_counter, BackupManager, BatchSummary, ConfigBuilder, MockExecutor,
    MockResponse, RunResult, TestContext,
};

fn run(manager: &mut BackupManager, aliases: &[&str]) -> BatchSummary {
    let counter = manager.context().counter.clone();
    let aliases: Vec<String> = aliases.iter().map(|a| a.to_string()).collect();
    with_counter(&counter, || manager.run(&aliases))
}

#[test]
fn test_failures_do_not_affect_other_aliases() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .mysql("broken", &test.backup_dir("broken"), "denied_db", 1)
        .mysql("healthy", &test.backup_dir("healthy"), "shop", 1)
        .alias(
            "unknown",
            serde_json::json!({"type": "ftp", "backup_path": test.backup_dir("unknown")}),
        )
        .persist(test.paths());
    let executor = MockExecutor::new().expect("denied_db", MockResponse::fail(1, "access denied"));
    let mut manager = BackupManager::new(test.context(config, executor.clone()));

    let summary = run(&mut manager, &[]);

    let results: Vec<(&str, RunResult)> = summary
        .reports
        .iter()
        .map(|r| (r.alias.as_str(), r.result))
        .collect();
    assert_eq!(
        results,
        vec![
            ("broken", RunResult::new(0, 1)),
            ("healthy", RunResult::new(0, 0)),
            ("unknown", RunResult::new(0, 1)),
        ]
    );
    assert_eq!(summary.total, RunResult::new(0, 2));
    assert!(executor.was_called("shop"));
}

#[test]
fn test_explicit_aliases_restrict_the_batch() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .mysql("a", &test.backup_dir("a"), "db_a", 1)
        .mysql("b", &test.backup_dir("b"), "db_b", 1)
        .persist(test.paths());
    let executor = MockExecutor::new();
    let mut manager = BackupManager::new(test.context(config, executor.clone()));

    let summary = run(&mut manager, &["b"]);

    assert_eq!(summary.reports.len(), 1);
    assert!(executor.was_called("db_b"));
    assert!(!executor.was_called("db_a"));
}

#[test]
fn test_missing_alias_is_an_error_for_that_alias_only() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .mysql("a", &test.backup_dir("a"), "db_a", 1)
        .persist(test.paths());
    let mut manager = BackupManager::new(test.context(config, MockExecutor::new()));

    let summary = run(&mut manager, &["ghost", "a"]);

    assert_eq!(summary.reports[0].result, RunResult::new(0, 1));
    assert!(summary.reports[1].result.is_clean());
}

#[test]
fn test_general_namespace_is_never_backed_up() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .mail("me@example.com", "pw", true)
        .mysql("a", &test.backup_dir("a"), "db_a", 1)
        .persist(test.paths());
    let manager = BackupManager::new(test.context(config, MockExecutor::new()));

    assert_eq!(manager.aliases(), vec!["a".to_string()]);
}

#[test]
fn test_dump_failure_keeps_older_generations_pruned() {
    let test = TestContext::new();
    let backup = test.backup_dir("shop");
    test.create_aged_dir(&backup.join("shop_2024-01-01"), 300);
    test.create_aged_dir(&backup.join("shop_2024-01-02"), 200);
    test.create_aged_dir(&backup.join("shop_2024-01-03"), 100);
    let config = ConfigBuilder::new()
        .mysql("shop", &backup, "shop", 2)
        .persist(test.paths());
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::fail(1, "access denied"));
    let mut manager = BackupManager::new(test.context(config, executor));

    let summary = run(&mut manager, &["shop"]);

    assert_eq!(summary.total, RunResult::new(0, 1));
    assert_eq!(entry_names(&backup), vec!["shop_2024-01-02", "shop_2024-01-03"]);
}

#[test]
fn test_staging_is_removed_after_the_batch() {
    let test = TestContext::new();
    let config = ConfigBuilder::new().persist(test.paths());
    let mut manager = BackupManager::new(test.context(config, MockExecutor::new()));
    let staging = manager.context().tmp_folder().unwrap();
    std::fs::write(staging.join("partial.zip"), "x").unwrap();

    run(&mut manager, &[]);

    assert!(!test.paths().tmp_dir().exists());
}

#[test]
fn test_interrupted_batch_starts_no_aliases() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .mysql("a", &test.backup_dir("a"), "db_a", 1)
        .persist(test.paths());
    let executor = MockExecutor::new();
    let mut manager = BackupManager::new(test.context(config, executor.clone()));
    manager.context().interrupt.trigger();

    let summary = run(&mut manager, &[]);

    assert!(summary.interrupted);
    assert!(summary.reports.is_empty());
    assert!(executor.get_calls().is_empty());
}
