//! Dump and archive strategies with mocked external tools

use account_backup::config::StrategyKind;
use account_backup::strategies::build_strategy;
use account_backup::utils::Interrupt;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use test_utils::{
    entry_names, run_backup, with_counter, ConfigBuilder, MockExecutor, MockResponse, RunResult,
    SignalledExecutor, TestContext, STAMP,
};

fn generation(alias: &str) -> String {
    format!("{}_{}", alias, STAMP)
}

#[test]
fn test_dump_failure_leaves_no_artifact_and_still_prunes() {
    let test = TestContext::new();
    let backup = test.backup_dir("shop");
    test.create_aged_dir(&backup.join("shop_2023-12-29_000000"), 300);
    test.create_aged_dir(&backup.join("shop_2023-12-30_000000"), 200);
    test.create_aged_dir(&backup.join("shop_2023-12-31_000000"), 100);

    let config = ConfigBuilder::new()
        .mysql("shop", &backup, "shop", 2)
        .persist(test.paths());
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::fail(1, "access denied"));
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(StrategyKind::Mysql);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "shop", false)
    })
    .unwrap();

    assert_eq!(result, RunResult::new(0, 1));
    assert_eq!(executor.call_count("mysqldump"), 1);
    // the failed generation is gone, retention ran over the old ones
    assert_eq!(
        entry_names(&backup),
        vec!["shop_2023-12-30_000000", "shop_2023-12-31_000000"]
    );
}

#[test]
fn test_successful_dump_becomes_newest_generation() {
    let test = TestContext::new();
    let backup = test.backup_dir("shop");
    test.create_aged_dir(&backup.join("shop_2023-12-30_000000"), 200);
    test.create_aged_dir(&backup.join("shop_2023-12-31_000000"), 100);

    let config = ConfigBuilder::new()
        .mysql("shop", &backup, "shop", 2)
        .persist(test.paths());
    let executor = MockExecutor::new();
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(StrategyKind::Mysql);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "shop", false)
    })
    .unwrap();

    assert!(result.is_clean());
    assert_eq!(
        entry_names(&backup),
        vec!["shop_2023-12-31_000000".to_string(), generation("shop")]
    );

    let calls = executor.get_calls();
    let expected = backup.join(generation("shop")).join(format!("{}.sql", generation("shop")));
    assert!(calls[0]
        .command_line
        .contains(&format!("--result-file={}", expected.display())));
}

#[rstest]
#[case(StrategyKind::Mysql, "mysqldump")]
#[case(StrategyKind::Postgresql, "pg_dump")]
#[case(StrategyKind::Mongodb, "mongodump")]
fn test_missing_tool_is_one_error_without_spawning(
    #[case] kind: StrategyKind,
    #[case] program: &str,
) {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .alias(
            "db",
            json!({
                "type": kind.tag(),
                "backup_path": test.backup_dir("db"),
                "db_host": "localhost",
                "db_port": 1234,
                "db_name": "app",
                "db_user": "u",
                "db_pass": "p",
                "versions": 3,
            }),
        )
        .persist(test.paths());
    let executor = MockExecutor::new().without_program(program);
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(kind);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "db", false)
    })
    .unwrap();

    assert_eq!(result, RunResult::new(0, 1));
    assert!(executor.get_calls().is_empty());
}

#[test]
fn test_wordpress_shares_one_generation_and_prunes_once() {
    let test = TestContext::new();
    let backup = test.backup_dir("blog");
    test.create_aged_dir(&backup.join("blog_2023-12-30_000000"), 200);
    test.create_aged_dir(&backup.join("blog_2023-12-31_000000"), 100);

    let config = ConfigBuilder::new()
        .wordpress("blog", &backup, 2)
        .persist(test.paths());
    let executor = MockExecutor::new();
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(StrategyKind::Wordpress);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "blog", false)
    })
    .unwrap();

    assert!(result.is_clean());
    assert_eq!(
        entry_names(&backup),
        vec!["blog_2023-12-31_000000".to_string(), generation("blog")]
    );

    let calls: Vec<String> = executor.get_calls().into_iter().map(|c| c.command_line).collect();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].starts_with("mysqldump"));
    assert!(calls[1].contains("zip -r"));
    assert!(calls[2].contains("--remove-source-files"));
    // the dump and the pulled archive land in the same generation
    let target = backup.join(generation("blog"));
    assert!(calls[0].contains(&*target.to_string_lossy()));
    assert!(calls[2].contains(&*target.to_string_lossy()));
}

#[test]
fn test_wordpress_file_step_runs_after_database_failure() {
    let test = TestContext::new();
    let backup = test.backup_dir("blog");
    let config = ConfigBuilder::new()
        .wordpress("blog", &backup, 2)
        .persist(test.paths());
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::fail(2, "unknown database"));
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(StrategyKind::Wordpress);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "blog", false)
    })
    .unwrap();

    assert_eq!(result.errors, 1);
    assert!(executor.was_called("--remove-source-files"));
}

#[test]
fn test_server_mirror_without_archive() {
    let test = TestContext::new();
    let backup = test.backup_dir("site");
    let config = ConfigBuilder::new()
        .alias(
            "site",
            json!({
                "type": "server",
                "backup_path": backup,
                "ssh_host": "example.com",
                "ssh_user": "deploy",
                "ssh_pass": "pw",
                "path": "/srv/site",
                "archive": false,
                "exclude": ["cache/"],
                "versions": 1,
            }),
        )
        .persist(test.paths());
    let executor = MockExecutor::new();
    let mut ctx = test.context(config, executor.clone());
    let mut strategy = build_strategy(StrategyKind::Server);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "site", false)
    })
    .unwrap();

    assert!(result.is_clean());
    let calls = executor.get_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].command_line.contains("rsync -a --exclude"));
    assert!(calls[0].command_line.contains("deploy@example.com:/srv/site/"));
}

#[test]
fn test_dump_killed_by_interrupt_is_a_warning() {
    let test = TestContext::new();
    let backup = test.backup_dir("shop");
    test.create_aged_dir(&backup.join("shop_2023-12-30_000000"), 200);
    test.create_aged_dir(&backup.join("shop_2023-12-31_000000"), 100);

    let config = ConfigBuilder::new()
        .mysql("shop", &backup, "shop", 2)
        .persist(test.paths());
    let interrupt = Interrupt::new();
    let executor = SignalledExecutor::new(MockExecutor::new(), &interrupt);
    let mut ctx = test.context_with(config, Arc::new(executor), interrupt);
    let mut strategy = build_strategy(StrategyKind::Mysql);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "shop", false)
    })
    .unwrap();

    assert_eq!(result, RunResult::new(1, 0));
    // the empty generation is dropped, the older ones survive pruning
    assert_eq!(
        entry_names(&backup),
        vec!["shop_2023-12-30_000000", "shop_2023-12-31_000000"]
    );
}

#[test]
fn test_rsync_killed_by_interrupt_is_a_warning() {
    let test = TestContext::new();
    let config = ConfigBuilder::new()
        .alias(
            "site",
            json!({
                "type": "server",
                "backup_path": test.backup_dir("site"),
                "ssh_host": "example.com",
                "ssh_user": "deploy",
                "ssh_pass": "pw",
                "path": "/srv/site",
                "archive": false,
            }),
        )
        .persist(test.paths());
    let interrupt = Interrupt::new();
    let executor = SignalledExecutor::new(MockExecutor::new(), &interrupt);
    let mut ctx = test.context_with(config, Arc::new(executor), interrupt);
    let mut strategy = build_strategy(StrategyKind::Server);

    let counter = ctx.counter.clone();
    let result = with_counter(&counter, || {
        run_backup(strategy.as_mut(), &mut ctx, "site", false)
    })
    .unwrap();

    assert_eq!(result, RunResult::new(1, 0));
}
