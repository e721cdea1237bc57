//! Tree walker behaviour through the full strategy lifecycle

use account_backup::strategies::Context;
use std::path::PathBuf;
use test_utils::{
    entry_names, run_backup, with_counter, CacheEntry, ConfigBuilder, FakeRemote, MockExecutor,
    RunResult, TestContext, WalkingStrategy, ROOT,
};

const ALIAS: &str = "box";

struct Harness {
    test: TestContext,
    ctx: Context,
    backup: PathBuf,
    strategy: WalkingStrategy,
    runs: u32,
}

impl Harness {
    fn new(remote: &FakeRemote, exclude: &[&str]) -> Self {
        let test = TestContext::new();
        let backup = test.backup_dir(ALIAS);
        let config = ConfigBuilder::new()
            .remote_excluding(ALIAS, &backup, exclude)
            .persist(test.paths());
        let ctx = test.context(config, MockExecutor::new());

        Self {
            test,
            ctx,
            backup,
            strategy: WalkingStrategy::new(remote),
            runs: 0,
        }
    }

    /// One backup run; every run gets its own marker
    fn run(&mut self) -> RunResult {
        self.runs += 1;
        self.ctx.stamp = format!("2024-01-{:02}_000000", self.runs);
        let counter = self.ctx.counter.clone();
        with_counter(&counter, || {
            run_backup(&mut self.strategy, &mut self.ctx, ALIAS, false)
        })
        .expect("walk is never fatal")
    }

    fn cache_entry(&self, id: &str) -> Option<CacheEntry> {
        self.test.cache(ALIAS).get_as(id).unwrap()
    }
}

fn three_files() -> FakeRemote {
    let remote = FakeRemote::new();
    remote
        .add_file(ROOT, "a", "a.txt", "A")
        .add_file(ROOT, "b", "b.txt", "B")
        .add_file(ROOT, "c", "c.txt", "C");
    remote
}

#[test]
fn test_first_run_populates_backup_and_cache() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);

    let result = harness.run();

    assert_eq!(result, RunResult::new(0, 0));
    assert_eq!(entry_names(&harness.backup), vec!["a.txt", "b.txt", "c.txt"]);
    assert_eq!(harness.test.cache(ALIAS).keys(), vec!["a", "b", "c"]);

    let entry = harness.cache_entry("b").unwrap();
    assert_eq!(entry.path.as_deref(), Some("b.txt"));
    assert_eq!(entry.checksum.as_deref(), Some("B"));
}

#[test]
fn test_steady_state_downloads_nothing() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);
    harness.run();
    let before = std::fs::read_to_string(harness.backup.join("a.txt")).unwrap();
    remote.clear_downloads();

    let result = harness.run();

    assert_eq!(result, RunResult::new(0, 0));
    assert!(remote.downloads().is_empty());
    assert_eq!(std::fs::read_to_string(harness.backup.join("a.txt")).unwrap(), before);
}

#[test]
fn test_changed_file_is_downloaded_again() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);
    harness.run();
    remote.clear_downloads();

    remote.change("b", "B2");
    harness.run();

    assert_eq!(remote.downloads(), vec!["b".to_string()]);
    assert_eq!(
        std::fs::read_to_string(harness.backup.join("b.txt")).unwrap(),
        "b.txt B2"
    );
    assert_eq!(harness.cache_entry("b").unwrap().checksum.as_deref(), Some("B2"));
}

#[test]
fn test_nested_folders_and_pagination() {
    let remote = FakeRemote::new().with_page_size(2);
    remote.add_folder(ROOT, "docs", "Documents");
    for i in 0..5 {
        remote.add_file("docs", &format!("d{}", i), &format!("{}.txt", i), "x");
    }
    remote.add_file(ROOT, "top", "top.txt", "t");
    let mut harness = Harness::new(&remote, &[]);

    let result = harness.run();

    assert!(result.is_clean());
    assert_eq!(remote.downloads().len(), 6);
    assert_eq!(entry_names(&harness.backup.join("Documents")).len(), 5);
    assert!(harness.backup.join("top.txt").exists());
}

#[test]
fn test_excluded_items_leave_no_trace() {
    let remote = FakeRemote::new();
    remote
        .add_folder(ROOT, "priv", "private")
        .add_file("priv", "secret", "keys.txt", "k")
        .add_file(ROOT, "scratch", "notes.tmp", "n")
        .add_file(ROOT, "keep", "notes.md", "m");
    let mut harness = Harness::new(&remote, &["/private/.*", "/.*\\.tmp$"]);

    let result = harness.run();

    assert!(result.is_clean());
    assert_eq!(remote.downloads(), vec!["keep".to_string()]);
    assert!(!harness.backup.join("private/keys.txt").exists());
    assert!(!harness.backup.join("notes.tmp").exists());
    assert!(harness.cache_entry("secret").is_none());
    assert!(harness.cache_entry("scratch").is_none());
}

#[test]
fn test_invalid_exclude_pattern_is_an_error() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &["("]);

    let result = harness.run();

    assert_eq!(result.errors, 1);
    assert!(remote.downloads().is_empty());
}

#[test]
fn test_moved_file_is_renamed_not_downloaded() {
    let remote = FakeRemote::new();
    remote
        .add_folder(ROOT, "old", "Inbox")
        .add_folder(ROOT, "new", "Archive")
        .add_file("old", "report", "report.pdf", "R");
    let mut harness = Harness::new(&remote, &[]);
    harness.run();
    remote.clear_downloads();

    remote.relocate("report", "new", "report-2023.pdf");
    let result = harness.run();

    assert!(result.is_clean());
    assert!(remote.downloads().is_empty());
    assert!(!harness.backup.join("Inbox/report.pdf").exists());
    assert_eq!(
        std::fs::read_to_string(harness.backup.join("Archive/report-2023.pdf")).unwrap(),
        "report.pdf R"
    );
    assert_eq!(
        harness.cache_entry("report").unwrap().path.as_deref(),
        Some("Archive/report-2023.pdf")
    );
}

#[test]
fn test_failed_item_does_not_stop_the_walk() {
    let remote = FakeRemote::new();
    for i in 0..5 {
        remote.add_file(ROOT, &format!("f{}", i), &format!("{}.bin", i), "x");
    }
    remote.fail_download("f2");
    let mut harness = Harness::new(&remote, &[]);

    let result = harness.run();

    assert!(result.errors >= 1);
    assert_eq!(remote.downloads().len(), 4);
    assert_eq!(entry_names(&harness.backup), vec!["0.bin", "1.bin", "3.bin", "4.bin"]);
}

#[test]
fn test_failed_item_is_retried_next_run() {
    let remote = three_files();
    remote.fail_download("a");
    let mut harness = Harness::new(&remote, &[]);
    harness.run();

    let remote_ok = three_files();
    harness.strategy = WalkingStrategy::new(&remote_ok);
    let result = harness.run();

    assert!(result.is_clean());
    assert_eq!(remote_ok.downloads(), vec!["a".to_string()]);
}

#[test]
fn test_mirroring_remote_propagates_deletions() {
    let remote = three_files().mirroring();
    let mut harness = Harness::new(&remote, &[]);
    harness.run();

    remote.remove("c");
    harness.run();

    assert_eq!(entry_names(&harness.backup), vec!["a.txt", "b.txt"]);
    assert!(harness.cache_entry("c").is_none());
}

#[test]
fn test_non_mirroring_remote_keeps_local_copies() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);
    harness.run();

    remote.remove("c");
    harness.run();

    assert!(harness.backup.join("c.txt").exists());
}

#[test]
fn test_incomplete_listing_removes_nothing() {
    let remote = FakeRemote::new().mirroring();
    remote
        .add_folder(ROOT, "pics", "Pictures")
        .add_file("pics", "p", "p.jpg", "P")
        .add_file(ROOT, "a", "a.txt", "A");
    let mut harness = Harness::new(&remote, &[]);
    harness.run();

    remote.fail_listing("pics");
    let result = harness.run();

    assert_eq!(result.errors, 1);
    assert!(harness.backup.join("Pictures/p.jpg").exists());
    assert!(harness.cache_entry("p").is_some());
}

#[test]
fn test_interrupt_is_a_warning_and_stops_the_walk() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);
    harness.ctx.interrupt.trigger();

    let result = harness.run();

    assert_eq!(result, RunResult::new(1, 0));
    assert!(remote.downloads().is_empty());
}

#[test]
fn test_download_killed_by_interrupt_is_one_warning() {
    let remote = three_files();
    let mut harness = Harness::new(&remote, &[]);
    remote.interrupt_on_download("b", &harness.ctx.interrupt);

    let result = harness.run();

    assert_eq!(result, RunResult::new(1, 0));
    assert_eq!(remote.downloads(), vec!["a".to_string()]);
    assert!(!harness.backup.join("b.txt").exists());
    assert!(!harness.backup.join("c.txt").exists());
}
