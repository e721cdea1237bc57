//! Generation pruning on real directories

use account_backup::utils::retention::prune;
use test_utils::{entry_names, TestContext};

#[test]
fn test_keeps_newest_generations() {
    let test = TestContext::new();
    let dir = test.backup_dir("shop");
    for (i, age) in [500, 400, 300, 200, 100].iter().enumerate() {
        test.create_aged_dir(&dir.join(format!("shop_2024-01-0{}", i + 1)), *age);
    }

    let removed = prune(&dir, 2, "shop").unwrap();

    assert_eq!(removed.len(), 3);
    assert_eq!(entry_names(&dir), vec!["shop_2024-01-04", "shop_2024-01-05"]);
}

#[test]
fn test_age_wins_over_name() {
    let test = TestContext::new();
    let dir = test.backup_dir("shop");
    // renamed by hand: the name sorts last but the content is oldest
    test.create_aged_dir(&dir.join("shop_2099-12-31"), 900);
    test.create_aged_dir(&dir.join("shop_2024-01-01"), 100);

    prune(&dir, 1, "shop").unwrap();

    assert_eq!(entry_names(&dir), vec!["shop_2024-01-01"]);
}

#[test]
fn test_foreign_entries_are_left_alone() {
    let test = TestContext::new();
    let dir = test.backup_dir("shop");
    test.create_aged_dir(&dir.join("shop_2024-01-01"), 300);
    test.create_aged_dir(&dir.join("shop_2024-01-02"), 100);
    test.create_aged_dir(&dir.join("shop_old"), 900);
    test.create_aged_dir(&dir.join("shopping_list"), 900);
    test.create_aged_dir(&dir.join("notes"), 900);
    std::fs::write(dir.join("README"), "keep").unwrap();

    prune(&dir, 1, "shop").unwrap();

    assert_eq!(
        entry_names(&dir),
        vec!["README", "notes", "shop_2024-01-02", "shop_old", "shopping_list"]
    );
}

#[test]
fn test_longer_alias_sharing_the_directory_is_untouched() {
    let test = TestContext::new();
    let dir = test.backup_dir("db");
    test.create_aged_dir(&dir.join("db_2024-01-01_000000"), 300);
    test.create_aged_dir(&dir.join("db_2024-01-02_000000"), 100);
    test.create_aged_dir(&dir.join("db_prod_2024-01-01_000000"), 900);

    prune(&dir, 1, "db").unwrap();

    assert_eq!(
        entry_names(&dir),
        vec!["db_2024-01-02_000000", "db_prod_2024-01-01_000000"]
    );
}

#[test]
fn test_file_generations_count_too() {
    let test = TestContext::new();
    let dir = test.backup_dir("blog");
    test.create_aged_dir(&dir.join("blog_1"), 300);
    std::fs::write(dir.join("blog_2.zip"), "zip").unwrap();

    prune(&dir, 1, "blog").unwrap();

    assert_eq!(entry_names(&dir), vec!["blog_2.zip"]);
}

#[test]
fn test_prune_is_idempotent() {
    let test = TestContext::new();
    let dir = test.backup_dir("shop");
    test.create_aged_dir(&dir.join("shop_2024-01-01"), 300);
    test.create_aged_dir(&dir.join("shop_2024-01-02"), 200);
    test.create_aged_dir(&dir.join("shop_2024-01-03"), 100);

    prune(&dir, 2, "shop").unwrap();
    let second = prune(&dir, 2, "shop").unwrap();

    assert!(second.is_empty());
    assert_eq!(entry_names(&dir), vec!["shop_2024-01-02", "shop_2024-01-03"]);
}

#[test]
fn test_missing_directory_is_not_an_error() {
    let test = TestContext::new();

    assert!(prune(&test.backup_dir("ghost"), 3, "ghost").unwrap().is_empty());
}
