//! The `add` flow against a real config store

use account_backup::config::GENERAL_NAMESPACE;
use account_backup::managers::registration::RegistrationManager;
use serde_json::json;
use test_utils::{ConfigBuilder, GeneralConfig, JsonStore, ScriptedPrompter, TestContext};

#[test]
fn test_add_server_alias() {
    let test = TestContext::new();
    let mut config = JsonStore::open(test.paths().config_file()).unwrap();
    let mut prompter = ScriptedPrompter::new([
        "site", "Server", "/srv/backups/site", // alias, type, path
        "example.com", "deploy", "pw", "/var/www", // connection
        "y", "",      // archive, remote_zip
        "cache/, *.log", // exclude
        "",           // versions
    ]);

    let alias = RegistrationManager::new(&mut config, test.paths())
        .add(&mut prompter)
        .unwrap();

    assert_eq!(alias, "site");
    assert_eq!(prompter.remaining(), 0);
    let stored = JsonStore::open(test.paths().config_file()).unwrap();
    assert_eq!(
        stored.get("site"),
        Some(&json!({
            "type": "server",
            "backup_path": "/srv/backups/site",
            "ssh_host": "example.com",
            "ssh_user": "deploy",
            "ssh_pass": "pw",
            "path": "/var/www",
            "archive": true,
            "remote_zip": false,
            "exclude": ["cache/", "*.log"],
            "versions": 7,
        }))
    );
}

#[test]
fn test_type_can_be_picked_by_index() {
    let test = TestContext::new();
    let mut config = JsonStore::open(test.paths().config_file()).unwrap();
    let mut prompter = ScriptedPrompter::new(["me", "0", "", "octocat", "token", "", ""]);

    RegistrationManager::new(&mut config, test.paths())
        .add(&mut prompter)
        .unwrap();

    assert_eq!(config.get("me.type"), Some(&json!("github")));
    assert_eq!(config.get("me.archive"), Some(&json!(false)));
    assert!(prompter
        .transcript
        .iter()
        .any(|t| t == "Download zip archives of the latest tag instead of cloning [y/N]"));
}

#[test]
fn test_existing_aliases_are_untouched() {
    let test = TestContext::new();
    let mut config = ConfigBuilder::new()
        .mysql("shop", &test.backup_dir("shop"), "shop", 3)
        .persist(test.paths());
    let before = config.get("shop").cloned();
    let mut prompter = ScriptedPrompter::new(["shop", "gists", "Gist", "", "octocat", "t", "", ""]);

    RegistrationManager::new(&mut config, test.paths())
        .add(&mut prompter)
        .unwrap();

    assert_eq!(config.get("shop").cloned(), before);
    assert_eq!(config.get("gists.archive"), Some(&json!(true)));
}

#[test]
fn test_script_running_out_aborts_without_saving() {
    let test = TestContext::new();
    let mut config = JsonStore::open(test.paths().config_file()).unwrap();
    let mut prompter = ScriptedPrompter::new(["half", "MySQL", ""]);

    let result = RegistrationManager::new(&mut config, test.paths()).add(&mut prompter);

    assert!(result.is_err());
    assert!(config.get("half").is_none());
}

#[test]
fn test_mail_already_configured_is_not_asked() {
    let test = TestContext::new();
    let mut config = ConfigBuilder::new()
        .mail("me@example.com", "pw", true)
        .persist(test.paths());
    let mut prompter = ScriptedPrompter::default();

    let asked = RegistrationManager::new(&mut config, test.paths())
        .configure_mail(&mut prompter)
        .unwrap();

    assert!(!asked);
    assert!(prompter.transcript.is_empty());
}

#[test]
fn test_declining_mail_saves_nothing() {
    let test = TestContext::new();
    let mut config = JsonStore::open(test.paths().config_file()).unwrap();
    let mut prompter = ScriptedPrompter::new(["n"]);

    let saved = RegistrationManager::new(&mut config, test.paths())
        .configure_mail(&mut prompter)
        .unwrap();

    assert!(!saved);
    assert!(config.get(GENERAL_NAMESPACE).is_none());
    let general: GeneralConfig = config.get_as(GENERAL_NAMESPACE).unwrap().unwrap_or_default();
    assert!(!general.mail_configured());
}
