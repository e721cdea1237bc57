//! Report mails at the end of a batch

use account_backup::managers::notification::{NotificationManager, SUBJECT};
use test_utils::{
    with_counter, BackupManager, ConfigBuilder, GeneralConfig, MockExecutor, MockResponse,
    RecordingMailer, TestContext,
};

fn general(failure_only: bool) -> GeneralConfig {
    GeneralConfig {
        mail_user: "me@example.com".to_string(),
        mail_pass: "app-password".to_string(),
        failure_only,
        ..GeneralConfig::default()
    }
}

fn batch(
    test: &TestContext,
    builder: ConfigBuilder,
    executor: MockExecutor,
    general: GeneralConfig,
    mailer: &RecordingMailer,
) {
    let config = builder.persist(test.paths());
    let log_file = test.create_file("log/2024-01-01-000000.log", "INFO Done");
    let mut manager = BackupManager::new(test.context(config, executor))
        .with_notifier(NotificationManager::new(general, Box::new(mailer.clone())))
        .with_log_file(log_file);

    let counter = manager.context().counter.clone();
    with_counter(&counter, || manager.run(&[]));
}

#[test]
fn test_clean_batch_is_silent() {
    let test = TestContext::new();
    let mailer = RecordingMailer::new();
    let builder = ConfigBuilder::new().mysql("shop", &test.backup_dir("shop"), "shop", 1);

    batch(&test, builder, MockExecutor::new(), general(true), &mailer);

    assert!(mailer.sent().is_empty());
}

#[test]
fn test_failed_batch_mails_counts_and_log() {
    let test = TestContext::new();
    let mailer = RecordingMailer::new();
    let builder = ConfigBuilder::new().mysql("shop", &test.backup_dir("shop"), "shop", 1);
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::fail(1, "access denied"));

    batch(&test, builder, executor, general(true), &mailer);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    let message = &sent[0];
    assert_eq!(message.subject, SUBJECT);
    assert_eq!(message.to, vec!["me@example.com".to_string()]);
    assert!(message.html_body.contains("<h1>Backup complete</h1>"));
    assert!(message.html_body.contains("<p>0 Warning(s)</p>"));
    assert!(message.html_body.contains("<p>1 Error(s)</p>"));
    assert!(message.html_body.contains("<td>shop</td>"));
    assert_eq!(message.attachments.len(), 1);
}

#[test]
fn test_notify_always_alias_mails_clean_batch() {
    let test = TestContext::new();
    let mailer = RecordingMailer::new();
    let mut namespace = ConfigBuilder::new()
        .mysql("shop", &test.backup_dir("shop"), "shop", 1)
        .build()
        .remove("shop")
        .unwrap();
    namespace["notify_always"] = serde_json::json!(true);
    let builder = ConfigBuilder::new().alias("shop", namespace);

    batch(&test, builder, MockExecutor::new(), general(true), &mailer);

    assert_eq!(mailer.sent().len(), 1);
}

#[test]
fn test_every_batch_mailed_without_failure_only() {
    let test = TestContext::new();
    let mailer = RecordingMailer::new();

    batch(&test, ConfigBuilder::new(), MockExecutor::new(), general(false), &mailer);

    assert_eq!(mailer.sent().len(), 1);
}

#[test]
fn test_no_credentials_no_mail() {
    let test = TestContext::new();
    let mailer = RecordingMailer::new();
    let executor = MockExecutor::new().with_default_response(MockResponse::fail(1, "boom"));
    let builder = ConfigBuilder::new().mysql("shop", &test.backup_dir("shop"), "shop", 1);

    batch(&test, builder, executor, GeneralConfig::default(), &mailer);

    assert!(mailer.sent().is_empty());
}

#[test]
fn test_send_failure_does_not_break_the_batch() {
    let test = TestContext::new();
    let mailer = RecordingMailer::failing();
    let config = ConfigBuilder::new().persist(test.paths());
    let mut manager = BackupManager::new(test.context(config, MockExecutor::new()))
        .with_notifier(NotificationManager::new(general(false), Box::new(mailer.clone())));

    let counter = manager.context().counter.clone();
    let summary = with_counter(&counter, || manager.run(&[]));

    // an empty batch warns once, the failed send once more
    assert!(summary.reports.is_empty());
    assert_eq!(counter.snapshot().warnings, 2);
}
