//! Embedded per-type schemas

use account_backup::config::{FieldType, Schema, SchemaError};
use rstest::rstest;
use serde_json::{json, Map, Value};
use test_utils::StrategyKind;

fn namespace(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[rstest]
#[case(StrategyKind::Github)]
#[case(StrategyKind::Gist)]
#[case(StrategyKind::GooglePhotos)]
#[case(StrategyKind::GoogleDrive)]
#[case(StrategyKind::Wordpress)]
#[case(StrategyKind::Dropbox)]
#[case(StrategyKind::Mysql)]
#[case(StrategyKind::Server)]
#[case(StrategyKind::Mongodb)]
#[case(StrategyKind::Postgresql)]
fn test_every_schema_loads(#[case] kind: StrategyKind) {
    let schema = Schema::for_kind(kind).unwrap();

    assert!(!schema.fields.is_empty());
    let keys = schema.required_keys();
    assert_eq!(&keys[..2], &["backup_path", "type"]);
    for field in &schema.fields {
        assert!(!field.key.is_empty());
        assert!(!field.key.contains('.'), "{} in {}", field.key, kind);
    }
}

#[test]
fn test_all_kinds_are_covered_once() {
    assert_eq!(StrategyKind::ALL.len(), 10);
    for kind in StrategyKind::ALL {
        assert_eq!(kind.tag().parse::<StrategyKind>().unwrap(), kind);
    }
    assert!("ftp".parse::<StrategyKind>().is_err());
}

#[test]
fn test_optional_fields_are_not_required() {
    let schema = Schema::for_kind(StrategyKind::Server).unwrap();

    let keys = schema.required_keys();
    assert!(keys.contains(&"ssh_host"));
    assert!(!keys.contains(&"exclude"));
}

#[test]
fn test_first_missing_follows_declaration_order() {
    let schema = Schema::for_kind(StrategyKind::Github).unwrap();

    let empty = namespace(json!({}));
    assert_eq!(schema.first_missing(&empty).as_deref(), Some("backup_path"));

    let partial = namespace(json!({
        "type": "github",
        "backup_path": "/b",
        "username": "",
        "token": null,
    }));
    assert_eq!(schema.first_missing(&partial).as_deref(), Some("username"));

    let complete = namespace(json!({
        "type": "github",
        "backup_path": "/b",
        "username": "octocat",
        "token": "t",
        "archive": false,
    }));
    assert_eq!(schema.first_missing(&complete), None);
}

#[test]
fn test_false_and_zero_count_as_present() {
    let schema = Schema::for_kind(StrategyKind::Mysql).unwrap();
    let ns = namespace(json!({
        "type": "mysql",
        "backup_path": "/b",
        "db_host": "localhost",
        "db_port": 0,
        "db_name": "shop",
        "db_user": "root",
        "db_pass": "pw",
        "versions": 0,
    }));

    assert_eq!(schema.first_missing(&ns), None);
}

#[rstest]
#[case("db_port", "", Some(json!(3306)))]
#[case("db_port", "3307", Some(json!(3307)))]
#[case("db_host", "", Some(json!("localhost")))]
#[case("db_name", " shop ", Some(json!("shop")))]
fn test_parse_answer(#[case] key: &str, #[case] answer: &str, #[case] expected: Option<Value>) {
    let schema = Schema::for_kind(StrategyKind::Mysql).unwrap();
    let field = schema.field(key).unwrap();

    assert_eq!(field.parse_answer(answer).unwrap(), expected);
}

#[test]
fn test_parse_answer_rejections() {
    let schema = Schema::for_kind(StrategyKind::Mysql).unwrap();

    assert!(matches!(
        schema.field("db_port").unwrap().parse_answer("abc"),
        Err(SchemaError::InvalidAnswer { .. })
    ));
    assert!(matches!(
        schema.field("db_name").unwrap().parse_answer(""),
        Err(SchemaError::Required(_))
    ));
}

#[test]
fn test_list_and_bool_answers() {
    let schema = Schema::for_kind(StrategyKind::Server).unwrap();
    let exclude = schema.field("exclude").unwrap();
    let archive = schema.field("archive").unwrap();

    assert_eq!(exclude.field_type, FieldType::List);
    assert_eq!(
        exclude.parse_answer("cache/, *.log,,").unwrap(),
        Some(json!(["cache/", "*.log"]))
    );
    assert_eq!(exclude.parse_answer("").unwrap(), Some(json!([])));
    assert_eq!(archive.parse_answer("YES").unwrap(), Some(json!(true)));
    assert_eq!(archive.parse_answer("").unwrap(), Some(json!(false)));
    assert_eq!(archive.default_hint(), " [y/N]");
}
