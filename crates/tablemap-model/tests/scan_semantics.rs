use std::cell::RefCell;

use tablemap_core::{
    ConversionError, Cx, Entity, Error, FromValue, Hook, ModelHooks, Result, RowSet, Value,
};
use tablemap_macros::Entity;
use tablemap_model::{Db, DbConfig, JoinTree, TableModel};

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(entry: impl Into<String>) {
    LOG.with(|log| log.borrow_mut().push(entry.into()));
}

fn take_log() -> Vec<String> {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "accounts", hooks(before_scan, after_scan))]
struct Account {
    #[tablemap(pk)]
    id: i64,
    name: String,
    #[tablemap(rel = "has-one", join = "id=account_id", alias = "prefs")]
    settings: Option<Box<Settings>>,
}

impl ModelHooks for Account {
    fn before_scan(&mut self, _cx: &Cx) -> Result<()> {
        record("Account.before_scan");
        Ok(())
    }

    fn after_scan(&mut self, _cx: &Cx) -> Result<()> {
        record("Account.after_scan");
        if self.name == "fail" {
            return Err(Error::custom("account refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "settings", hooks(after_scan))]
struct Settings {
    #[tablemap(pk)]
    id: i64,
    lang: String,
    account_id: i64,
    country_id: Option<i64>,
    #[tablemap(rel = "belongs-to", join = "country_id=id")]
    country: Option<Country>,
}

impl ModelHooks for Settings {
    fn after_scan(&mut self, _cx: &Cx) -> Result<()> {
        record("Settings.after_scan");
        if self.lang == "fail" {
            return Err(Error::custom("settings refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "countries")]
struct Country {
    #[tablemap(pk)]
    id: i64,
    code: String,
}

fn account_row(columns: &[&str], values: Vec<Value>) -> RowSet {
    RowSet::new(columns.iter().copied()).row(values)
}

#[test]
fn repeated_join_returns_the_same_join() {
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);

    let first = model.join("settings", None).unwrap();
    let nodes = model.tree().node_count();
    let second = model.join("settings", None).unwrap();
    assert_eq!(first, second);
    assert_eq!(model.tree().node_count(), nodes);

    // Field name and alias resolve to the same join.
    assert_eq!(model.join("prefs", None), Some(first));
    assert_eq!(model.tree().node_count(), nodes);
    assert_eq!(model.get_join("prefs").map(|j| j.path()), Some("settings"));
    assert_eq!(model.tree().find("prefs"), Some(first));
}

#[test]
fn unknown_relation_allocates_nothing() {
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    assert!(model.join("", None).is_none());
    assert!(model.join("nope", None).is_none());
    assert!(model.join("settings.nope", None).is_none());
    assert_eq!(model.tree().node_count(), 1);

    let err = model.relation("nope", None).unwrap_err();
    assert!(matches!(err, Error::RelationNotFound { .. }));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn null_has_one_stays_absent() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings", None).unwrap();

    let mut rows = account_row(
        &["id", "name", "settings__id", "settings__lang"],
        vec![Value::BigInt(1), Value::from("ann"), Value::Null, Value::Null],
    );
    assert_eq!(model.scan_rows(&cx, &mut rows).unwrap(), 1);
    drop(model);

    assert_eq!(account.id, 1);
    assert!(account.settings.is_none());
    assert_eq!(take_log(), vec!["Account.before_scan", "Account.after_scan"]);
}

#[test]
fn joined_columns_demultiplex_into_nested_storage() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings", None).unwrap();

    let mut rows = account_row(
        &["id", "settings__id", "settings__lang"],
        vec![Value::BigInt(1), Value::BigInt(5), Value::from("en")],
    );
    model.scan_rows(&cx, &mut rows).unwrap();
    drop(model);

    let settings = account.settings.as_ref().unwrap();
    assert_eq!(account.id, 1);
    assert_eq!(settings.id, 5);
    assert_eq!(settings.lang, "en");
    // Root first, then the inline child, each once.
    assert_eq!(
        take_log(),
        vec!["Account.before_scan", "Account.after_scan", "Settings.after_scan"]
    );
}

#[test]
fn two_level_join_allocates_only_populated_levels() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let columns = ["id", "settings__lang", "settings__country__code"];

    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings.country", None).unwrap();
    assert_eq!(model.tree().node_count(), 3);
    let mut rows = account_row(
        &columns,
        vec![Value::BigInt(1), Value::from("de"), Value::Null],
    );
    model.scan_rows(&cx, &mut rows).unwrap();
    drop(model);
    let settings = account.settings.as_ref().unwrap();
    assert_eq!(settings.lang, "de");
    assert!(settings.country.is_none());

    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings.country", None).unwrap();
    let mut rows = account_row(
        &columns,
        vec![Value::BigInt(2), Value::Null, Value::from("DE")],
    );
    model.scan_rows(&cx, &mut rows).unwrap();
    drop(model);
    let country = account.settings.as_ref().and_then(|s| s.country.as_ref());
    assert_eq!(country.map(|c| c.code.as_str()), Some("DE"));
    take_log();
}

#[test]
fn unknown_columns_fail_unless_discarded() {
    let cx = Cx::for_testing();
    let columns = ["id", "bogus"];

    let strict = Db::new();
    let mut account = Account::default();
    let mut model = strict.model(&mut account);
    let mut rows = account_row(&columns, vec![Value::BigInt(1), Value::from("x")]);
    let err = model.scan_rows(&cx, &mut rows).unwrap_err();
    match err {
        Error::SchemaMismatch { table, column } => {
            assert_eq!(table, "Account");
            assert_eq!(column, "bogus");
        }
        other => panic!("unexpected error: {other}"),
    }

    let lenient = Db::with_config(DbConfig::new().discard_unknown_columns(true));
    let mut account = Account::default();
    let mut model = lenient.model(&mut account);
    let mut rows = account_row(&columns, vec![Value::BigInt(1), Value::from("x")]);
    assert_eq!(model.scan_rows(&cx, &mut rows).unwrap(), 1);
    drop(model);
    assert_eq!(account.id, 1);
    take_log();
}

#[test]
fn own_alias_prefix_routes_to_root_columns() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    let mut rows = account_row(&["account__name"], vec![Value::from("bo")]);
    model.scan_rows(&cx, &mut rows).unwrap();
    drop(model);
    assert_eq!(account.name, "bo");
    take_log();
}

#[test]
fn after_scan_errors_do_not_stop_other_hooks() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings", None).unwrap();

    let mut rows = account_row(
        &["id", "name", "settings__id", "settings__lang"],
        vec![
            Value::BigInt(1),
            Value::from("fail"),
            Value::BigInt(2),
            Value::from("fail"),
        ],
    );
    let err = model.scan_rows(&cx, &mut rows).unwrap_err();
    assert_eq!(err.hook(), Some((Hook::AfterScan, "Account")));
    assert_eq!(
        take_log(),
        vec!["Account.before_scan", "Account.after_scan", "Settings.after_scan"]
    );
}

#[test]
fn child_after_scan_error_is_reported() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings", None).unwrap();

    let mut rows = account_row(
        &["id", "settings__lang"],
        vec![Value::BigInt(1), Value::from("fail")],
    );
    let err = model.scan_rows(&cx, &mut rows).unwrap_err();
    assert_eq!(err.hook(), Some((Hook::AfterScan, "Settings")));
    take_log();
}

#[test]
fn empty_cursor_is_no_rows() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    let mut rows = RowSet::new(["id", "name"]);
    assert!(matches!(model.scan_rows(&cx, &mut rows), Err(Error::NoRows)));
    assert!(take_log().is_empty());
}

#[test]
fn struct_model_reads_only_the_first_row() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    let mut rows = RowSet::new(["id"])
        .row([Value::BigInt(1)])
        .row([Value::BigInt(2)]);
    assert_eq!(model.scan_rows(&cx, &mut rows).unwrap(), 1);
    drop(model);
    assert_eq!(account.id, 1);
    take_log();
}

#[test]
fn nested_tree_indexes_follow_relation_positions() {
    let mut tree = JoinTree::new(Account::table());
    let country = tree.resolve("settings.country", None).unwrap();
    let join = tree.join(country);
    assert_eq!(join.path(), "settings.country");
    assert!(join.parent().is_some());
    let node = tree.node(join.join_node());
    assert_eq!(node.depth(), 2);
    assert_eq!(node.index(), vec![0, 0]);
    assert_eq!(node.table().name(), "countries");
}

#[test]
fn alias_and_quoted_prefixes_route_to_the_join() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    model.join("settings", None).unwrap();

    let mut rows = account_row(
        &["id", "prefs__id", "\"settings__lang\"", "`prefs__account_id`"],
        vec![
            Value::BigInt(1),
            Value::BigInt(3),
            Value::from("fr"),
            Value::BigInt(1),
        ],
    );
    model.scan_rows(&cx, &mut rows).unwrap();
    drop(model);

    let settings = account.settings.as_ref().unwrap();
    assert_eq!(settings.id, 3);
    assert_eq!(settings.lang, "fr");
    assert_eq!(settings.account_id, 1);
    take_log();
}

#[test]
fn text_into_integer_column_fails_the_scan() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut account = Account::default();
    let mut model = db.model(&mut account);
    let mut rows = account_row(&["id", "name"], vec![Value::from("abc"), Value::from("x")]);
    let err = model.scan_rows(&cx, &mut rows).unwrap_err();
    assert!(matches!(err, Error::Conversion(_)));
    assert!(err.to_string().contains("id"));
    // BeforeScan ran; AfterScan did not.
    assert_eq!(take_log(), vec!["Account.before_scan"]);
}

fn upper(value: Value) -> Result<String, ConversionError> {
    String::from_value(value).map(|s| s.to_uppercase())
}

#[allow(clippy::ptr_arg)]
fn lower(label: &String) -> Value {
    Value::Text(label.to_lowercase())
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "labels")]
struct Label {
    #[tablemap(pk)]
    id: i64,
    #[tablemap(scan_with = "upper", append_with = "lower")]
    label: String,
}

#[test]
fn custom_scan_and_append_conversions_apply() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut label = Label::default();
    let mut model = db.model(&mut label);
    let mut rows = RowSet::new(["id", "label"]).row([Value::BigInt(1), Value::from("Ab")]);
    model.scan_rows(&cx, &mut rows).unwrap();

    assert_eq!(
        model.values().unwrap(),
        vec![("id", Value::BigInt(1)), ("label", Value::Text("ab".to_string()))]
    );
    let mut buf = String::new();
    model.append_column("label", &mut buf).unwrap();
    assert_eq!(buf, "'ab'");
    drop(model);
    assert_eq!(label.label, "AB");
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "writers")]
struct Writer {
    #[tablemap(pk)]
    id: i64,
    #[tablemap(rel = "has-many", join = "id=writer_id")]
    books: Vec<Novel>,
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "novels")]
struct Novel {
    #[tablemap(pk)]
    id: i64,
    writer_id: i64,
    #[tablemap(rel = "has-many", join = "id=novel_id")]
    chapters: Vec<Chapter>,
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "chapters")]
struct Chapter {
    #[tablemap(pk)]
    id: i64,
    novel_id: i64,
}

#[test]
fn nested_has_many_attaches_to_every_sequence_element() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut writers = vec![
        Writer {
            id: 1,
            ..Writer::default()
        },
        Writer {
            id: 2,
            ..Writer::default()
        },
    ];
    let mut model = db.slice_model(&mut writers);

    let books = model.relation("books", None).unwrap();
    let mut rows = RowSet::new(["id", "writer_id"])
        .row([Value::BigInt(10), Value::BigInt(1)])
        .row([Value::BigInt(11), Value::BigInt(1)])
        .row([Value::BigInt(20), Value::BigInt(2)]);
    assert_eq!(model.scan_relation(&cx, books, &mut rows).unwrap(), 3);

    let chapters = model.relation("books.chapters", None).unwrap();
    assert_eq!(
        model.relation_keys(chapters).unwrap(),
        vec![
            vec![Value::BigInt(10)],
            vec![Value::BigInt(11)],
            vec![Value::BigInt(20)]
        ]
    );

    let mut rows = RowSet::new(["id", "novel_id"])
        .row([Value::BigInt(100), Value::BigInt(10)])
        .row([Value::BigInt(101), Value::BigInt(20)])
        .row([Value::BigInt(102), Value::BigInt(10)]);
    assert_eq!(model.scan_relation(&cx, chapters, &mut rows).unwrap(), 3);
    drop(model);

    let ids = |novel: &Novel| novel.chapters.iter().map(|c| c.id).collect::<Vec<_>>();
    assert_eq!(ids(&writers[0].books[0]), vec![100, 102]);
    assert!(writers[0].books[1].chapters.is_empty());
    assert_eq!(ids(&writers[1].books[0]), vec![101]);
}

#[test]
fn nested_has_many_through_a_struct_model() {
    let cx = Cx::for_testing();
    let db = Db::new();
    let mut writer = Writer {
        id: 1,
        books: vec![Novel {
            id: 10,
            writer_id: 1,
            ..Novel::default()
        }],
    };
    let mut model = db.model(&mut writer);
    let chapters = model.relation("books.chapters", None).unwrap();
    assert_eq!(
        model.relation_keys(chapters).unwrap(),
        vec![vec![Value::BigInt(10)]]
    );
    let mut rows = RowSet::new(["id", "novel_id"]).row([Value::BigInt(100), Value::BigInt(10)]);
    assert_eq!(model.scan_relation(&cx, chapters, &mut rows).unwrap(), 1);
    drop(model);
    assert_eq!(writer.books[0].chapters.len(), 1);
}
