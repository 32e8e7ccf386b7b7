//! Introspection over scripted catalog results.
//!
//! The mock connector answers catalog queries with fixed rows, so these tests
//! cover row normalization and error handling without a server.

mod common;

use common::{MockConnector, MockState, mock_pool, row};
use db_dialect::Dialect;
use db_dialect::error::DialectError;
use db_dialect::models::{Backend, ConstraintKind, ForeignKeyAction, IntrospectOptions, Value};
use std::sync::Arc;

fn dialect(backend: Backend) -> (Dialect<MockConnector>, Arc<MockState>) {
    let (pool, state) = mock_pool(2);
    (Dialect::from_pool(backend, pool), state)
}

fn t(s: &str) -> Value {
    Value::from(s)
}

fn script_postgres_catalog(state: &MockState) {
    state.respond(
        "FROM information_schema.tables",
        vec![
            row([("table_name", t("orders")), ("table_schema", t("public")), ("table_type", t("BASE TABLE"))]),
            row([("table_name", t("users")), ("table_schema", t("public")), ("table_type", t("BASE TABLE"))]),
            row([("table_name", t("v_orders")), ("table_schema", t("public")), ("table_type", t("VIEW"))]),
        ],
    );
    let column = |table: &str, name: &str, data_type: &str, nullable: bool, ordinal: i64| {
        row([
            ("table_name", t(table)),
            ("column_name", t(name)),
            ("data_type", t(data_type)),
            ("is_nullable", Value::Bool(nullable)),
            ("has_default", Value::Bool(false)),
            ("is_auto_increment", Value::Bool(false)),
            ("ordinal", Value::Int(ordinal)),
            ("comment", Value::Null),
        ])
    };
    state.respond(
        "FROM information_schema.columns",
        vec![
            column("orders", "id", "bigint", false, 1),
            column("orders", "user_id", "bigint", true, 2),
            column("users", "id", "bigint", false, 1),
            column("users", "email", "character varying(255)", true, 2),
        ],
    );
    let key = |name: &str, table: &str, kind: &str, column: &str, references: Option<(&str, &str)>| {
        row([
            ("constraint_name", t(name)),
            ("table_name", t(table)),
            ("constraint_type", t(kind)),
            ("column_name", t(column)),
            ("position", Value::Int(1)),
            ("referenced_table", references.map_or(Value::Null, |(tbl, _)| t(tbl))),
            ("referenced_column", references.map_or(Value::Null, |(_, col)| t(col))),
            ("on_delete", t(if references.is_some() { "c" } else { " " })),
            ("on_update", t(if references.is_some() { "a" } else { " " })),
        ])
    };
    state.respond(
        "FROM pg_catalog.pg_constraint",
        vec![
            key("orders_pkey", "orders", "p", "id", None),
            key("orders_user_id_fkey", "orders", "f", "user_id", Some(("users", "id"))),
            key("users_email_key", "users", "u", "email", None),
            key("users_pkey", "users", "p", "id", None),
        ],
    );
}

#[tokio::test]
async fn test_postgres_catalog_is_normalized() {
    let (dialect, state) = dialect(Backend::PostgreSQL);
    script_postgres_catalog(&state);

    let introspector = dialect.create_introspector(dialect.create_driver());
    let metadata = introspector
        .get_metadata(&IntrospectOptions::new())
        .await
        .unwrap();

    let names: Vec<&str> = metadata.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);

    let orders = metadata.table("orders", Some("public")).unwrap();
    assert_eq!(orders.primary_key(), vec!["id"]);
    assert!(orders.column("id").unwrap().is_primary_key);
    let fk = orders.foreign_keys().next().unwrap();
    assert_eq!(fk.name.as_deref(), Some("orders_user_id_fkey"));
    assert_eq!(
        fk.kind,
        ConstraintKind::ForeignKey {
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
            on_delete: ForeignKeyAction::Cascade,
            on_update: ForeignKeyAction::NoAction,
        }
    );

    let users = metadata.table("users", None).unwrap();
    assert!(
        users
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::Unique && c.columns == vec!["email"])
    );

    // Schema defaults to public and no table filter is sent
    let statements = state.statements();
    let first = &statements[0];
    assert_eq!(first.params, vec![t("public"), Value::Null]);
    assert_eq!(state.statements().len(), 3);
    assert_eq!(dialect.pool().status().checked_out, 0);
}

#[tokio::test]
async fn test_views_are_opt_in() {
    let (dialect, state) = dialect(Backend::PostgreSQL);
    script_postgres_catalog(&state);

    let introspector = dialect.create_introspector(dialect.create_driver());
    let tables = introspector
        .get_tables(&IntrospectOptions::new().with_views(true).with_schema("public"))
        .await
        .unwrap();
    let view = tables.iter().find(|t| t.name == "v_orders").unwrap();
    assert!(view.is_view);
}

#[tokio::test]
async fn test_failing_catalog_query_fails_whole_call() {
    let (dialect, state) = dialect(Backend::PostgreSQL);
    script_postgres_catalog(&state);
    state.fail_on("FROM information_schema.columns");

    let introspector = dialect.create_introspector(dialect.create_driver());
    let err = introspector
        .get_metadata(&IntrospectOptions::new())
        .await
        .unwrap_err();

    match err {
        DialectError::Introspection { object, .. } => assert_eq!(object, "columns"),
        other => panic!("expected an introspection error, got {other:?}"),
    }
    // The constraint query never ran and the connection went back healthy
    assert_eq!(state.statements().len(), 2);
    let status = dialect.pool().status();
    assert_eq!(status.checked_out, 0);
    assert_eq!(status.idle, 1);
}

#[tokio::test]
async fn test_unexpected_row_shape_is_an_error() {
    let (dialect, state) = dialect(Backend::PostgreSQL);
    state.respond(
        "FROM information_schema.tables",
        vec![row([("table_name", t("orders")), ("table_schema", t("public")), ("table_type", t("BASE TABLE"))])],
    );
    state.respond(
        "FROM information_schema.columns",
        vec![row([("table_name", t("orders")), ("column_name", Value::Int(7))])],
    );

    let introspector = dialect.create_introspector(dialect.create_driver());
    let err = introspector
        .get_tables(&IntrospectOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DialectError::Introspection { .. }));
}

#[tokio::test]
async fn test_mysql_describe_table_filters_by_name() {
    let (dialect, state) = dialect(Backend::MySQL);
    state.respond(
        "FROM information_schema.TABLES",
        vec![row([("TABLE_NAME", t("orders")), ("TABLE_SCHEMA", t("shop")), ("TABLE_TYPE", t("BASE TABLE"))])],
    );
    state.respond(
        "FROM information_schema.COLUMNS",
        vec![
            row([
                ("TABLE_NAME", t("orders")),
                ("COLUMN_NAME", t("tenant_id")),
                ("DATA_TYPE", t("int")),
                ("IS_NULLABLE", Value::Int(0)),
                ("HAS_DEFAULT", Value::Int(0)),
                ("IS_AUTO_INCREMENT", Value::Int(0)),
                ("ORDINAL", Value::Int(1)),
                ("COMMENT", t("")),
            ]),
            row([
                ("TABLE_NAME", t("orders")),
                ("COLUMN_NAME", t("id")),
                ("DATA_TYPE", t("bigint unsigned")),
                ("IS_NULLABLE", Value::Int(0)),
                ("HAS_DEFAULT", Value::Int(0)),
                ("IS_AUTO_INCREMENT", Value::Int(1)),
                ("ORDINAL", Value::Int(2)),
                ("COMMENT", t("row id")),
            ]),
        ],
    );
    let pk = |column: &str, position: i64| {
        row([
            ("CONSTRAINT_NAME", t("PRIMARY")),
            ("TABLE_NAME", t("orders")),
            ("CONSTRAINT_TYPE", t("PRIMARY KEY")),
            ("COLUMN_NAME", t(column)),
            ("POSITION", Value::Int(position)),
            ("REFERENCED_TABLE", Value::Null),
            ("REFERENCED_COLUMN", Value::Null),
            ("ON_DELETE", Value::Null),
            ("ON_UPDATE", Value::Null),
        ])
    };
    state.respond(
        "FROM information_schema.TABLE_CONSTRAINTS",
        vec![pk("tenant_id", 1), pk("id", 2)],
    );

    let introspector = dialect.create_introspector(dialect.create_driver());
    let orders = introspector
        .describe_table("orders", Some("shop"))
        .await
        .unwrap();

    assert_eq!(orders.schema.as_deref(), Some("shop"));
    assert_eq!(orders.primary_key(), vec!["tenant_id", "id"]);
    let id = orders.column("id").unwrap();
    assert!(id.is_auto_incrementing);
    assert_eq!(id.comment.as_deref(), Some("row id"));
    assert_eq!(orders.column("tenant_id").unwrap().comment, None);

    let statements = state.statements();
    let first = &statements[0];
    assert_eq!(first.params, vec![t("shop"), t("orders")]);
}

#[tokio::test]
async fn test_describe_missing_table() {
    let (dialect, _state) = dialect(Backend::MySQL);
    let introspector = dialect.create_introspector(dialect.create_driver());

    let err = introspector.describe_table("ghost", None).await.unwrap_err();
    match err {
        DialectError::Introspection { object, .. } => assert_eq!(object, "ghost"),
        other => panic!("expected an introspection error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_schemas() {
    let (dialect, state) = dialect(Backend::PostgreSQL);
    state.respond(
        "nspname::text AS name",
        vec![row([("name", t("billing"))]), row([("name", t("public"))])],
    );

    let introspector = dialect.create_introspector(dialect.create_driver());
    let schemas = introspector.get_schemas().await.unwrap();
    let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["billing", "public"]);
}

#[tokio::test]
async fn test_factory_shares_backend_and_pool() {
    let (dialect, _state) = dialect(Backend::MySQL);

    let driver = dialect.create_driver();
    let compiler = dialect.create_query_compiler();
    let adapter = dialect.create_adapter();
    let introspector = dialect.create_introspector(driver.clone());

    assert_eq!(driver.backend(), Backend::MySQL);
    assert_eq!(compiler.adapter().backend(), Backend::MySQL);
    assert_eq!(adapter.backend(), Backend::MySQL);
    assert_eq!(introspector.driver().backend(), Backend::MySQL);
    assert!(Arc::ptr_eq(driver.pool(), dialect.pool()));

    // A borrowed pool outlives the dialect
    dialect.close().await;
    assert!(!dialect.pool().is_closed());
}
