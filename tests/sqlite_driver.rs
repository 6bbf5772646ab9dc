#![cfg(feature = "sqlite")]

use sql_session::prelude::*;
use tempfile::TempDir;

fn sqlite_ctx(dir: &TempDir, pooled: bool) -> Result<DbContext, SqlSessionError> {
    let path = dir.path().join("session.db");
    let params = DriverParams::for_database(path.to_string_lossy()).with_connection_limit(4);
    DbContext::sqlite(ConnectionConfig::new(params).with_pool(pooled))
}

async fn create_people(db: &ConnectionHandle) -> Result<(), SqlSessionError> {
    db.query(
        "create table if not exists people (id integer primary key autoincrement, name text not null, age integer);",
        (),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn insert_builder_round_trips() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, true)?;
    let db = ctx.create_and_start().await?;
    create_people(&db).await?;

    let id = db
        .insert("people")
        .set("name", "alice")
        .set("age", 31)
        .run()
        .await?
        .expect("sqlite reports rowid");

    let row = db
        .select_row("select name, age from people where id = ?", RowValues::Int(id))
        .await?
        .expect("inserted row");
    assert_eq!(row.get("name"), Some(&RowValues::Text("alice".into())));
    assert_eq!(row.get("age"), Some(&RowValues::Int(31)));
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn multi_row_insert_and_update() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, true)?;
    let db = ctx.create_and_start().await?;
    create_people(&db).await?;

    db.insert("people")
        .row([("name", RowValues::from("a")), ("age", RowValues::Int(20))])
        .row([("name", RowValues::from("b")), ("age", RowValues::Int(20))])
        .row([("name", RowValues::from("c"))])
        .run()
        .await?;

    let changed = db
        .update("people", WhereClause::equals([("age", 20)]))
        .set("age", 21)
        .run()
        .await?;
    assert_eq!(changed, 2);

    let rows = db
        .query("select name from people where age is null", ())
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&RowValues::Text("c".into())));
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn rollback_discards_inserted_rows() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, false)?;
    let db = ctx.create_and_start().await?;
    create_people(&db).await?;

    db.begin().await?;
    db.insert_and_run("people", [("name", "ghost")]).await?;
    assert_eq!(db.query("select id from people", ()).await?.len(), 1);
    db.rollback().await?;
    assert!(db.query("select id from people", ()).await?.is_empty());

    db.begin().await?;
    db.insert_and_run("people", [("name", "kept")]).await?;
    db.commit().await?;
    assert_eq!(db.query("select id from people", ()).await?.len(), 1);
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn named_params_are_escaped_for_sqlite() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, true)?;
    let setup = ctx.create_and_start().await?;
    create_people(&setup).await?;
    setup.end().await?;

    let config = ctx.config().as_ref().clone().with_named_params(true);
    let db = ctx.create_and_start_with_config(config).await?;
    db.query(
        "insert into people (name, age) values (:name, :age)",
        Params::named([
            ("name", RowValues::from("O'Brien")),
            ("age", RowValues::Int(40)),
        ]),
    )
    .await?;
    let row = db
        .select_row(
            "select name from people where name = :name",
            Params::named([("name", "O'Brien")]),
        )
        .await?
        .expect("row");
    assert_eq!(row.get("name"), Some(&RowValues::Text("O'Brien".into())));
    assert_eq!(db.escape(&RowValues::from("O'Brien")), "'O''Brien'");
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn driver_errors_surface_as_query_errors() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, true)?;
    let db = ctx.create_and_start().await?;
    let err = db.query("select * from missing_table", ()).await.unwrap_err();
    let SqlSessionError::Query(query_err) = err else {
        panic!("expected a query error");
    };
    assert!(query_err.message.contains("missing_table"));
    assert_eq!(query_err.sql, "select * from missing_table");
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn pooled_handles_share_the_database() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = sqlite_ctx(&dir, true)?;
    let writer = ctx.create_and_start().await?;
    let reader = ctx.create_and_start().await?;
    assert_eq!(ctx.pools().len(), 1);

    create_people(&writer).await?;
    writer.insert_and_run("people", [("name", "shared")]).await?;
    let rows = reader.query("select name from people", ()).await?;
    assert_eq!(rows.len(), 1);

    assert_eq!(ctx.close_all().await, 2);
    assert!(ctx.close_default_pool().await?);
    Ok(())
}

#[tokio::test]
async fn missing_database_path_fails_to_start() {
    let ctx = DbContext::sqlite(ConnectionConfig::default()).expect("context");
    let db = ctx.handle();
    let err = db.start().await.unwrap_err();
    assert!(matches!(err, SqlSessionError::Acquisition(_)));
    assert!(!db.is_open());
}

#[tokio::test]
async fn config_file_loads_legacy_keys() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("from_file.db");
    let cfg_path = dir.path().join("db.json");
    let json = serde_json::json!({
        "usePool": true,
        "poolTimeout": 5,
        "useNamedParamsQueryFormat": true,
        "mysql": { "database": db_path.to_string_lossy(), "connectionLimit": 2 }
    });
    std::fs::write(&cfg_path, json.to_string()).expect("write config");

    let config = ConnectionConfig::from_json_file(&cfg_path)?;
    assert!(config.use_pool);
    assert!(config.use_named_params);
    assert_eq!(config.driver.connection_limit, Some(2));

    let ctx = DbContext::sqlite(config)?;
    let db = ctx.create_and_start().await?;
    let row = db
        .select_row("select :v as v", Params::named([("v", 7)]))
        .await?
        .expect("row");
    assert_eq!(row.get("v"), Some(&RowValues::Int(7)));
    db.end().await?;
    Ok(())
}

#[tokio::test]
async fn instants_store_the_same_text_bound_or_substituted() -> Result<(), SqlSessionError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("instants.db");
    let params = DriverParams::for_database(path.to_string_lossy()).with_timezone("+05:00");
    let ctx = DbContext::sqlite(ConnectionConfig::new(params).with_named_params(true))?;
    let db = ctx.create_and_start().await?;
    db.query("create table events (label text, at text)", ()).await?;

    let instant = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid date")
        .and_utc();
    db.query(
        "insert into events (label, at) values ('pos', ?)",
        RowValues::TimestampTz(instant),
    )
    .await?;
    db.query(
        "insert into events (label, at) values ('named', :v)",
        Params::named([("v", RowValues::TimestampTz(instant))]),
    )
    .await?;

    let rows = db.query("select label, at from events order by label", ()).await?;
    assert_eq!(rows.len(), 2);
    let expected = RowValues::Text("2024-06-01 17:00:00.000".into());
    assert_eq!(rows[0].get("at"), Some(&expected));
    assert_eq!(rows[1].get("at"), Some(&expected));
    db.end().await?;
    Ok(())
}
