//! Tests for the SQLite source adapter.

use super::*;
use crate::config::StageConfig;
use crate::error::{CodecError, CodecResult};
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{run_query, run_query_with};
use crate::meta::decoder::UnnamedNullPolicy;
use crate::meta::object::{JsonObjectCodec, ObjectCodec};
use crate::meta::types::{Decimal, Entry, BEGIN_GROUP, END_GROUP};

async fn int_pair_source() -> SqliteSource {
    let source = SqliteSource::open(":memory:").await.unwrap();
    source
        .execute_batch(
            "CREATE TABLE PAIRS (FIELD INT NOT NULL, FIELDNULLABLE INT);
             INSERT INTO PAIRS VALUES (0, NULL);
             INSERT INTO PAIRS VALUES (1, 2);",
        )
        .await
        .unwrap();
    source
}

fn pairs_query() -> QuerySpec {
    QuerySpec::new("SELECT FIELD, FIELDNULLABLE FROM PAIRS ORDER BY FIELD").table("PAIRS")
}

#[tokio::test]
async fn test_open_memory() {
    let source = SqliteSource::open(":memory:").await.unwrap();
    let affected = source
        .execute("CREATE TABLE t (id INTEGER)", &[])
        .await
        .unwrap();
    assert_eq!(affected, 0);
}

#[tokio::test]
async fn test_describe_reads_nullability() {
    let source = int_pair_source().await;
    let columns = source.describe("PAIRS").await.unwrap();

    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].name, "FIELD");
    assert_eq!(columns[0].data_type, "INT");
    assert!(!columns[0].nullable);
    assert!(columns[1].nullable);
}

#[tokio::test]
async fn test_int_pair_plain() {
    let source = int_pair_source().await;
    let output = run_query(&source, pairs_query(), &StageConfig::default())
        .await
        .unwrap();

    assert_eq!(output.rows, 2);
    assert_eq!(
        output.entries,
        vec![Entry::Int32(0), Entry::Null, Entry::Int32(1), Entry::Int32(2)]
    );
}

#[tokio::test]
async fn test_int_pair_with_names_and_markers() {
    let source = int_pair_source().await;
    let config = StageConfig::new()
        .emit_field_names(true)
        .emit_row_markers(true);
    let output = run_query(&source, pairs_query(), &config).await.unwrap();

    let rendered: Vec<String> = output.entries.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            BEGIN_GROUP,
            "FIELD",
            "0",
            "FIELDNULLABLE",
            "null",
            END_GROUP,
            BEGIN_GROUP,
            "FIELD",
            "1",
            "FIELDNULLABLE",
            "2",
            END_GROUP,
        ]
    );
}

#[tokio::test]
async fn test_omit_policy_drops_unnamed_nulls() {
    let source = int_pair_source().await;
    let config = StageConfig::new().unnamed_nulls(UnnamedNullPolicy::Omit);
    let output = run_query(&source, pairs_query(), &config).await.unwrap();
    assert_eq!(
        output.entries,
        vec![Entry::Int32(0), Entry::Int32(1), Entry::Int32(2)]
    );
}

#[tokio::test]
async fn test_decimal_column() {
    let source = SqliteSource::open(":memory:").await.unwrap();
    source
        .execute_batch(
            "CREATE TABLE MONEY (AMOUNT DECIMAL(20,2));
             INSERT INTO MONEY VALUES (0.10);",
        )
        .await
        .unwrap();

    let output = run_query(
        &source,
        QuerySpec::new("SELECT AMOUNT FROM MONEY"),
        &StageConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(output.entries, vec![Entry::Decimal(Decimal::new(10, 2))]);
}

#[tokio::test]
async fn test_mixed_types_with_params() {
    let source = SqliteSource::open(":memory:").await.unwrap();
    source
        .execute_batch(
            "CREATE TABLE items (
                 name VARCHAR(20) NOT NULL,
                 label NVARCHAR(20),
                 flag BOOLEAN,
                 payload BLOB,
                 meta JSON,
                 seen DATETIME
             );",
        )
        .await
        .unwrap();
    source
        .execute(
            "INSERT INTO items VALUES (?, ?, ?, ?, ?, ?)",
            &[
                SqliteValue::Text("widget".to_string()),
                SqliteValue::Text("caf\u{e9}".to_string()),
                SqliteValue::Integer(1),
                SqliteValue::Blob(vec![1, 2, 3]),
                SqliteValue::Text(r#"{"a":1}"#.to_string()),
                SqliteValue::Text("2021-03-04 05:06:07.089".to_string()),
            ],
        )
        .await
        .unwrap();

    let spec = QuerySpec::new("SELECT * FROM items WHERE name = ?")
        .param(SqliteValue::Text("widget".to_string()))
        .table("items");
    let output = run_query(&source, spec, &StageConfig::default())
        .await
        .unwrap();

    assert_eq!(output.entries.len(), 6);
    assert_eq!(output.entries[0], Entry::Text("widget".to_string()));
    assert_eq!(output.entries[1], Entry::Text("caf\u{e9}".to_string()));
    assert_eq!(output.entries[2], Entry::Bool(true));
    assert_eq!(output.entries[3], Entry::Bytes(vec![1, 2, 3]));
    assert_eq!(output.entries[4], Entry::Object(serde_json::json!({"a": 1})));
    match &output.entries[5] {
        Entry::DateTime(dt) => assert_eq!(dt.timestamp_millis(), 1_614_834_367_089),
        other => panic!("expected datetime, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expression_column_is_unsupported() {
    let source = int_pair_source().await;
    let err = run_query(
        &source,
        QuerySpec::new("SELECT FIELD + 1 FROM PAIRS"),
        &StageConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(err.partial.is_empty());
    assert!(matches!(
        err.source,
        SqliteError::Codec(CodecError::UnsupportedColumnType { column: 0, .. })
    ));
}

#[tokio::test]
async fn test_bad_sql_is_sqlite_error() {
    let source = int_pair_source().await;
    let err = run_query(
        &source,
        QuerySpec::new("SELECT nope FROM PAIRS"),
        &StageConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err.source, SqliteError::Sqlite(_)));
}

/// JSON codec whose decoder refuses objects carrying a `reject` key.
struct RejectingCodec;

impl ObjectCodec for RejectingCodec {
    fn encode(&self, value: &serde_json::Value) -> CodecResult<Vec<u8>> {
        JsonObjectCodec.encode(value)
    }

    fn decode(&self, payload: &[u8]) -> CodecResult<serde_json::Value> {
        let value = JsonObjectCodec.decode(payload)?;
        if value.get("reject").is_some() {
            return Err(CodecError::Object("rejected payload".to_string()));
        }
        Ok(value)
    }
}

#[tokio::test]
async fn test_decode_failure_stops_query_stream() {
    let source = SqliteSource::open(":memory:").await.unwrap();
    source
        .execute_batch(
            "CREATE TABLE DOCS (ID INTEGER PRIMARY KEY, DOC JSON NOT NULL);
             INSERT INTO DOCS (DOC) VALUES ('{\"n\":0}'), ('{\"n\":1}'), ('{\"reject\":true}');",
        )
        .await
        .unwrap();
    for n in 2..60 {
        source
            .execute(
                "INSERT INTO DOCS (DOC) VALUES (?)",
                &[SqliteValue::Text(format!("{{\"n\":{}}}", n))],
            )
            .await
            .unwrap();
    }

    let spec = QuerySpec::new("SELECT DOC FROM DOCS ORDER BY ID").table("DOCS");
    let config = StageConfig::new().pipe_capacity(4);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        run_query_with(&source, spec, &config, Arc::new(RejectingCodec)),
    )
    .await
    .expect("query did not return after a decode failure")
    .unwrap_err();

    assert!(matches!(
        err.source,
        SqliteError::Codec(CodecError::Object(_))
    ));
    assert_eq!(
        err.partial,
        vec![
            Entry::Object(serde_json::json!({"n": 0})),
            Entry::Object(serde_json::json!({"n": 1})),
        ]
    );
}
