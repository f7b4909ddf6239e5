//! SQLite row source.

use std::collections::HashMap;

use tokio_rusqlite::Connection;

use super::error::{SqliteError, SqliteResult};
use super::types::{DeclaredType, SqliteValue};
use crate::meta::framer::RowWriter;
use crate::meta::types::MetaValue;
use crate::pipe::FrameWriter;
use crate::schema::{pump, sqlite_table_info_pragma, ColumnMeta, RowCursor, TableColumn};

/// A query to stream.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub sql: String,
    pub params: Vec<SqliteValue>,
    /// Source table, used to read column nullability. Without it every
    /// column is treated as nullable.
    pub table: Option<String>,
}

impl QuerySpec {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            table: None,
        }
    }

    pub fn param(mut self, value: SqliteValue) -> Self {
        self.params.push(value);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// A SQLite database acting as a row source.
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open a SQLite database.
    ///
    /// Supports:
    /// - `:memory:` for in-memory database
    /// - File path for disk-based database
    pub async fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().await?
        } else {
            let conn = Connection::open(path).await?;
            conn.call(|c| {
                c.execute_batch(
                    "PRAGMA journal_mode=WAL;
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok(())
            })
            .await?;
            conn
        };
        Ok(Self { conn })
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(&self, sql: &str, params: &[SqliteValue]) -> SqliteResult<u64> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.to_vec();

        self.conn
            .call(move |conn| {
                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

                let rows_affected = conn.execute(&sql, params_refs.as_slice())?;
                Ok(rows_affected as u64)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Execute multiple statements (for DDL, etc.).
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();

        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Column definitions of `table`.
    pub async fn describe(&self, table: &str) -> SqliteResult<Vec<TableColumn>> {
        let table = table.to_string();
        self.conn
            .call(move |conn| Ok(table_info(conn, &table)?))
            .await
            .map_err(SqliteError::from)
    }

    /// Run `spec` and encode every row into `sink` on the database thread.
    ///
    /// Returns the number of rows written. The sink is closed when this
    /// returns, whether or not streaming succeeded.
    pub async fn stream_query(
        &self,
        spec: QuerySpec,
        writer: RowWriter,
        sink: FrameWriter,
    ) -> SqliteResult<u64> {
        tracing::debug!("Streaming query: {}", spec.sql);
        let streamed = self
            .conn
            .call(move |conn| {
                let mut writer = writer;
                let mut sink = sink;
                let result = stream_rows(conn, &spec, &mut writer, &mut sink);
                sink.close();
                Ok(result)
            })
            .await
            .map_err(SqliteError::from)?;

        match &streamed {
            Ok(rows) => tracing::debug!("Streamed {} rows", rows),
            Err(e) => tracing::warn!("Streaming stopped: {}", e),
        }
        streamed
    }
}

fn stream_rows(
    conn: &rusqlite::Connection,
    spec: &QuerySpec,
    writer: &mut RowWriter,
    sink: &mut FrameWriter,
) -> SqliteResult<u64> {
    let not_null: HashMap<String, bool> = match &spec.table {
        Some(table) => table_info(conn, table)?
            .into_iter()
            .map(|c| (c.name, !c.nullable))
            .collect(),
        None => HashMap::new(),
    };

    let mut stmt = conn.prepare(&spec.sql)?;
    let (columns, types): (Vec<ColumnMeta>, Vec<DeclaredType>) = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let ty = DeclaredType::parse(column.decl_type());
            let nullable = !not_null.get(column.name()).copied().unwrap_or(false);
            let meta = ColumnMeta::new(index, column.name(), ty.kind)
                .nullable(nullable)
                .signed(ty.signed)
                .scale(ty.scale);
            (meta, ty)
        })
        .unzip();

    let params_refs: Vec<&dyn rusqlite::ToSql> = spec
        .params
        .iter()
        .map(|p| p as &dyn rusqlite::ToSql)
        .collect();
    let rows = stmt.query(params_refs.as_slice())?;

    let mut cursor = SqliteCursor {
        rows,
        columns,
        types,
    };
    pump(&mut cursor, writer, sink)
}

fn table_info(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<Vec<TableColumn>> {
    let mut stmt = conn.prepare(&sqlite_table_info_pragma(table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(TableColumn {
                name: row.get("name")?,
                data_type: row.get("type")?,
                nullable: row.get::<_, i64>("notnull")? == 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Cursor over a live rusqlite result set.
struct SqliteCursor<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    columns: Vec<ColumnMeta>,
    types: Vec<DeclaredType>,
}

impl RowCursor for SqliteCursor<'_> {
    type Error = SqliteError;

    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<MetaValue>>, Self::Error> {
        let Some(row) = self.rows.next()? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.types.len());
        for (i, ty) in self.types.iter().enumerate() {
            let value = row.get_ref(i)?;
            values.push(ty.to_meta_value(value, i).map_err(SqliteError::from)?);
        }
        Ok(Some(values))
    }
}
