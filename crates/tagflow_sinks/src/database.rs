use std::path::PathBuf;
use tagflow_protocol::TagEvent;
use tracing::{debug, info};

use crate::record::TagRow;
use crate::{SinkError, SinkResult, TagSink};

/// SQLite row store: one row per event in a flat table.
pub struct DatabaseSink {
    table_name: String,
    conn: Option<rusqlite::Connection>,
    insert_sql: String,
    rows_written: u64,
}

impl DatabaseSink {
    /// Open (or create) the database and make sure the table exists.
    pub fn open(db_path: impl Into<PathBuf>, table_name: &str) -> SinkResult<Self> {
        let db_path = db_path.into();
        validate_table_name(table_name)?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(
            "Initializing SQLite sink: {} (table: {})",
            db_path.display(),
            table_name
        );
        let conn = rusqlite::Connection::open(&db_path)?;

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             epc TEXT NOT NULL, \
             antenna INTEGER, \
             channel INTEGER, \
             seen_count INTEGER, \
             last_seen TEXT)",
            table_name
        );
        debug!("CREATE TABLE: {}", create_sql);
        conn.execute(&create_sql, [])?;

        let insert_sql = format!(
            "INSERT INTO \"{}\" (epc, antenna, channel, seen_count, last_seen) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            table_name
        );

        Ok(Self {
            table_name: table_name.to_string(),
            conn: Some(conn),
            insert_sql,
            rows_written: 0,
        })
    }
}

fn validate_table_name(name: &str) -> SinkResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(SinkError::message(format!(
            "Invalid table name '{}': use letters, digits and underscores",
            name
        )))
    }
}

impl TagSink for DatabaseSink {
    fn name(&self) -> &str {
        "database"
    }

    fn write(&mut self, event: &TagEvent) -> SinkResult<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SinkError::message("SQLite sink already closed"))?;

        let row = TagRow::from(event);
        let tx = conn.transaction()?;
        tx.execute(
            &self.insert_sql,
            rusqlite::params![
                row.epc,
                row.antenna,
                row.channel,
                row.seen_count,
                row.last_seen
            ],
        )?;
        tx.commit()?;

        self.rows_written += 1;
        debug!(
            "Inserted {} into {} (total: {})",
            row.epc, self.table_name, self.rows_written
        );
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| SinkError::Database(err))?;
            info!("Closed SQLite sink: {} total rows", self.rows_written);
        }
        Ok(())
    }
}
