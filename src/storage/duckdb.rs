use crate::error::{Result, RollupError};
use crate::metric::{Metric, NewMetric, TimeParts, ASSOCIATION_SLOTS};
use crate::storage::{AggregateQuery, AggregateRow, MetricScope, MetricStore, TimePart};
use crate::types::SlotFilter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Config, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS metrics_id_seq START 1;
CREATE TABLE IF NOT EXISTS metrics (
    id BIGINT PRIMARY KEY DEFAULT nextval('metrics_id_seq'),
    "type" INTEGER NOT NULL,
    amount DECIMAL(10, 2) NOT NULL,
    "time" TIMESTAMP NOT NULL,
    "year" INTEGER NOT NULL,
    "month" INTEGER NOT NULL,
    "day" INTEGER NOT NULL,
    "hour" INTEGER NOT NULL,
    week_of_year INTEGER NOT NULL,
    association_1 BIGINT,
    association_2 BIGINT,
    association_3 BIGINT,
    association_4 BIGINT,
    association_5 BIGINT
);
CREATE INDEX IF NOT EXISTS idx_metrics_type_time ON metrics("type", "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_1 ON metrics("type", association_1, "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_2 ON metrics("type", association_2, "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_3 ON metrics("type", association_3, "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_4 ON metrics("type", association_4, "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_5 ON metrics("type", association_5, "time");
CREATE INDEX IF NOT EXISTS idx_metrics_assoc_1_2 ON metrics("type", association_1, association_2, "time");
"#;

const METRIC_COLUMNS: &str = r#"id, "type", CAST(amount AS DOUBLE), epoch_us("time"), "year", "month", "day", "hour", week_of_year,
    association_1, association_2, association_3, association_4, association_5"#;

const TIMESTAMP_PARAM: &str = "make_timestamp(CAST(? AS BIGINT))";

/// DuckDB-based metric store
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    connection_string: String,
}

impl DuckDbBackend {
    pub fn new(connection_string: impl Into<String>) -> Result<Self> {
        let connection_string = connection_string.into();
        let config = Config::default();
        let conn = if connection_string == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(&connection_string, config)?
        };

        // Initialize tables synchronously
        conn.execute_batch(SCHEMA)
            .map_err(|e| RollupError::storage(format!("Failed to create metrics table: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            connection_string,
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::new(":memory:")
    }
}

#[async_trait]
impl MetricStore for DuckDbBackend {
    async fn init(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(SCHEMA)
            .map_err(|e| RollupError::storage(format!("Failed to create metrics table: {e}")))?;
        info!(connection = %self.connection_string, "Metrics schema ready");
        Ok(())
    }

    async fn insert(&self, metric: &NewMetric) -> Result<Metric> {
        let parts = metric.time_parts();
        let amount = metric.resolved_amount();
        let micros = metric.time.timestamp_micros();

        let conn = self.conn.lock().await;
        let sql = format!(
            r#"INSERT INTO metrics ("type", amount, "time", "year", "month", "day", "hour", week_of_year,
                association_1, association_2, association_3, association_4, association_5)
             VALUES (?, ?, {TIMESTAMP_PARAM}, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id, CAST(amount AS DOUBLE)"#
        );
        let [a1, a2, a3, a4, a5] = metric.associations;
        let (id, stored_amount) = conn
            .query_row(
                &sql,
                params![
                    metric.type_id,
                    amount,
                    micros,
                    parts.year,
                    parts.month as i32,
                    parts.day as i32,
                    parts.hour as i32,
                    parts.week_of_year as i32,
                    a1,
                    a2,
                    a3,
                    a4,
                    a5,
                ],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
            )
            .map_err(|e| RollupError::storage(format!("Failed to insert metric: {e}")))?;

        debug!(id, type_id = metric.type_id, amount = stored_amount, "Inserted metric");

        Ok(Metric {
            id,
            type_id: metric.type_id,
            amount: stored_amount,
            time: metric.time,
            parts,
            associations: metric.associations,
        })
    }

    async fn last(&self, scope: &MetricScope) -> Result<Option<Metric>> {
        let conn = self.conn.lock().await;

        let mut sql = format!(r#"SELECT {METRIC_COLUMNS} FROM metrics WHERE "type" = ?"#);
        let mut params: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(scope.type_id)];
        if let Some(before) = scope.before {
            sql.push_str(&format!(r#" AND "time" < {TIMESTAMP_PARAM}"#));
            params.push(Box::new(before.timestamp_micros()));
        }
        if let Some(after) = scope.after {
            sql.push_str(&format!(r#" AND "time" > {TIMESTAMP_PARAM}"#));
            params.push(Box::new(after.timestamp_micros()));
        }
        push_filters(&mut sql, &mut params, &scope.filters);
        sql.push_str(" ORDER BY id DESC LIMIT 1");

        debug!(sql = %sql, "Looking up last metric");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RollupError::storage(format!("Failed to prepare statement: {e}")))?;
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(std::convert::AsRef::as_ref).collect();
        let mut rows = stmt
            .query_map(param_refs.as_slice(), MetricRow::from_row)
            .map_err(|e| RollupError::storage(format!("Failed to execute query: {e}")))?;

        match rows.next() {
            Some(row) => row
                .map_err(|e| RollupError::storage(format!("Failed to read row: {e}")))?
                .into_metric()
                .map(Some),
            None => Ok(None),
        }
    }

    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>> {
        let conn = self.conn.lock().await;

        let mut group_columns: Vec<String> = query.parts.iter().map(|part| part_sql(*part).to_owned()).collect();
        if let Some(slot) = query.group_slot {
            group_columns.push(format!("association_{slot}"));
        }
        let key_select = query
            .parts
            .iter()
            .map(|part| format!("CAST({} AS BIGINT)", part_sql(*part)))
            .collect::<Vec<_>>()
            .join(", ");
        let slot_select = query
            .group_slot
            .map(|slot| format!("association_{slot}"))
            .unwrap_or_else(|| "CAST(NULL AS BIGINT)".to_owned());

        let mut sql = format!(
            r#"SELECT {key_select}, {slot_select}, CAST(SUM(amount) AS DOUBLE) AS total_amount,
                COUNT(*) AS row_count, MAX(id) AS last_id
             FROM metrics
             WHERE "type" = ? AND "time" >= {TIMESTAMP_PARAM} AND "time" <= {TIMESTAMP_PARAM}"#
        );
        let mut params: Vec<Box<dyn duckdb::ToSql>> = vec![
            Box::new(query.type_id),
            Box::new(query.start.timestamp_micros()),
            Box::new(query.end.timestamp_micros()),
        ];
        push_filters(&mut sql, &mut params, &query.filters);
        let group_by = group_columns.join(", ");
        sql.push_str(&format!(" GROUP BY {group_by} ORDER BY {group_by}"));

        debug!(sql = %sql, "Executing aggregation");

        let key_len = query.parts.len();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RollupError::storage(format!("Failed to prepare statement: {e}")))?;
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(std::convert::AsRef::as_ref).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut key = Vec::with_capacity(key_len);
                for idx in 0..key_len {
                    key.push(row.get::<_, i64>(idx)?);
                }
                Ok((
                    key,
                    row.get::<_, Option<i64>>(key_len)?,
                    row.get::<_, f64>(key_len + 1)?,
                    row.get::<_, i64>(key_len + 2)?,
                    row.get::<_, i64>(key_len + 3)?,
                ))
            })
            .map_err(|e| RollupError::storage(format!("Failed to execute query: {e}")))?;

        let mut results = Vec::new();
        for row in rows {
            let (key, slot_value, sum, count, last_id) =
                row.map_err(|e| RollupError::storage(format!("Failed to read row: {e}")))?;
            let key = key
                .into_iter()
                .map(|value| {
                    i32::try_from(value)
                        .map_err(|_| RollupError::storage(format!("Time part {value} is out of range")))
                })
                .collect::<Result<Vec<i32>>>()?;
            results.push(AggregateRow {
                key,
                slot_value,
                sum,
                count,
                last_id,
            });
        }
        Ok(results)
    }

    async fn fetch(&self, ids: &[i64]) -> Result<Vec<Metric>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {METRIC_COLUMNS} FROM metrics WHERE id IN ({placeholders}) ORDER BY id");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RollupError::storage(format!("Failed to prepare statement: {e}")))?;
        let param_refs: Vec<&dyn duckdb::ToSql> = ids.iter().map(|id| id as &dyn duckdb::ToSql).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), MetricRow::from_row)
            .map_err(|e| RollupError::storage(format!("Failed to execute query: {e}")))?;

        let mut metrics = Vec::with_capacity(ids.len());
        for row in rows {
            metrics.push(
                row.map_err(|e| RollupError::storage(format!("Failed to read row: {e}")))?
                    .into_metric()?,
            );
        }
        Ok(metrics)
    }

    async fn count(&self, type_id: Option<i32>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = match type_id {
            Some(type_id) => conn.query_row(
                r#"SELECT COUNT(*) FROM metrics WHERE "type" = ?"#,
                params![type_id],
                |row| row.get::<_, i64>(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM metrics", params![], |row| row.get::<_, i64>(0)),
        }
        .map_err(|e| RollupError::storage(format!("Failed to count metrics: {e}")))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn purge(&self, type_id: Option<i32>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let deleted = match type_id {
            Some(type_id) => conn.execute(r#"DELETE FROM metrics WHERE "type" = ?"#, params![type_id]),
            None => conn.execute("DELETE FROM metrics", params![]),
        }
        .map_err(|e| RollupError::storage(format!("Failed to purge metrics: {e}")))?;
        info!(deleted, type_id = ?type_id, "Purged metrics");
        Ok(deleted as u64)
    }
}

fn part_sql(part: TimePart) -> &'static str {
    match part {
        TimePart::Year => r#""year""#,
        TimePart::Month => r#""month""#,
        TimePart::Day => r#""day""#,
        TimePart::Hour => r#""hour""#,
        TimePart::WeekOfYear => "week_of_year",
        TimePart::IsoYear => r#"isoyear("time")"#,
    }
}

fn push_filters(sql: &mut String, params: &mut Vec<Box<dyn duckdb::ToSql>>, filters: &[SlotFilter]) {
    for filter in filters {
        match filter.value {
            Some(value) => {
                sql.push_str(&format!(" AND association_{} = ?", filter.slot));
                params.push(Box::new(value));
            }
            None => sql.push_str(&format!(" AND association_{} IS NULL", filter.slot)),
        }
    }
}

/// Raw column values of one metric row
struct MetricRow {
    id: i64,
    type_id: i32,
    amount: f64,
    micros: i64,
    parts: [i32; 5],
    associations: [Option<i64>; ASSOCIATION_SLOTS],
}

impl MetricRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            type_id: row.get(1)?,
            amount: row.get(2)?,
            micros: row.get(3)?,
            parts: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
            associations: [row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?, row.get(13)?],
        })
    }

    fn into_metric(self) -> Result<Metric> {
        let time = DateTime::<Utc>::from_timestamp_micros(self.micros)
            .ok_or_else(|| RollupError::storage(format!("Metric {} has an invalid time", self.id)))?;
        let [year, month, day, hour, week_of_year] = self.parts;
        Ok(Metric {
            id: self.id,
            type_id: self.type_id,
            amount: self.amount,
            time,
            parts: TimeParts {
                year,
                month: month as u32,
                day: day as u32,
                hour: hour as u32,
                week_of_year: week_of_year as u32,
            },
            associations: self.associations,
        })
    }
}
