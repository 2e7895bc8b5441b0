use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bb8::{ManageConnection, Pool, RunError};
use br_store::{QueryParam, Row};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tiberius::{Client, ColumnData, Config, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use super::{QueryExecutor, StoreError, StoreResult};

type TdsClient = Client<Compat<TcpStream>>;

const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled TDS client plus a marker for a statement that never completed.
///
/// A connection whose statement future was dropped may still have the old
/// result streaming in, so the pool discards it instead of reusing it.
pub struct TdsConnection {
    client: TdsClient,
    in_flight: bool,
}

/// Opens and validates SQL Server connections for the pool.
pub struct TdsConnectionManager {
    config: Config,
}

impl TdsConnectionManager {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ManageConnection for TdsConnectionManager {
    type Connection = TdsConnection;
    type Error = StoreError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let addr = self.config.get_addr();
        debug!(%addr, "opening SQL Server connection");
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(self.config.clone(), tcp.compat_write()).await?;
        Ok(TdsConnection {
            client,
            in_flight: false,
        })
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.in_flight
    }
}

/// Awaits `work` with `in_flight` raised, lowering it only on completion.
///
/// If the future is dropped first the flag stays raised.
async fn tracked<T>(in_flight: &mut bool, work: impl Future<Output = T>) -> T {
    *in_flight = true;
    let output = work.await;
    *in_flight = false;
    output
}

/// SQL Server executor backed by a lazily filled connection pool.
///
/// Connections are discarded after a failed or abandoned statement.
pub struct MssqlExecutor {
    pool: Pool<TdsConnectionManager>,
}

impl MssqlExecutor {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_pool_size(config, DEFAULT_POOL_SIZE)
    }

    #[must_use]
    pub fn with_pool_size(config: Config, max_size: u32) -> Self {
        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .connection_timeout(DEFAULT_CHECKOUT_TIMEOUT)
            .build_unchecked(TdsConnectionManager::new(config));
        Self { pool }
    }

    /// Parses an ADO.NET style connection string.
    ///
    /// # Errors
    /// Returns `StoreError` if the connection string is malformed.
    pub fn from_ado_string(connection_string: &str, max_size: u32) -> StoreResult<Self> {
        let config = Config::from_ado_string(connection_string)?;
        Ok(Self::with_pool_size(config, max_size))
    }
}

impl QueryExecutor for MssqlExecutor {
    async fn execute(&self, sql: &str, params: &[QueryParam]) -> StoreResult<Vec<Row>> {
        let mut conn = self.pool.get().await.map_err(|err| match err {
            RunError::User(err) => err,
            RunError::TimedOut => {
                StoreError::Connection("timed out waiting for a pooled connection".to_string())
            }
        })?;

        let mut query = Query::new(sql);
        for param in params {
            match param {
                QueryParam::Int(value) => query.bind(*value),
                QueryParam::Text(value) => query.bind(value.clone()),
                QueryParam::Date(value) => query.bind(*value),
            }
        }

        let TdsConnection { client, in_flight } = &mut *conn;
        match tracked(in_flight, run_query(client, query)).await {
            Ok(rows) => Ok(rows.iter().map(row_to_json).collect()),
            Err(err) => {
                warn!(error = %err, "query failed; discarding SQL Server connection");
                conn.in_flight = true;
                Err(err.into())
            }
        }
    }
}

async fn run_query(client: &mut TdsClient, query: Query<'_>) -> tiberius::Result<Vec<tiberius::Row>> {
    query.query(client).await?.into_first_result().await
}

fn row_to_json(row: &tiberius::Row) -> Row {
    row.cells()
        .map(|(column, data)| (column.name().to_string(), column_to_json(data)))
        .collect()
}

fn column_to_json(data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I16(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I32(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I64(value) => value.map_or(Value::Null, Value::from),
        ColumnData::F32(value) => value.map_or(Value::Null, |v| Value::from(f64::from(v))),
        ColumnData::F64(value) => value.map_or(Value::Null, Value::from),
        ColumnData::Bit(value) => value.map_or(Value::Null, Value::from),
        ColumnData::String(value) => value
            .as_ref()
            .map_or(Value::Null, |text| Value::String(text.to_string())),
        ColumnData::Guid(value) => value.map_or(Value::Null, |guid| Value::String(guid.to_string())),
        ColumnData::Binary(value) => value
            .as_ref()
            .map_or(Value::Null, |bytes| Value::String(STANDARD.encode(bytes))),
        ColumnData::Numeric(value) => value.map_or(Value::Null, |number| Value::String(number.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data, |value| value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(data, |value| value.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => temporal::<NaiveTime>(data, |value| value.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(data, |value| value.to_rfc3339()),
        _ => Value::Null,
    }
}

fn temporal<T>(data: &ColumnData<'static>, render: impl Fn(T) -> String) -> Value
where
    T: for<'a> FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(value)) => Value::String(render(value)),
        Ok(None) | Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn scalar_columns_map_to_json() {
        assert_eq!(column_to_json(&ColumnData::I32(Some(42))), Value::from(42));
        assert_eq!(column_to_json(&ColumnData::I64(None)), Value::Null);
        assert_eq!(column_to_json(&ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            column_to_json(&ColumnData::String(Some(Cow::Borrowed("Active")))),
            Value::String("Active".to_string())
        );
        assert_eq!(
            column_to_json(&ColumnData::Binary(Some(Cow::Borrowed(&[1_u8, 2, 3][..])))),
            Value::String("AQID".to_string())
        );
    }

    #[tokio::test]
    async fn completed_statement_keeps_connection() {
        let mut in_flight = false;
        let value = tracked(&mut in_flight, async { 7 }).await;
        assert_eq!(value, 7);
        assert!(!in_flight);
    }

    #[tokio::test]
    async fn abandoned_statement_marks_connection_broken() {
        let mut in_flight = false;
        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            tracked(&mut in_flight, std::future::pending::<()>()),
        )
        .await;
        assert!(outcome.is_err());
        assert!(in_flight);
    }
}
