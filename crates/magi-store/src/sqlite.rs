use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magi_agents::{CollaboratorError, Persistence, PersistenceError, StatsSource};
use magi_models::{DirectionStats, Side, SymbolStats, TradeOutcome, TradeRecord};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::schema::{is_ledger_table, SCHEMA_DDL};

/// A stored trade that has not been evaluated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTrade {
    pub row_id: i64,
    pub trade: TradeRecord,
}

/// A scored trade with the exit price it was scored against.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedTrade {
    pub row_id: i64,
    pub trade: TradeRecord,
    pub exit_price: Decimal,
}

/// File-backed ledger and statistics source.
///
/// WAL journal so `magi evaluate` can run while a session is writing.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))
    }

    /// Append rows to a ledger table inside one transaction.
    pub fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<usize, StoreError> {
        if !is_ledger_table(table) {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            // Table name comes from the fixed whitelist above.
            let sql = format!(
                "INSERT INTO {table} (session_id, body, recorded_at) VALUES (?1, ?2, ?3)"
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            for row in rows {
                stmt.execute(params![
                    session_key(table, row),
                    serde_json::to_string(row)?,
                    row_timestamp(row),
                ])?;
            }
        }
        tx.commit()?;
        debug!(table, rows = rows.len(), "Rows inserted");
        Ok(rows.len())
    }

    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        if !is_ledger_table(table) {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let conn = self.lock()?;
        let count: usize =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Wins and losses of evaluated trades for one provider and side.
    pub fn direction_counts(&self, provider_id: &str, side: Side) -> Result<DirectionStats, StoreError> {
        let conn = self.lock()?;
        let (wins, losses): (u32, u32) = conn.query_row(
            "SELECT \
                 COALESCE(SUM(CASE WHEN result = 'WIN' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN result = 'LOSE' THEN 1 ELSE 0 END), 0) \
             FROM trades \
             WHERE json_extract(body, '$.provider_id') = ?1 \
               AND json_extract(body, '$.side') = ?2",
            params![provider_id, side.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DirectionStats {
            provider_id: provider_id.to_string(),
            side,
            wins,
            losses,
        })
    }

    /// Evaluated outcome counts per symbol, alphabetical.
    pub fn symbol_counts(&self, provider_id: &str) -> Result<Vec<SymbolStats>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT json_extract(body, '$.symbol') AS symbol, \
                 SUM(CASE WHEN result = 'WIN' THEN 1 ELSE 0 END), \
                 SUM(CASE WHEN result = 'LOSE' THEN 1 ELSE 0 END), \
                 SUM(CASE WHEN result = 'HOLD' THEN 1 ELSE 0 END) \
             FROM trades \
             WHERE json_extract(body, '$.provider_id') = ?1 AND result IS NOT NULL \
             GROUP BY symbol ORDER BY symbol",
        )?;
        let rows = stmt
            .query_map(params![provider_id], |row| {
                Ok(SymbolStats {
                    symbol: row.get(0)?,
                    wins: row.get(1)?,
                    losses: row.get(2)?,
                    holds: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Unevaluated trades recorded at or before `cutoff`, oldest first.
    ///
    /// Rows whose body no longer parses are skipped with a warning.
    pub fn pending_evaluations(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingTrade>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, body FROM trades \
             WHERE result IS NULL AND recorded_at <= ?1 \
             ORDER BY recorded_at, id",
        )?;
        let raw = stmt
            .query_map(params![cutoff.timestamp()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parse_trades(raw)
            .map(|(row_id, trade)| PendingTrade { row_id, trade })
            .collect())
    }

    /// Filled trades with no ATR recorded, newest first.
    pub fn trades_missing_atr(&self, limit: usize) -> Result<Vec<PendingTrade>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, body FROM trades \
             WHERE json_extract(body, '$.atr_at_execution') IS NULL \
               AND json_extract(body, '$.filled_price') IS NOT NULL \
             ORDER BY recorded_at DESC, id DESC \
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raw = stmt
            .query_map(params![limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parse_trades(raw)
            .map(|(row_id, trade)| PendingTrade { row_id, trade })
            .collect())
    }

    /// Write `atr` into the stored trade body.
    pub fn set_trade_atr(&self, row_id: i64, atr: f64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE trades SET body = json_set(body, '$.atr_at_execution', ?1) WHERE id = ?2",
            params![atr, row_id],
        )?;
        Ok(())
    }

    /// Every trade that already has an exit price, oldest first, whatever
    /// its current result.
    pub fn evaluated_trades(&self) -> Result<Vec<EvaluatedTrade>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, body, exit_price FROM trades \
             WHERE exit_price IS NOT NULL \
             ORDER BY recorded_at, id",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut evaluated = Vec::with_capacity(raw.len());
        for (row_id, body, exit) in raw {
            let exit_price = match exit.parse::<Decimal>() {
                Ok(exit_price) => exit_price,
                Err(e) => {
                    warn!(row_id, error = %e, "Skipping trade with unreadable exit price");
                    continue;
                }
            };
            evaluated.extend(
                parse_trades(vec![(row_id, body)]).map(|(row_id, trade)| EvaluatedTrade {
                    row_id,
                    trade,
                    exit_price,
                }),
            );
        }
        Ok(evaluated)
    }

    pub fn record_outcome(
        &self,
        row_id: i64,
        outcome: TradeOutcome,
        return_pct: Option<f64>,
        exit_price: Decimal,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE trades SET result = ?1, return_pct = ?2, exit_price = ?3, evaluated_at = ?4 \
             WHERE id = ?5",
            params![
                outcome.as_str(),
                return_pct,
                exit_price.to_string(),
                Utc::now().timestamp(),
                row_id
            ],
        )?;
        Ok(())
    }
}

/// Decode trade bodies, skipping rows that no longer parse.
fn parse_trades(raw: Vec<(i64, String)>) -> impl Iterator<Item = (i64, TradeRecord)> {
    raw.into_iter().filter_map(|(row_id, body)| {
        match serde_json::from_str::<TradeRecord>(&body) {
            Ok(trade) => Some((row_id, trade)),
            Err(e) => {
                warn!(row_id, error = %e, "Skipping unreadable trade row");
                None
            }
        }
    })
}

/// Sessions are keyed by their own `id`; every other record by `session_id`.
fn session_key(table: &str, row: &Value) -> String {
    let field = if table == "sessions" { "id" } else { "session_id" };
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Unix seconds of the row's own timestamp, or now.
fn row_timestamp(row: &Value) -> i64 {
    ["recorded_at", "ended_at", "started_at"]
        .iter()
        .filter_map(|field| row.get(*field).and_then(Value::as_str))
        .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp())
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), PersistenceError> {
        self.insert_rows(table, rows)
            .map(|_| ())
            .map_err(|e| PersistenceError::new(table, e.to_string()))
    }
}

#[async_trait]
impl StatsSource for SqliteStore {
    async fn direction_stats(
        &self,
        provider_id: &str,
        side: Side,
    ) -> Result<DirectionStats, CollaboratorError> {
        self.direction_counts(provider_id, side)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }

    async fn symbol_stats(&self, provider_id: &str) -> Result<Vec<SymbolStats>, CollaboratorError> {
        self.symbol_counts(provider_id)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use magi_models::TradeMode;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trade(provider: &str, symbol: &str, side: Side, age_hours: i64) -> TradeRecord {
        TradeRecord {
            session_id: Uuid::new_v4(),
            order_id: format!("o-{symbol}-{age_hours}"),
            symbol: symbol.to_string(),
            side,
            qty: dec!(1),
            filled_price: Some(dec!(100)),
            reason: String::new(),
            provider_id: provider.to_string(),
            mode: TradeMode::Paper,
            atr_at_execution: Some(2.0),
            recorded_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn insert_trade(store: &SqliteStore, record: &TradeRecord) {
        store
            .insert_rows("trades", &[serde_json::to_value(record).unwrap()])
            .unwrap();
    }

    #[test]
    fn rejects_unknown_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.insert_rows("users; DROP TABLE trades", &[]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[test]
    fn inserts_are_appended() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = serde_json::json!({"session_id": "s1", "turn": 1});
        assert_eq!(store.insert_rows("llm_metrics", &[row.clone(), row]).unwrap(), 2);
        assert_eq!(store.count("llm_metrics").unwrap(), 2);
    }

    #[test]
    fn direction_counts_only_evaluated_trades() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (i, outcome) in [TradeOutcome::Win, TradeOutcome::Lose, TradeOutcome::Lose]
            .into_iter()
            .enumerate()
        {
            insert_trade(&store, &trade("groq", "AAPL", Side::Buy, 48 + i as i64));
            let pending = store.pending_evaluations(Utc::now()).unwrap();
            let newest = pending.iter().map(|p| p.row_id).max().unwrap();
            store.record_outcome(newest, outcome, Some(1.0), dec!(101)).unwrap();
        }
        insert_trade(&store, &trade("groq", "AAPL", Side::Buy, 1));
        insert_trade(&store, &trade("groq", "AAPL", Side::Sell, 48));
        insert_trade(&store, &trade("gemini", "AAPL", Side::Buy, 48));

        let stats = store.direction_counts("groq", Side::Buy).unwrap();
        assert_eq!((stats.wins, stats.losses), (1, 2));
        let none = store.direction_counts("xai", Side::Buy).unwrap();
        assert_eq!((none.wins, none.losses), (0, 0));
    }

    #[test]
    fn pending_respects_cutoff_and_outcomes() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert_trade(&store, &trade("groq", "MSFT", Side::Buy, 30));
        insert_trade(&store, &trade("groq", "TSLA", Side::Sell, 2));

        let cutoff = Utc::now() - Duration::hours(24);
        let pending = store.pending_evaluations(cutoff).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].trade.symbol, "MSFT");

        store
            .record_outcome(pending[0].row_id, TradeOutcome::Hold, Some(0.5), dec!(100.5))
            .unwrap();
        assert!(store.pending_evaluations(cutoff).unwrap().is_empty());

        let symbols = store.symbol_counts("groq").unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol, "MSFT");
        assert_eq!(symbols[0].holds, 1);
    }

    #[test]
    fn atr_backfill_touches_only_the_body() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut old = trade("groq", "AMD", Side::Buy, 72);
        old.atr_at_execution = None;
        let mut unfilled = trade("groq", "NVDA", Side::Buy, 48);
        unfilled.atr_at_execution = None;
        unfilled.filled_price = None;
        insert_trade(&store, &old);
        insert_trade(&store, &unfilled);
        insert_trade(&store, &trade("groq", "MSFT", Side::Buy, 24));

        let missing = store.trades_missing_atr(10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].trade.symbol, "AMD");

        store.set_trade_atr(missing[0].row_id, 3.25).unwrap();
        assert!(store.trades_missing_atr(10).unwrap().is_empty());

        let pending = store.pending_evaluations(Utc::now()).unwrap();
        let amd = pending.iter().find(|p| p.trade.symbol == "AMD").unwrap();
        assert_eq!(amd.trade.atr_at_execution, Some(3.25));
        assert_eq!(amd.trade.recorded_at, old.recorded_at);
    }

    #[test]
    fn evaluated_trades_ignore_pending_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert_trade(&store, &trade("groq", "AAPL", Side::Buy, 48));
        insert_trade(&store, &trade("groq", "TSLA", Side::Sell, 47));
        let pending = store.pending_evaluations(Utc::now()).unwrap();
        store
            .record_outcome(pending[0].row_id, TradeOutcome::Win, Some(5.0), dec!(105))
            .unwrap();

        let evaluated = store.evaluated_trades().unwrap();
        assert_eq!(evaluated.len(), 1);
        assert_eq!(evaluated[0].trade.symbol, "AAPL");
        assert_eq!(evaluated[0].exit_price, dec!(105));
    }
}
