//! SQLite layout. Every ledger table keeps the full record as JSON in
//! `body`; a few columns are lifted out for filtering.

pub const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    body        TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_session ON sessions(session_id);

CREATE TABLE IF NOT EXISTS trades (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    body         TEXT NOT NULL,
    recorded_at  INTEGER NOT NULL,
    result       TEXT,
    return_pct   REAL,
    exit_price   TEXT,
    evaluated_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_trades_pending ON trades(result, recorded_at);

CREATE TABLE IF NOT EXISTS analyses (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    body        TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_metrics (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    body        TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);
";

/// Tables `insert` accepts.
pub const LEDGER_TABLES: [&str; 4] = ["sessions", "trades", "analyses", "llm_metrics"];

pub fn is_ledger_table(table: &str) -> bool {
    LEDGER_TABLES.contains(&table)
}
