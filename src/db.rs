use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "kindergarten.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    // Several daemons may share one workspace; wait for the writer instead of failing.
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS slots(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before slot timestamps existed lack updated_at.
    ensure_slots_updated_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS store_meta(
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;
    // Seed the write sequence above anything already stored.
    conn.execute(
        "INSERT OR IGNORE INTO store_meta(name, value)
         SELECT 'seq', COALESCE(MAX(version), 0) FROM slots",
        [],
    )?;

    // Removals take a version from the same sequence so other processes can
    // tell one removal from the next.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS slot_tombstones(
            key TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            removed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS slot_quarantine(
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            reason TEXT NOT NULL,
            quarantined_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_slot_quarantine_key ON slot_quarantine(key)",
        [],
    )?;

    Ok(conn)
}

fn ensure_slots_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "slots", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE slots ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
