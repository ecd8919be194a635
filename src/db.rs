use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rollbook.sqlite3");
    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;
    info!(path = %db_path.display(), "workspace database opened");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            grade_level TEXT NOT NULL,
            section TEXT NOT NULL,
            display_name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT,
            class_id TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            nis TEXT,
            created_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // Early workspaces stored no avatar reference.
    ensure_students_photo_url(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_name ON students(class_id, name)",
        [],
    )?;

    // No inline UNIQUE here: older workspaces created this table without one and
    // get the constraint through ensure_attendance_unique below.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'excused_leave', 'sick', 'unexcused')),
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    ensure_attendance_unique(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_teacher_date ON attendance(teacher_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    Ok(())
}

fn ensure_students_photo_url(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "photo_url")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN photo_url TEXT", [])?;
    Ok(())
}

fn ensure_attendance_unique(conn: &Connection) -> anyhow::Result<()> {
    if index_exists(conn, "idx_attendance_student_date")? {
        return Ok(());
    }

    // Delete-then-insert writers could leave several rows per (student, date).
    // Keep the most recently inserted one.
    let removed = conn.execute(
        "DELETE FROM attendance
         WHERE rowid NOT IN (
           SELECT MAX(rowid) FROM attendance GROUP BY student_id, date
         )",
        [],
    )?;
    if removed > 0 {
        info!(removed, "dropped duplicate attendance marks before adding unique index");
    }
    conn.execute(
        "CREATE UNIQUE INDEX idx_attendance_student_date ON attendance(student_id, date)",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn index_exists(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?",
            [name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
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
