use chrono::{NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::recap::{MarkRow, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedWrite {
    pub student_id: String,
    pub code: &'static str,
    pub message: String,
}

/// Which students a bulk write reached and which it did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub written: Vec<String>,
    pub failed: Vec<FailedWrite>,
    pub removed: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("bulk write incomplete: {} written, {} failed", .0.written.len(), .0.failed.len())]
    PartialFailure(BulkOutcome),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "bad_params",
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::PartialFailure(_) => "partial_failure",
            StoreError::Sqlite(_) => "db_query_failed",
        }
    }
}

/// Constraint violations on insert surface as conflicts; everything else stays
/// a plain SQLite failure.
pub fn classify_insert(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(ffi, _) if ffi.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(e.to_string())
        }
        _ => StoreError::Sqlite(e),
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Status::parse(raw).ok_or_else(|| FromSqlError::Other(format!("unknown status {raw:?}").into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub class_id: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub grade_level: String,
    pub section: String,
    pub display_name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub nis: Option<String>,
    pub photo_url: Option<String>,
}

pub fn get_teacher(conn: &Connection, teacher_id: &str) -> Result<Option<Teacher>, StoreError> {
    conn.query_row(
        "SELECT t.id, t.full_name, t.email, t.class_id, c.display_name
         FROM teachers t
         LEFT JOIN classes c ON c.id = t.class_id
         WHERE t.id = ?",
        [teacher_id],
        |r| {
            Ok(Teacher {
                id: r.get(0)?,
                full_name: r.get(1)?,
                email: r.get(2)?,
                class_id: r.get(3)?,
                class_name: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

pub fn require_teacher(conn: &Connection, teacher_id: &str) -> Result<Teacher, StoreError> {
    get_teacher(conn, teacher_id)?
        .ok_or_else(|| StoreError::NotFound(format!("teacher {teacher_id} not found")))
}

pub fn insert_teacher(
    conn: &Connection,
    teacher_id: &str,
    full_name: &str,
    email: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO teachers(id, full_name, email, class_id) VALUES(?, ?, ?, NULL)",
        (teacher_id, full_name, email),
    )
    .map_err(classify_insert)?;
    Ok(())
}

pub fn find_class_id(conn: &Connection, display_name: &str) -> Result<Option<String>, StoreError> {
    conn.query_row(
        "SELECT id FROM classes WHERE display_name = ?",
        [display_name],
        |r| r.get(0),
    )
    .optional()
    .map_err(StoreError::from)
}

pub fn insert_class(
    conn: &Connection,
    grade_level: &str,
    section: &str,
    display_name: &str,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, grade_level, section, display_name) VALUES(?, ?, ?, ?)",
        (&id, grade_level, section, display_name),
    )
    .map_err(classify_insert)?;
    Ok(id)
}

pub fn link_teacher_class(conn: &Connection, teacher_id: &str, class_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE teachers SET class_id = ? WHERE id = ?",
        (class_id, teacher_id),
    )?;
    Ok(())
}

pub fn list_classes(conn: &Connection) -> Result<Vec<ClassRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.grade_level,
           c.section,
           c.display_name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         ORDER BY c.display_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                grade_level: r.get(1)?,
                section: r.get(2)?,
                display_name: r.get(3)?,
                student_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        class_id: r.get(1)?,
        name: r.get(2)?,
        nis: r.get(3)?,
        photo_url: r.get(4)?,
    })
}

/// Class roster ordered by name.
pub fn roster(conn: &Connection, class_id: &str) -> Result<Vec<Student>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, name, nis, photo_url
         FROM students
         WHERE class_id = ?
         ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A teacher with no linked class has an empty roster.
pub fn roster_for_teacher(conn: &Connection, teacher: &Teacher) -> Result<Vec<Student>, StoreError> {
    match teacher.class_id.as_deref() {
        Some(class_id) => roster(conn, class_id),
        None => Ok(Vec::new()),
    }
}

pub fn get_student(conn: &Connection, class_id: &str, student_id: &str) -> Result<Option<Student>, StoreError> {
    conn.query_row(
        "SELECT id, class_id, name, nis, photo_url
         FROM students
         WHERE class_id = ? AND id = ?",
        (class_id, student_id),
        student_from_row,
    )
    .optional()
    .map_err(StoreError::from)
}

pub fn insert_student(
    conn: &Connection,
    class_id: &str,
    name: &str,
    nis: Option<&str>,
    photo_url: &str,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, nis, photo_url, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, class_id, name, nis, photo_url, Utc::now().to_rfc3339()),
    )
    .map_err(classify_insert)?;
    Ok(id)
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    name: &str,
    nis: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE students SET name = ?, nis = ? WHERE id = ?",
        (name, nis, student_id),
    )?;
    Ok(())
}

pub fn delete_student_row(conn: &Connection, student_id: &str) -> Result<usize, StoreError> {
    Ok(conn.execute("DELETE FROM students WHERE id = ?", [student_id])?)
}

pub fn delete_marks_for_student(conn: &Connection, student_id: &str) -> Result<usize, StoreError> {
    Ok(conn.execute("DELETE FROM attendance WHERE student_id = ?", [student_id])?)
}

pub fn delete_mark(conn: &Connection, student_id: &str, date: NaiveDate) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM attendance WHERE student_id = ? AND date = ?",
        (student_id, date),
    )?)
}

fn mark_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<MarkRow> {
    Ok(MarkRow {
        student_id: r.get(0)?,
        date: r.get(1)?,
        status: r.get(2)?,
    })
}

pub fn marks_for_date(conn: &Connection, teacher_id: &str, date: NaiveDate) -> Result<Vec<MarkRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT student_id, date, status
         FROM attendance
         WHERE teacher_id = ? AND date = ?",
    )?;
    let rows = stmt
        .query_map((teacher_id, date), mark_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks for the teacher with `from <= date <= to`.
pub fn marks_in_range(
    conn: &Connection,
    teacher_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MarkRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT student_id, date, status
         FROM attendance
         WHERE teacher_id = ? AND date >= ? AND date <= ?
         ORDER BY date, student_id",
    )?;
    let rows = stmt
        .query_map((teacher_id, from, to), mark_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The single write path for marks: one statement keyed on (student, date).
/// A replaced mark gets a fresh id and the acting teacher.
pub fn upsert_mark(
    conn: &Connection,
    student_id: &str,
    teacher_id: &str,
    date: NaiveDate,
    status: Status,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, student_id, teacher_id, date, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           id = excluded.id,
           teacher_id = excluded.teacher_id,
           status = excluded.status,
           created_at = excluded.created_at",
        (&id, student_id, teacher_id, date, status, Utc::now().to_rfc3339()),
    )
    .map_err(classify_insert)?;
    Ok(id)
}
