use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::recap::Status;
use crate::store::{self, BulkOutcome, FailedWrite, StoreError, Student, Teacher};

fn require_roster_student(
    conn: &Connection,
    teacher: &Teacher,
    student_id: &str,
) -> Result<Student, StoreError> {
    let Some(class_id) = teacher.class_id.as_deref() else {
        return Err(StoreError::NotFound(format!(
            "teacher {} has no class",
            teacher.id
        )));
    };
    store::get_student(conn, class_id, student_id)?
        .ok_or_else(|| StoreError::NotFound(format!("student {student_id} not in class")))
}

/// Replaces whatever mark the student has for `date` with `status`.
pub fn set_mark(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
    date: NaiveDate,
    status: Status,
) -> Result<String, StoreError> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    require_roster_student(conn, &teacher, student_id)?;
    let mark_id = store::upsert_mark(conn, student_id, teacher_id, date, status)?;
    info!(teacher_id, student_id, %date, %status, "mark set");
    Ok(mark_id)
}

/// Removes the student's mark for `date`, returning to "unmarked".
pub fn clear_mark(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
    date: NaiveDate,
) -> Result<bool, StoreError> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    require_roster_student(conn, &teacher, student_id)?;
    let removed = store::delete_mark(conn, student_id, date)?;
    info!(teacher_id, student_id, %date, removed, "mark cleared");
    Ok(removed > 0)
}

/// Marks every listed student Present for `date`. `student_ids = None` means
/// the whole roster, and only then are the teacher's other marks for that
/// date dropped; an explicit list touches nobody outside it, so the failed
/// subset of an earlier call can be resent on its own.
///
/// Runs in one transaction. A student whose write fails keeps its prior mark
/// and is reported in the outcome; successful writes are still committed, and
/// the call then returns `StoreError::PartialFailure` carrying the outcome.
/// When nothing was written the transaction is rolled back untouched.
pub fn mark_all_present(
    conn: &Connection,
    teacher_id: &str,
    date: NaiveDate,
    student_ids: Option<Vec<String>>,
) -> Result<BulkOutcome, StoreError> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    let roster = store::roster_for_teacher(conn, &teacher)?;
    let roster_ids: HashSet<&str> = roster.iter().map(|s| s.id.as_str()).collect();
    let whole_roster = student_ids.is_none();

    let mut seen = HashSet::new();
    let targets: Vec<String> = student_ids
        .unwrap_or_else(|| roster.iter().map(|s| s.id.clone()).collect())
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if targets.is_empty() {
        return Err(StoreError::Validation("roster is empty".to_string()));
    }

    let mut tx = conn.unchecked_transaction()?;
    let mut outcome = BulkOutcome::default();

    for student_id in targets {
        if !roster_ids.contains(student_id.as_str()) {
            outcome.failed.push(FailedWrite {
                student_id,
                code: "not_found",
                message: "student not in class".to_string(),
            });
            continue;
        }
        // Dropping the savepoint without commit rolls back just this student.
        let sp = tx.savepoint()?;
        match store::upsert_mark(&sp, &student_id, teacher_id, date, Status::Present) {
            Ok(_) => {
                sp.commit()?;
                outcome.written.push(student_id);
            }
            Err(e) => {
                outcome.failed.push(FailedWrite {
                    student_id,
                    code: e.code(),
                    message: e.to_string(),
                });
            }
        }
    }

    if outcome.written.is_empty() {
        drop(tx);
        warn!(
            teacher_id,
            %date,
            failed = outcome.failed.len(),
            "mark all present wrote nothing, rolled back"
        );
        return Err(StoreError::PartialFailure(outcome));
    }

    if whole_roster {
        let keep: HashSet<&str> = outcome
            .written
            .iter()
            .chain(outcome.failed.iter().map(|f| &f.student_id))
            .map(String::as_str)
            .collect();
        for stale in store::marks_for_date(&tx, teacher_id, date)? {
            if !keep.contains(stale.student_id.as_str()) {
                outcome.removed += store::delete_mark(&tx, &stale.student_id, date)?;
            }
        }
    }

    tx.commit()?;

    if outcome.failed.is_empty() {
        info!(
            teacher_id,
            %date,
            written = outcome.written.len(),
            removed = outcome.removed,
            "marked all present"
        );
        Ok(outcome)
    } else {
        warn!(
            teacher_id,
            %date,
            written = outcome.written.len(),
            failed = outcome.failed.len(),
            "mark all present incomplete"
        );
        Err(StoreError::PartialFailure(outcome))
    }
}

/// Deletes the student's marks and then the student, atomically.
pub fn delete_student(conn: &Connection, teacher_id: &str, student_id: &str) -> Result<usize, StoreError> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    require_roster_student(conn, &teacher, student_id)?;

    let tx = conn.unchecked_transaction()?;
    let marks_removed = store::delete_marks_for_student(&tx, student_id)?;
    store::delete_student_row(&tx, student_id)?;
    tx.commit()?;

    info!(teacher_id, student_id, marks_removed, "student deleted");
    Ok(marks_removed)
}
