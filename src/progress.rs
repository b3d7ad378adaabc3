//! Attempt ledger and module progress
//!
//! Attempts are only ever appended. Correctness is decided when the attempt
//! is written and every later computation reads the stored flag.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::{available_modules_for_student, get_user};
use crate::error::{CoreError, CoreResult};
use crate::questions::{get_exercise, list_exercises_for_module, Exercise};

/// One answer given by a student
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub exercise_id: i64,
    pub selected_answer: String,
    pub is_correct: bool,
    pub attempted_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
}

#[cfg(feature = "python")]
#[pymethods]
impl Attempt {
    fn __repr__(&self) -> String {
        format!(
            "Attempt(exercise={}, selected='{}', correct={})",
            self.exercise_id, self.selected_answer, self.is_correct
        )
    }
}

/// Progress of one student through one module
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub student_id: i64,
    pub module_id: i64,
    pub completed_exercise_count: usize,
    pub total_exercise_count: usize,
    pub percent_complete: f64,
    pub is_complete: bool,
}

#[cfg(feature = "python")]
#[pymethods]
impl ModuleProgress {
    fn __repr__(&self) -> String {
        format!(
            "ModuleProgress(module={}, {}/{}, {:.1}%)",
            self.module_id, self.completed_exercise_count, self.total_exercise_count, self.percent_complete
        )
    }
}

impl ModuleProgress {
    /// Progress of `exercises` against the set of exercise ids the student
    /// has answered correctly at least once
    pub fn evaluate(student_id: i64, module_id: i64, exercises: &[Exercise], solved: &HashSet<i64>) -> Self {
        let total = exercises.len();
        let completed = exercises.iter().filter(|e| solved.contains(&e.id)).count();
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        Self {
            student_id,
            module_id,
            completed_exercise_count: completed,
            total_exercise_count: total,
            percent_complete: percent,
            is_complete: total > 0 && completed == total,
        }
    }
}

// ============= Ledger writes =============

/// Record an answer stamped with the current time
pub fn append_attempt(
    conn: &Connection,
    student_id: i64,
    exercise_id: i64,
    selected_answer: &str,
    time_spent_seconds: i64,
) -> CoreResult<Attempt> {
    append_attempt_at(conn, student_id, exercise_id, selected_answer, time_spent_seconds, Utc::now())
}

/// Record an answer with a caller-assigned timestamp
pub fn append_attempt_at(
    conn: &Connection,
    student_id: i64,
    exercise_id: i64,
    selected_answer: &str,
    time_spent_seconds: i64,
    attempted_at: DateTime<Utc>,
) -> CoreResult<Attempt> {
    if get_user(conn, student_id)?.is_none() {
        return Err(CoreError::not_found(format!("user {}", student_id)));
    }
    let exercise = get_exercise(conn, exercise_id)?
        .ok_or_else(|| CoreError::not_found(format!("exercise {}", exercise_id)))?;
    let is_correct = exercise.is_correct_answer(selected_answer);

    conn.execute(
        "INSERT INTO attempts (student_id, exercise_id, selected_answer, is_correct, attempted_at, time_spent_seconds)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![student_id, exercise_id, selected_answer, is_correct, attempted_at, time_spent_seconds],
    )?;

    debug!(
        "Student {} answered exercise {} ({})",
        student_id,
        exercise_id,
        if is_correct { "correct" } else { "wrong" }
    );

    Ok(Attempt {
        id: conn.last_insert_rowid(),
        student_id,
        exercise_id,
        selected_answer: selected_answer.to_string(),
        is_correct,
        attempted_at,
        time_spent_seconds,
    })
}

// ============= Ledger reads =============

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<Attempt> {
    Ok(Attempt {
        id: row.get(0)?,
        student_id: row.get(1)?,
        exercise_id: row.get(2)?,
        selected_answer: row.get(3)?,
        is_correct: row.get(4)?,
        attempted_at: row.get(5)?,
        time_spent_seconds: row.get(6)?,
    })
}

pub fn list_attempts_by_student(conn: &Connection, student_id: i64) -> CoreResult<Vec<Attempt>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, exercise_id, selected_answer, is_correct, attempted_at, time_spent_seconds
         FROM attempts WHERE student_id = ?1 ORDER BY attempted_at, id",
    )?;
    let attempts = stmt
        .query_map(params![student_id], attempt_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(attempts)
}

pub fn exists_correct_attempt(conn: &Connection, student_id: i64, exercise_id: i64) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM attempts WHERE student_id = ?1 AND exercise_id = ?2 AND is_correct = 1 LIMIT 1",
            params![student_id, exercise_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn count_attempts(conn: &Connection, student_id: i64) -> CoreResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attempts WHERE student_id = ?1",
        params![student_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn count_correct_attempts(conn: &Connection, student_id: i64) -> CoreResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attempts WHERE student_id = ?1 AND is_correct = 1",
        params![student_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Ids of every exercise the student has answered correctly at least once
pub fn solved_exercise_ids(conn: &Connection, student_id: i64) -> CoreResult<HashSet<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT exercise_id FROM attempts WHERE student_id = ?1 AND is_correct = 1",
    )?;
    let ids = stmt
        .query_map(params![student_id], |row| row.get(0))?
        .collect::<Result<HashSet<i64>, _>>()?;
    Ok(ids)
}

// ============= Progress =============

/// True when every exercise of the module has a correct attempt by the
/// student. A module without exercises is never complete.
pub fn is_module_complete(conn: &Connection, student_id: i64, module_id: i64) -> CoreResult<bool> {
    let exercises = list_exercises_for_module(conn, module_id)?;
    if exercises.is_empty() {
        return Ok(false);
    }

    for exercise in &exercises {
        if !exists_correct_attempt(conn, student_id, exercise.id)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Percentage of the module's exercises answered correctly at least once
pub fn module_progress(conn: &Connection, student_id: i64, module_id: i64) -> CoreResult<f64> {
    Ok(module_progress_report(conn, student_id, module_id)?.percent_complete)
}

pub fn module_progress_report(conn: &Connection, student_id: i64, module_id: i64) -> CoreResult<ModuleProgress> {
    let exercises = list_exercises_for_module(conn, module_id)?;
    let solved = solved_exercise_ids(conn, student_id)?;
    Ok(ModuleProgress::evaluate(student_id, module_id, &exercises, &solved))
}

/// How many of `module_ids` the student has completed. The ledger is read
/// once for all modules.
pub fn count_completed_modules(conn: &Connection, student_id: i64, module_ids: &[i64]) -> CoreResult<usize> {
    let solved = solved_exercise_ids(conn, student_id)?;
    let mut completed = 0;
    for &module_id in module_ids {
        let exercises = list_exercises_for_module(conn, module_id)?;
        if ModuleProgress::evaluate(student_id, module_id, &exercises, &solved).is_complete {
            completed += 1;
        }
    }
    Ok(completed)
}

/// Completed modules among those available to the student through their group
pub fn completed_module_count(conn: &Connection, student_id: i64) -> CoreResult<usize> {
    let modules = available_modules_for_student(conn, student_id)?;
    count_completed_modules(conn, student_id, &modules)
}

/// Progress through every module available to the student
pub fn progress_overview(conn: &Connection, student_id: i64) -> CoreResult<Vec<ModuleProgress>> {
    let solved = solved_exercise_ids(conn, student_id)?;
    available_modules_for_student(conn, student_id)?
        .into_iter()
        .map(|module_id| -> CoreResult<ModuleProgress> {
            let exercises = list_exercises_for_module(conn, module_id)?;
            Ok(ModuleProgress::evaluate(student_id, module_id, &exercises, &solved))
        })
        .collect()
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(
    name = "submit_attempt",
    signature = (db_path, student_id, exercise_id, selected_answer, time_spent_seconds=0)
)]
pub fn py_submit_attempt(
    db_path: &str,
    student_id: i64,
    exercise_id: i64,
    selected_answer: &str,
    time_spent_seconds: i64,
) -> PyResult<Attempt> {
    let conn = crate::db::open_database(db_path)?;
    Ok(append_attempt(&conn, student_id, exercise_id, selected_answer, time_spent_seconds)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "is_module_complete")]
pub fn py_is_module_complete(db_path: &str, student_id: i64, module_id: i64) -> PyResult<bool> {
    let conn = crate::db::open_database(db_path)?;
    Ok(is_module_complete(&conn, student_id, module_id)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "module_progress")]
pub fn py_module_progress(db_path: &str, student_id: i64, module_id: i64) -> PyResult<f64> {
    let conn = crate::db::open_database(db_path)?;
    Ok(module_progress(&conn, student_id, module_id)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "completed_module_count")]
pub fn py_completed_module_count(db_path: &str, student_id: i64) -> PyResult<usize> {
    let conn = crate::db::open_database(db_path)?;
    Ok(completed_module_count(&conn, student_id)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "progress_overview")]
pub fn py_progress_overview(db_path: &str, student_id: i64) -> PyResult<Vec<ModuleProgress>> {
    let conn = crate::db::open_database(db_path)?;
    Ok(progress_overview(&conn, student_id)?)
}
