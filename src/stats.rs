//! Statistics over the attempt ledger: per student, per group, per teacher

#[cfg(feature = "python")]
use pyo3::prelude::*;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config::CompletionRule;
use crate::error::CoreResult;
use crate::progress::count_completed_modules;

/// Share of correct attempts in percent, rounded half up to a whole number.
/// Zero when there are no attempts.
pub fn success_rate_percent(total_attempts: u64, correct_attempts: u64) -> f64 {
    if total_attempts == 0 {
        return 0.0;
    }
    ((200 * correct_attempts + total_attempts) / (2 * total_attempts)) as f64
}

/// Attempt statistics for a single student
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    pub student_id: i64,
    pub total_attempts: u64,
    pub correct_attempts: u64,
    pub success_rate_percent: f64,
    pub modules_attempted: u64,
    pub modules_completed: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[cfg(feature = "python")]
#[pymethods]
impl StudentStats {
    fn __repr__(&self) -> String {
        format!(
            "StudentStats(student={}, total={}, correct={}, rate={:.0}%)",
            self.student_id, self.total_attempts, self.correct_attempts, self.success_rate_percent
        )
    }
}

/// One row of a group or teacher report
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentReport {
    pub student_name: String,
    pub group_id: i64,
    pub group_name: String,
    #[serde(flatten)]
    pub stats: StudentStats,
}

/// Attempt totals for a whole group
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_id: i64,
    pub total_attempts: u64,
    pub correct_attempts: u64,
    pub success_rate_percent: f64,
}

/// Attempt joined with its exercise and module, for history listings
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptDetail {
    pub attempt_id: i64,
    pub module_title: String,
    pub question: String,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub attempted_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
}

/// Distinct modules in which the student answered at least one exercise
fn attempted_module_ids(conn: &Connection, student_id: i64) -> CoreResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT e.module_id FROM attempts a
         JOIN exercises e ON e.id = a.exercise_id
         WHERE a.student_id = ?1
         ORDER BY e.module_id",
    )?;
    let ids = stmt
        .query_map(params![student_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Fill in the module counters of `stats` according to `rule`
fn with_module_counts(conn: &Connection, mut stats: StudentStats, rule: CompletionRule) -> CoreResult<StudentStats> {
    let attempted = attempted_module_ids(conn, stats.student_id)?;
    stats.modules_attempted = attempted.len() as u64;
    stats.modules_completed = match rule {
        CompletionRule::Attempted => stats.modules_attempted,
        CompletionRule::Strict => count_completed_modules(conn, stats.student_id, &attempted)? as u64,
    };
    Ok(stats)
}

fn base_stats(student_id: i64, total: i64, correct: i64, last_activity: Option<DateTime<Utc>>) -> StudentStats {
    let total = total as u64;
    let correct = correct as u64;
    StudentStats {
        student_id,
        total_attempts: total,
        correct_attempts: correct,
        success_rate_percent: success_rate_percent(total, correct),
        modules_attempted: 0,
        modules_completed: 0,
        last_activity,
    }
}

/// Statistics for one student over their whole attempt history. A student
/// without attempts, or an unknown id, yields zeroes.
pub fn student_stats(conn: &Connection, student_id: i64, rule: CompletionRule) -> CoreResult<StudentStats> {
    let (total, correct, last_activity) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_correct), 0), MAX(attempted_at)
         FROM attempts WHERE student_id = ?1",
        params![student_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<DateTime<Utc>>>(2)?,
            ))
        },
    )?;

    with_module_counts(conn, base_stats(student_id, total, correct, last_activity), rule)
}

enum ReportScope {
    Group(i64),
    Teacher(i64),
}

/// Every student in scope, including those without any attempt
fn student_reports(conn: &Connection, scope: ReportScope, rule: CompletionRule) -> CoreResult<Vec<StudentReport>> {
    let (filter, scope_id) = match scope {
        ReportScope::Group(id) => ("g.id = ?1", id),
        ReportScope::Teacher(id) => ("g.teacher_id = ?1", id),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.username, g.id, g.name,
                COUNT(a.id), COALESCE(SUM(a.is_correct), 0), MAX(a.attempted_at)
         FROM users u
         JOIN groups g ON g.id = u.group_id
         LEFT JOIN attempts a ON a.student_id = u.id
         WHERE u.role = 'STUDENT' AND {}
         GROUP BY u.id, u.username, g.id, g.name
         ORDER BY g.id, u.username",
        filter
    ))?;

    let rows = stmt
        .query_map(params![scope_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<DateTime<Utc>>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let reports = rows
        .into_iter()
        .map(|row| -> CoreResult<StudentReport> {
            let (student_id, student_name, group_id, group_name, total, correct, last_activity) = row;
            let stats = with_module_counts(conn, base_stats(student_id, total, correct, last_activity), rule)?;
            Ok(StudentReport {
                student_name,
                group_id,
                group_name,
                stats,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    debug!("Assembled {} student report rows", reports.len());
    Ok(reports)
}

/// One row per student currently in the group
pub fn group_stats(conn: &Connection, group_id: i64, rule: CompletionRule) -> CoreResult<Vec<StudentReport>> {
    student_reports(conn, ReportScope::Group(group_id), rule)
}

/// Rows for one of the teacher's groups, or for every group they own
pub fn teacher_stats(
    conn: &Connection,
    teacher_id: i64,
    group_id: Option<i64>,
    rule: CompletionRule,
) -> CoreResult<Vec<StudentReport>> {
    match group_id {
        Some(group_id) => group_stats(conn, group_id, rule),
        None => student_reports(conn, ReportScope::Teacher(teacher_id), rule),
    }
}

/// Totals over the attempts of all students in the group
pub fn group_aggregate_stats(conn: &Connection, group_id: i64) -> CoreResult<GroupStats> {
    let (total, correct): (i64, i64) = conn.query_row(
        "SELECT COUNT(a.id), COALESCE(SUM(a.is_correct), 0)
         FROM attempts a
         JOIN users u ON u.id = a.student_id
         WHERE u.group_id = ?1 AND u.role = 'STUDENT'",
        params![group_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let total = total as u64;
    let correct = correct as u64;
    Ok(GroupStats {
        group_id,
        total_attempts: total,
        correct_attempts: correct,
        success_rate_percent: success_rate_percent(total, correct),
    })
}

/// Every attempt of the student, newest first
pub fn attempt_history(conn: &Connection, student_id: i64) -> CoreResult<Vec<AttemptDetail>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, m.title, e.question, a.selected_answer, e.correct_answer,
                a.is_correct, a.attempted_at, a.time_spent_seconds
         FROM attempts a
         JOIN exercises e ON e.id = a.exercise_id
         JOIN modules m ON m.id = e.module_id
         WHERE a.student_id = ?1
         ORDER BY a.attempted_at DESC, a.id DESC",
    )?;
    let details = stmt
        .query_map(params![student_id], |row| {
            Ok(AttemptDetail {
                attempt_id: row.get(0)?,
                module_title: row.get(1)?,
                question: row.get(2)?,
                selected_answer: row.get(3)?,
                correct_answer: row.get(4)?,
                is_correct: row.get(5)?,
                attempted_at: row.get(6)?,
                time_spent_seconds: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(details)
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
fn parse_rule(rule: Option<&str>) -> CoreResult<CompletionRule> {
    Ok(rule.map(str::parse).transpose()?.unwrap_or_default())
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "student_stats", signature = (db_path, student_id, completion_rule=None))]
pub fn py_student_stats(db_path: &str, student_id: i64, completion_rule: Option<&str>) -> PyResult<StudentStats> {
    let conn = crate::db::open_database(db_path)?;
    Ok(student_stats(&conn, student_id, parse_rule(completion_rule)?)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "group_stats", signature = (db_path, group_id, completion_rule=None))]
pub fn py_group_stats(db_path: &str, group_id: i64, completion_rule: Option<&str>) -> PyResult<Vec<StudentReport>> {
    let conn = crate::db::open_database(db_path)?;
    Ok(group_stats(&conn, group_id, parse_rule(completion_rule)?)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "teacher_stats", signature = (db_path, teacher_id, group_id=None, completion_rule=None))]
pub fn py_teacher_stats(
    db_path: &str,
    teacher_id: i64,
    group_id: Option<i64>,
    completion_rule: Option<&str>,
) -> PyResult<Vec<StudentReport>> {
    let conn = crate::db::open_database(db_path)?;
    Ok(teacher_stats(&conn, teacher_id, group_id, parse_rule(completion_rule)?)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "group_aggregate_stats")]
pub fn py_group_aggregate_stats(db_path: &str, group_id: i64) -> PyResult<GroupStats> {
    let conn = crate::db::open_database(db_path)?;
    Ok(group_aggregate_stats(&conn, group_id)?)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "attempt_history")]
pub fn py_attempt_history(db_path: &str, student_id: i64) -> PyResult<Vec<AttemptDetail>> {
    let conn = crate::db::open_database(db_path)?;
    Ok(attempt_history(&conn, student_id)?)
}
