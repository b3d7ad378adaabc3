//! Lexicon Core - exercise generation, progress and statistics for vocabulary modules
//!
//! Builds multiple-choice exercises from a module's word list, records student
//! attempts, and rolls attempts up into module progress and student, group
//! and teacher reports. Storage is SQLite.

mod config;
mod db;
mod error;
mod progress;
mod questions;
mod stats;

#[cfg(feature = "python")]
use pyo3::prelude::*;

pub use config::{CompletionRule, EngineConfig, GenerationConfig, QuestionTemplates, RegenerationPolicy, StatsConfig};
pub use db::{
    add_user, add_word, assign_module, available_modules_for_student, create_group, create_module, enrol_student,
    get_module, get_user, init_schema, list_groups_for_teacher, list_modules_for_group, list_words_for_module,
    module_exists, open_database, open_in_memory, Group, Module, Role, User, Word,
};
pub use error::{CoreError, CoreResult};
pub use progress::{
    append_attempt, append_attempt_at, completed_module_count, count_attempts, count_completed_modules,
    count_correct_attempts, exists_correct_attempt, is_module_complete, list_attempts_by_student, module_progress,
    module_progress_report, progress_overview, solved_exercise_ids, Attempt, ModuleProgress,
};
pub use questions::{
    build_exercise, build_exercises, count_exercises_for_module, exercise_by_index, generate_exercises, get_exercise,
    list_exercises_for_module, random_exercise, Direction, Exercise, NewExercise, MIN_WORDS,
};
pub use stats::{
    attempt_history, group_aggregate_stats, group_stats, student_stats, success_rate_percent, teacher_stats,
    AttemptDetail, GroupStats, StudentReport, StudentStats,
};

/// Lexicon Core Python Module
#[cfg(feature = "python")]
#[pymodule]
fn lexicon_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Storage
    m.add_function(wrap_pyfunction!(db::py_init_database, m)?)?;
    m.add_function(wrap_pyfunction!(db::py_list_words_for_module, m)?)?;

    // Exercise generation
    m.add_function(wrap_pyfunction!(questions::py_generate_exercises, m)?)?;
    m.add_function(wrap_pyfunction!(questions::py_list_exercises_for_module, m)?)?;

    // Attempts and progress
    m.add_function(wrap_pyfunction!(progress::py_submit_attempt, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py_is_module_complete, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py_module_progress, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py_completed_module_count, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py_progress_overview, m)?)?;

    // Reports
    m.add_function(wrap_pyfunction!(stats::py_student_stats, m)?)?;
    m.add_function(wrap_pyfunction!(stats::py_group_stats, m)?)?;
    m.add_function(wrap_pyfunction!(stats::py_teacher_stats, m)?)?;
    m.add_function(wrap_pyfunction!(stats::py_group_aggregate_stats, m)?)?;
    m.add_function(wrap_pyfunction!(stats::py_attempt_history, m)?)?;

    m.add_class::<db::Word>()?;
    m.add_class::<questions::Exercise>()?;
    m.add_class::<progress::Attempt>()?;
    m.add_class::<progress::ModuleProgress>()?;
    m.add_class::<stats::StudentStats>()?;
    m.add_class::<stats::StudentReport>()?;
    m.add_class::<stats::GroupStats>()?;
    m.add_class::<stats::AttemptDetail>()?;

    Ok(())
}
