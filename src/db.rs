//! SQLite storage for users, groups, modules and their vocabulary
//!
//! These tables belong to the surrounding application. The core only reads
//! them, except for the exercise and attempt tables it owns. The write helpers
//! here are the minimum the application needs to set up a module.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::questions::{list_exercises_for_module, Exercise};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL CHECK (role IN ('STUDENT', 'TEACHER')),
        group_id INTEGER REFERENCES groups(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        teacher_id INTEGER NOT NULL REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS modules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        owner_id INTEGER NOT NULL REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS group_modules (
        group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
        module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        PRIMARY KEY (group_id, module_id)
    );

    CREATE TABLE IF NOT EXISTS words (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        english TEXT NOT NULL,
        russian TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS exercises (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        question TEXT NOT NULL,
        correct_answer TEXT NOT NULL,
        option_a TEXT NOT NULL,
        option_b TEXT NOT NULL,
        option_c TEXT NOT NULL,
        option_d TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES users(id),
        exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
        selected_answer TEXT NOT NULL,
        is_correct INTEGER NOT NULL,
        attempted_at TEXT NOT NULL,
        time_spent_seconds INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_words_module ON words(module_id);
    CREATE INDEX IF NOT EXISTS idx_exercises_module ON exercises(module_id);
    CREATE INDEX IF NOT EXISTS idx_attempts_student_exercise ON attempts(student_id, exercise_id);
    CREATE INDEX IF NOT EXISTS idx_users_group ON users(group_id);
";

/// Open (or create) a database file and make sure the schema exists
pub fn open_database<P: AsRef<Path>>(db_path: P) -> CoreResult<Connection> {
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema
pub fn open_in_memory() -> CoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Role::Student),
            "TEACHER" => Ok(Role::Teacher),
            other => Err(CoreError::Config(format!("unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: i64,
}

/// English/Russian translation pair belonging to a module
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: i64,
    pub module_id: i64,
    pub english: String,
    pub russian: String,
}

#[cfg(feature = "python")]
#[pymethods]
impl Word {
    fn __repr__(&self) -> String {
        format!("Word(id={}, english='{}', russian='{}')", self.id, self.english, self.russian)
    }
}

/// Module with its vocabulary and generated exercises
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub title: String,
    pub owner_id: i64,
    pub words: Vec<Word>,
    pub exercises: Vec<Exercise>,
}

fn word_from_row(row: &Row<'_>) -> rusqlite::Result<Word> {
    Ok(Word {
        id: row.get(0)?,
        module_id: row.get(1)?,
        english: row.get(2)?,
        russian: row.get(3)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        teacher_id: row.get(3)?,
    })
}

// ============= Users and groups =============

pub fn add_user(conn: &Connection, username: &str, role: Role) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO users (username, role) VALUES (?1, ?2)",
        params![username, role.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, user_id: i64) -> CoreResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, role, group_id FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?;

    match user {
        Some((id, username, role, group_id)) => Ok(Some(User {
            id,
            username,
            role: role.parse()?,
            group_id,
        })),
        None => Ok(None),
    }
}

pub fn create_group(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    teacher_id: i64,
) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO groups (name, description, teacher_id) VALUES (?1, ?2, ?3)",
        params![name, description, teacher_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Move a student into a group, replacing any previous membership
pub fn enrol_student(conn: &Connection, student_id: i64, group_id: i64) -> CoreResult<()> {
    let updated = conn.execute(
        "UPDATE users SET group_id = ?1 WHERE id = ?2",
        params![group_id, student_id],
    )?;
    if updated == 0 {
        return Err(CoreError::not_found(format!("user {}", student_id)));
    }
    Ok(())
}

pub fn list_groups_for_teacher(conn: &Connection, teacher_id: i64) -> CoreResult<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, teacher_id FROM groups WHERE teacher_id = ?1 ORDER BY id",
    )?;
    let groups = stmt
        .query_map(params![teacher_id], group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

// ============= Modules and words =============

pub fn create_module(conn: &Connection, title: &str, owner_id: i64) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO modules (title, owner_id) VALUES (?1, ?2)",
        params![title, owner_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn module_exists(conn: &Connection, module_id: i64) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM modules WHERE id = ?1",
            params![module_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Load a module together with its words and exercises
pub fn get_module(conn: &Connection, module_id: i64) -> CoreResult<Module> {
    let header: Option<(String, i64)> = conn
        .query_row(
            "SELECT title, owner_id FROM modules WHERE id = ?1",
            params![module_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (title, owner_id) = header.ok_or_else(|| CoreError::not_found(format!("module {}", module_id)))?;

    Ok(Module {
        id: module_id,
        title,
        owner_id,
        words: list_words_for_module(conn, module_id)?,
        exercises: list_exercises_for_module(conn, module_id)?,
    })
}

pub fn assign_module(conn: &Connection, group_id: i64, module_id: i64) -> CoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO group_modules (group_id, module_id) VALUES (?1, ?2)",
        params![group_id, module_id],
    )?;
    Ok(())
}

/// Module ids assigned to a group
pub fn list_modules_for_group(conn: &Connection, group_id: i64) -> CoreResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT module_id FROM group_modules WHERE group_id = ?1 ORDER BY module_id",
    )?;
    let ids = stmt
        .query_map(params![group_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Modules a student can practice, through their group. Empty when the
/// student does not exist or has no group.
pub fn available_modules_for_student(conn: &Connection, student_id: i64) -> CoreResult<Vec<i64>> {
    match get_user(conn, student_id)?.and_then(|u| u.group_id) {
        Some(group_id) => list_modules_for_group(conn, group_id),
        None => Ok(Vec::new()),
    }
}

pub fn add_word(conn: &Connection, module_id: i64, english: &str, russian: &str) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO words (module_id, english, russian) VALUES (?1, ?2, ?3)",
        params![module_id, english, russian],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_words_for_module(conn: &Connection, module_id: i64) -> CoreResult<Vec<Word>> {
    let mut stmt = conn.prepare(
        "SELECT id, module_id, english, russian FROM words WHERE module_id = ?1 ORDER BY id",
    )?;
    let words = stmt
        .query_map(params![module_id], word_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(words)
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "init_database")]
pub fn py_init_database(db_path: &str) -> PyResult<()> {
    open_database(db_path)?;
    Ok(())
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "list_words_for_module")]
pub fn py_list_words_for_module(db_path: &str, module_id: i64) -> PyResult<Vec<Word>> {
    let conn = open_database(db_path)?;
    Ok(list_words_for_module(&conn, module_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().expect("open db");
        init_schema(&conn).expect("second init");
    }

    #[test]
    fn test_module_words_roundtrip() {
        let conn = open_in_memory().expect("open db");
        let teacher = add_user(&conn, "teacher", Role::Teacher).unwrap();
        let module_id = create_module(&conn, "Animals", teacher).unwrap();
        add_word(&conn, module_id, "cat", "кот").unwrap();
        add_word(&conn, module_id, "dog", "собака").unwrap();

        let module = get_module(&conn, module_id).expect("module exists");
        assert_eq!(module.title, "Animals");
        assert_eq!(module.owner_id, teacher);
        assert_eq!(module.words.len(), 2);
        assert_eq!(module.words[0].english, "cat");
        assert_eq!(module.words[1].russian, "собака");
        assert!(module.exercises.is_empty());
    }

    #[test]
    fn test_missing_module_is_not_found() {
        let conn = open_in_memory().expect("open db");
        assert!(matches!(get_module(&conn, 42), Err(CoreError::NotFound(_))));
        assert!(!module_exists(&conn, 42).unwrap());
    }

    #[test]
    fn test_available_modules_follow_group() {
        let conn = open_in_memory().expect("open db");
        let teacher = add_user(&conn, "teacher", Role::Teacher).unwrap();
        let student = add_user(&conn, "student", Role::Student).unwrap();
        let loner = add_user(&conn, "loner", Role::Student).unwrap();
        let group = create_group(&conn, "A1", Some("beginners"), teacher).unwrap();
        let m1 = create_module(&conn, "Animals", teacher).unwrap();
        let m2 = create_module(&conn, "Food", teacher).unwrap();
        create_module(&conn, "Unassigned", teacher).unwrap();

        assign_module(&conn, group, m1).unwrap();
        assign_module(&conn, group, m2).unwrap();
        assign_module(&conn, group, m2).unwrap();
        enrol_student(&conn, student, group).unwrap();

        assert_eq!(available_modules_for_student(&conn, student).unwrap(), vec![m1, m2]);
        assert!(available_modules_for_student(&conn, loner).unwrap().is_empty());
        assert!(available_modules_for_student(&conn, 999).unwrap().is_empty());

        let user = get_user(&conn, student).unwrap().expect("student exists");
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.group_id, Some(group));
    }

    #[test]
    fn test_groups_for_teacher() {
        let conn = open_in_memory().expect("open db");
        let t1 = add_user(&conn, "t1", Role::Teacher).unwrap();
        let t2 = add_user(&conn, "t2", Role::Teacher).unwrap();
        create_group(&conn, "A1", None, t1).unwrap();
        create_group(&conn, "A2", None, t1).unwrap();
        create_group(&conn, "B1", None, t2).unwrap();

        let groups = list_groups_for_teacher(&conn, t1).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.teacher_id == t1));
        assert!(list_groups_for_teacher(&conn, 999).unwrap().is_empty());
    }

    #[test]
    fn test_enrol_unknown_student_fails() {
        let conn = open_in_memory().expect("open db");
        let teacher = add_user(&conn, "teacher", Role::Teacher).unwrap();
        let group = create_group(&conn, "A1", None, teacher).unwrap();
        assert!(matches!(enrol_student(&conn, 999, group), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lexicon.db");
        {
            let conn = open_database(&path).expect("create db");
            let teacher = add_user(&conn, "teacher", Role::Teacher).unwrap();
            create_module(&conn, "Animals", teacher).unwrap();
        }
        let conn = open_database(&path).expect("reopen db");
        assert!(module_exists(&conn, 1).unwrap());
    }
}
