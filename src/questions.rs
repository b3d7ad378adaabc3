//! Multiple-choice exercise generation for vocabulary modules
//!
//! Every word of a module becomes one exercise. The prompt is the word in one
//! language, the four options are translations in the other language: the
//! word's own translation plus three taken from other words of the same
//! module.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::config::{GenerationConfig, QuestionTemplates, RegenerationPolicy};
use crate::db::{list_words_for_module, module_exists, Word};
use crate::error::{CoreError, CoreResult};

/// A module needs at least this many words before exercises can be built
pub const MIN_WORDS: usize = 4;

const DISTRACTOR_COUNT: usize = MIN_WORDS - 1;

/// Language of the prompt and, by implication, of the options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// English prompt, Russian options
    EnglishToRussian,
    /// Russian prompt, English options
    RussianToEnglish,
}

impl Direction {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Direction::EnglishToRussian
        } else {
            Direction::RussianToEnglish
        }
    }

    fn prompt<'a>(&self, word: &'a Word) -> &'a str {
        match self {
            Direction::EnglishToRussian => &word.english,
            Direction::RussianToEnglish => &word.russian,
        }
    }

    fn answer<'a>(&self, word: &'a Word) -> &'a str {
        match self {
            Direction::EnglishToRussian => &word.russian,
            Direction::RussianToEnglish => &word.english,
        }
    }

    fn question(&self, word: &Word, templates: &QuestionTemplates) -> String {
        match self {
            Direction::EnglishToRussian => templates.english_question(self.prompt(word)),
            Direction::RussianToEnglish => templates.russian_question(self.prompt(word)),
        }
    }
}

/// Stored multiple-choice exercise. `options` are slots A to D.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub module_id: i64,
    pub question: String,
    pub correct_answer: String,
    pub options: [String; 4],
}

impl Exercise {
    /// Answers are compared exactly, the options are fixed strings
    pub fn is_correct_answer(&self, selected: &str) -> bool {
        self.correct_answer == selected
    }

    pub fn correct_slot(&self) -> Option<usize> {
        self.options.iter().position(|o| *o == self.correct_answer)
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl Exercise {
    #[getter]
    fn id(&self) -> i64 {
        self.id
    }

    #[getter]
    fn module_id(&self) -> i64 {
        self.module_id
    }

    #[getter]
    fn question(&self) -> String {
        self.question.clone()
    }

    #[getter]
    fn correct_answer(&self) -> String {
        self.correct_answer.clone()
    }

    #[getter]
    fn options(&self) -> Vec<String> {
        self.options.to_vec()
    }

    fn __repr__(&self) -> String {
        format!(
            "Exercise(id={}, question='{}...')",
            self.id,
            self.question.chars().take(40).collect::<String>()
        )
    }
}

/// Exercise built in memory and not stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExercise {
    pub module_id: i64,
    pub direction: Direction,
    pub question: String,
    pub correct_answer: String,
    pub options: [String; 4],
}

fn insufficient(module_id: i64, found: usize) -> CoreError {
    CoreError::InsufficientVocabulary {
        module_id,
        found,
        required: MIN_WORDS,
    }
}

/// Build the exercise for `target`, drawing distractors from the rest of `words`
pub fn build_exercise<R: Rng + ?Sized>(
    module_id: i64,
    target: &Word,
    words: &[Word],
    templates: &QuestionTemplates,
    rng: &mut R,
) -> CoreResult<NewExercise> {
    let others: Vec<&Word> = words.iter().filter(|w| w.id != target.id).collect();
    if others.len() < DISTRACTOR_COUNT {
        return Err(insufficient(module_id, others.len() + 1));
    }

    let direction = Direction::random(rng);
    let correct_answer = direction.answer(target).to_string();

    let mut options = Vec::with_capacity(MIN_WORDS);
    options.push(correct_answer.clone());
    options.extend(
        others
            .choose_multiple(rng, DISTRACTOR_COUNT)
            .map(|w| direction.answer(w).to_string()),
    );
    options.shuffle(rng);

    let options: [String; 4] = options
        .try_into()
        .map_err(|_| insufficient(module_id, others.len() + 1))?;

    Ok(NewExercise {
        module_id,
        direction,
        question: direction.question(target, templates),
        correct_answer,
        options,
    })
}

/// One exercise per word. The word count is checked once for the whole list.
pub fn build_exercises<R: Rng + ?Sized>(
    module_id: i64,
    words: &[Word],
    templates: &QuestionTemplates,
    rng: &mut R,
) -> CoreResult<Vec<NewExercise>> {
    if words.len() < MIN_WORDS {
        return Err(insufficient(module_id, words.len()));
    }

    words
        .iter()
        .map(|target| build_exercise(module_id, target, words, templates, rng))
        .collect()
}

/// Generate and store exercises for a module.
///
/// The word list is read and the whole batch written inside one transaction,
/// so a failed run leaves the module as it was. With
/// [`RegenerationPolicy::Append`] a second run adds another full set.
pub fn generate_exercises<R: Rng + ?Sized>(
    conn: &Connection,
    module_id: i64,
    config: &GenerationConfig,
    rng: &mut R,
) -> CoreResult<Vec<Exercise>> {
    let tx = conn.unchecked_transaction()?;

    if !module_exists(&tx, module_id)? {
        return Err(CoreError::not_found(format!("module {}", module_id)));
    }

    let existing = count_exercises_for_module(&tx, module_id)?;
    if existing > 0 && config.policy == RegenerationPolicy::SkipExisting {
        info!("Module {} already has {} exercises, skipping generation", module_id, existing);
        return list_exercises_for_module(&tx, module_id);
    }

    let words = list_words_for_module(&tx, module_id)?;
    if words.len() < MIN_WORDS {
        warn!(
            "Refusing to generate exercises for module {}: {} words, need {}",
            module_id,
            words.len(),
            MIN_WORDS
        );
        return Err(insufficient(module_id, words.len()));
    }

    if existing > 0 && config.policy == RegenerationPolicy::Replace {
        if module_has_attempts(&tx, module_id)? {
            warn!("Module {} exercises have attempts, not replacing them", module_id);
            return Err(CoreError::ExercisesInUse { module_id });
        }
        tx.execute("DELETE FROM exercises WHERE module_id = ?1", params![module_id])?;
    }

    let drafts = build_exercises(module_id, &words, &config.templates, rng)?;
    let exercises = drafts
        .iter()
        .map(|draft| insert_exercise(&tx, draft))
        .collect::<CoreResult<Vec<_>>>()?;

    tx.commit()?;

    info!(
        "Generated {} exercises for module {} ({:?}, {} existed before)",
        exercises.len(),
        module_id,
        config.policy,
        existing
    );
    Ok(exercises)
}

fn insert_exercise(conn: &Connection, draft: &NewExercise) -> CoreResult<Exercise> {
    let [a, b, c, d] = &draft.options;
    conn.execute(
        "INSERT INTO exercises (module_id, question, correct_answer, option_a, option_b, option_c, option_d)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![draft.module_id, draft.question, draft.correct_answer, a, b, c, d],
    )?;

    Ok(Exercise {
        id: conn.last_insert_rowid(),
        module_id: draft.module_id,
        question: draft.question.clone(),
        correct_answer: draft.correct_answer.clone(),
        options: draft.options.clone(),
    })
}

fn module_has_attempts(conn: &Connection, module_id: i64) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT a.id FROM attempts a JOIN exercises e ON e.id = a.exercise_id
             WHERE e.module_id = ?1 LIMIT 1",
            params![module_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn exercise_from_row(row: &Row<'_>) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(0)?,
        module_id: row.get(1)?,
        question: row.get(2)?,
        correct_answer: row.get(3)?,
        options: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
    })
}

const EXERCISE_COLUMNS: &str =
    "id, module_id, question, correct_answer, option_a, option_b, option_c, option_d";

pub fn list_exercises_for_module(conn: &Connection, module_id: i64) -> CoreResult<Vec<Exercise>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM exercises WHERE module_id = ?1 ORDER BY id",
        EXERCISE_COLUMNS
    ))?;
    let exercises = stmt
        .query_map(params![module_id], exercise_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(exercises)
}

pub fn count_exercises_for_module(conn: &Connection, module_id: i64) -> CoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM exercises WHERE module_id = ?1",
        params![module_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn get_exercise(conn: &Connection, exercise_id: i64) -> CoreResult<Option<Exercise>> {
    let exercise = conn
        .query_row(
            &format!("SELECT {} FROM exercises WHERE id = ?1", EXERCISE_COLUMNS),
            params![exercise_id],
            exercise_from_row,
        )
        .optional()?;
    Ok(exercise)
}

/// Exercise at `index` in practice order, `None` past the end
pub fn exercise_by_index(conn: &Connection, module_id: i64, index: usize) -> CoreResult<Option<Exercise>> {
    let mut exercises = list_exercises_for_module(conn, module_id)?;
    if index >= exercises.len() {
        return Ok(None);
    }
    Ok(Some(exercises.swap_remove(index)))
}

pub fn random_exercise<R: Rng + ?Sized>(
    conn: &Connection,
    module_id: i64,
    rng: &mut R,
) -> CoreResult<Exercise> {
    list_exercises_for_module(conn, module_id)?
        .choose(rng)
        .cloned()
        .ok_or_else(|| CoreError::not_found(format!("exercises for module {}", module_id)))
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "generate_exercises", signature = (db_path, module_id, policy=None, seed=None))]
pub fn py_generate_exercises(
    db_path: &str,
    module_id: i64,
    policy: Option<&str>,
    seed: Option<u64>,
) -> PyResult<Vec<Exercise>> {
    use rand::SeedableRng;

    let conn = crate::db::open_database(db_path)?;
    let config = GenerationConfig {
        policy: policy.map(str::parse).transpose()?.unwrap_or_default(),
        ..GenerationConfig::default()
    };

    let exercises = match seed {
        Some(seed) => generate_exercises(&conn, module_id, &config, &mut rand::rngs::StdRng::seed_from_u64(seed))?,
        None => generate_exercises(&conn, module_id, &config, &mut rand::thread_rng())?,
    };
    Ok(exercises)
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "list_exercises_for_module")]
pub fn py_list_exercises_for_module(db_path: &str, module_id: i64) -> PyResult<Vec<Exercise>> {
    let conn = crate::db::open_database(db_path)?;
    Ok(list_exercises_for_module(&conn, module_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_user, add_word, create_module, open_in_memory, Role};
    use crate::progress::append_attempt;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    const ANIMALS: [(&str, &str); 4] = [
        ("cat", "кот"),
        ("dog", "собака"),
        ("bird", "птица"),
        ("fish", "рыба"),
    ];

    fn words(pairs: &[(&str, &str)]) -> Vec<Word> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (en, ru))| Word {
                id: i as i64 + 1,
                module_id: 1,
                english: en.to_string(),
                russian: ru.to_string(),
            })
            .collect()
    }

    fn setup_module(pairs: &[(&str, &str)]) -> (Connection, i64) {
        let conn = open_in_memory().expect("open db");
        let teacher = add_user(&conn, "teacher", Role::Teacher).unwrap();
        let module_id = create_module(&conn, "Animals", teacher).unwrap();
        for (en, ru) in pairs {
            add_word(&conn, module_id, en, ru).unwrap();
        }
        (conn, module_id)
    }

    fn assert_well_formed(exercise_options: &[String; 4], correct: &str) {
        let distinct: HashSet<&String> = exercise_options.iter().collect();
        assert_eq!(distinct.len(), 4, "options must be distinct: {:?}", exercise_options);
        assert_eq!(
            exercise_options.iter().filter(|o| *o == correct).count(),
            1,
            "correct answer must appear exactly once"
        );
    }

    #[test]
    fn test_animals_scenario() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let exercises = generate_exercises(&conn, module_id, &GenerationConfig::default(), &mut rng)
            .expect("generation succeeds");
        assert_eq!(exercises.len(), 4);

        let russian: HashSet<&str> = ANIMALS.iter().map(|(_, ru)| *ru).collect();
        let english: HashSet<&str> = ANIMALS.iter().map(|(en, _)| *en).collect();

        for exercise in &exercises {
            assert_eq!(exercise.module_id, module_id);
            assert_well_formed(&exercise.options, &exercise.correct_answer);

            let in_russian = exercise.options.iter().all(|o| russian.contains(o.as_str()));
            let in_english = exercise.options.iter().all(|o| english.contains(o.as_str()));
            assert!(in_russian ^ in_english, "options must share one language");

            let (en, ru) = ANIMALS
                .iter()
                .find(|(en, ru)| exercise.question.contains(en) || exercise.question.contains(ru))
                .expect("question names one of the words");
            if in_russian {
                assert_eq!(exercise.correct_answer, *ru);
                assert_eq!(exercise.question, format!("What is the translation of: {}?", en));
            } else {
                assert_eq!(exercise.correct_answer, *en);
                assert_eq!(exercise.question, format!("Как переводится: {}?", ru));
            }
        }

        assert_eq!(list_exercises_for_module(&conn, module_id).unwrap(), exercises);
    }

    #[test]
    fn test_insufficient_vocabulary_writes_nothing() {
        let (conn, module_id) = setup_module(&ANIMALS[..3]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let err = generate_exercises(&conn, module_id, &GenerationConfig::default(), &mut rng)
            .expect_err("three words are not enough");
        assert!(matches!(
            err,
            CoreError::InsufficientVocabulary { found: 3, required: 4, .. }
        ));
        assert_eq!(count_exercises_for_module(&conn, module_id).unwrap(), 0);
    }

    #[test]
    fn test_empty_module_is_insufficient() {
        let (conn, module_id) = setup_module(&[]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = generate_exercises(&conn, module_id, &GenerationConfig::default(), &mut rng);
        assert!(matches!(result, Err(CoreError::InsufficientVocabulary { found: 0, .. })));
    }

    #[test]
    fn test_missing_module_is_not_found() {
        let (conn, _) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = generate_exercises(&conn, 999, &GenerationConfig::default(), &mut rng);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_append_policy_duplicates_the_set() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = GenerationConfig::default();

        generate_exercises(&conn, module_id, &config, &mut rng).unwrap();
        generate_exercises(&conn, module_id, &config, &mut rng).unwrap();

        assert_eq!(count_exercises_for_module(&conn, module_id).unwrap(), 8);
    }

    #[test]
    fn test_skip_existing_policy_keeps_first_set() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = GenerationConfig {
            policy: RegenerationPolicy::SkipExisting,
            ..GenerationConfig::default()
        };

        let first = generate_exercises(&conn, module_id, &config, &mut rng).unwrap();
        let second = generate_exercises(&conn, module_id, &config, &mut rng).unwrap();

        assert_eq!(first, second);
        assert_eq!(count_exercises_for_module(&conn, module_id).unwrap(), 4);
    }

    #[test]
    fn test_replace_policy_swaps_unused_set() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = GenerationConfig {
            policy: RegenerationPolicy::Replace,
            ..GenerationConfig::default()
        };

        let first = generate_exercises(&conn, module_id, &config, &mut rng).unwrap();
        let second = generate_exercises(&conn, module_id, &config, &mut rng).unwrap();

        assert_eq!(count_exercises_for_module(&conn, module_id).unwrap(), 4);
        let first_ids: HashSet<i64> = first.iter().map(|e| e.id).collect();
        assert!(second.iter().all(|e| !first_ids.contains(&e.id)));
    }

    #[test]
    fn test_replace_policy_refuses_when_attempted() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let student = add_user(&conn, "student", Role::Student).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = GenerationConfig {
            policy: RegenerationPolicy::Replace,
            ..GenerationConfig::default()
        };

        let first = generate_exercises(&conn, module_id, &config, &mut rng).unwrap();
        append_attempt(&conn, student, first[0].id, "wrong", 4).unwrap();

        let result = generate_exercises(&conn, module_id, &config, &mut rng);
        assert!(matches!(result, Err(CoreError::ExercisesInUse { .. })));
        assert_eq!(list_exercises_for_module(&conn, module_id).unwrap(), first);
    }

    #[test]
    fn test_same_seed_same_exercises() {
        let words = words(&ANIMALS);
        let templates = QuestionTemplates::default();

        let a = build_exercises(1, &words, &templates, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let b = build_exercises(1, &words, &templates, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_both_directions_occur() {
        let words = words(&ANIMALS);
        let templates = QuestionTemplates::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let mut seen = HashSet::new();
        for _ in 0..50 {
            for exercise in build_exercises(1, &words, &templates, &mut rng).unwrap() {
                seen.insert(exercise.direction);
            }
        }
        assert!(seen.contains(&Direction::EnglishToRussian));
        assert!(seen.contains(&Direction::RussianToEnglish));
    }

    #[test]
    fn test_correct_slot_is_uniform() {
        let words = words(&[
            ("cat", "кот"),
            ("dog", "собака"),
            ("bird", "птица"),
            ("fish", "рыба"),
            ("horse", "лошадь"),
            ("cow", "корова"),
        ]);
        let templates = QuestionTemplates::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        let mut slots = [0u32; 4];
        let rounds = 2000;
        for _ in 0..rounds {
            for exercise in build_exercises(1, &words, &templates, &mut rng).unwrap() {
                let slot = exercise
                    .options
                    .iter()
                    .position(|o| *o == exercise.correct_answer)
                    .expect("correct answer among options");
                slots[slot] += 1;
            }
        }

        let total: u32 = slots.iter().sum();
        let expected = total as f64 / 4.0;
        let chi_square: f64 = slots
            .iter()
            .map(|&observed| (observed as f64 - expected).powi(2) / expected)
            .sum();
        // 3 degrees of freedom, p = 0.0001
        assert!(chi_square < 21.11, "slots {:?} chi-square {}", slots, chi_square);
    }

    #[test]
    fn test_navigation_helpers() {
        let (conn, module_id) = setup_module(&ANIMALS);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        assert!(matches!(
            random_exercise(&conn, module_id, &mut rng),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(exercise_by_index(&conn, module_id, 0).unwrap(), None);

        let exercises = generate_exercises(&conn, module_id, &GenerationConfig::default(), &mut rng).unwrap();

        assert_eq!(exercise_by_index(&conn, module_id, 2).unwrap(), Some(exercises[2].clone()));
        assert_eq!(exercise_by_index(&conn, module_id, 4).unwrap(), None);
        assert_eq!(get_exercise(&conn, exercises[1].id).unwrap(), Some(exercises[1].clone()));
        assert_eq!(get_exercise(&conn, 999).unwrap(), None);

        let picked = random_exercise(&conn, module_id, &mut rng).unwrap();
        assert!(exercises.contains(&picked));
        assert!(picked.is_correct_answer(&picked.correct_answer));
        assert_eq!(
            picked.options[picked.correct_slot().expect("slot")],
            picked.correct_answer
        );
    }

    proptest! {
        #[test]
        fn prop_every_exercise_is_well_formed(count in 4usize..15, seed in any::<u64>()) {
            let words: Vec<Word> = (0..count)
                .map(|i| Word {
                    id: i as i64,
                    module_id: 1,
                    english: format!("en-{}", i),
                    russian: format!("ru-{}", i),
                })
                .collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let exercises = build_exercises(1, &words, &QuestionTemplates::default(), &mut rng).unwrap();

            prop_assert_eq!(exercises.len(), count);
            for (exercise, target) in exercises.iter().zip(&words) {
                let distinct: HashSet<&String> = exercise.options.iter().collect();
                prop_assert_eq!(distinct.len(), 4);
                prop_assert!(exercise.options.contains(&exercise.correct_answer));
                let expected = match exercise.direction {
                    Direction::EnglishToRussian => &target.russian,
                    Direction::RussianToEnglish => &target.english,
                };
                prop_assert_eq!(&exercise.correct_answer, expected);
                let prefix = match exercise.direction {
                    Direction::EnglishToRussian => "ru-",
                    Direction::RussianToEnglish => "en-",
                };
                prop_assert!(exercise.options.iter().all(|o| o.starts_with(prefix)));
            }
        }

        #[test]
        fn prop_short_lists_are_rejected(count in 0usize..4, seed in any::<u64>()) {
            let words: Vec<Word> = (0..count)
                .map(|i| Word {
                    id: i as i64,
                    module_id: 1,
                    english: format!("en-{}", i),
                    russian: format!("ru-{}", i),
                })
                .collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = build_exercises(1, &words, &QuestionTemplates::default(), &mut rng);
            prop_assert!(
                matches!(result, Err(CoreError::InsufficientVocabulary { .. })),
                "expected InsufficientVocabulary"
            );
        }
    }
}
