// src/memory/store.rs — SQLite-backed PromptStore

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{schema, PromptStore, ValidatedEvaluation};
use crate::core::prompt::Prompt;
use crate::core::types::EvaluationResult;
use crate::infra::errors::ArcherError;

/// Row view of a stored prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrompt {
    pub id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub generation: u32,
    pub average_score: Option<f32>,
    pub rounds_survived: u32,
    pub is_active: bool,
}

/// SQLite operations. The connection sits behind a mutex so the store can be
/// shared as `Arc<dyn PromptStore>`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, ArcherError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, ArcherError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ArcherError> {
        self.conn
            .lock()
            .map_err(|_| ArcherError::Persistence("store connection lock poisoned".into()))
    }

    pub fn get_prompt(&self, id: &str) -> Result<Option<StoredPrompt>, ArcherError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, parent_id, content, generation, average_score, rounds_survived, is_active
                 FROM prompts WHERE id = ?1",
                [id],
                |r| {
                    Ok(StoredPrompt {
                        id: r.get(0)?,
                        parent_id: r.get(1)?,
                        content: r.get(2)?,
                        generation: r.get(3)?,
                        average_score: r.get::<_, Option<f64>>(4)?.map(|s| s as f32),
                        rounds_survived: r.get(5)?,
                        is_active: r.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn active_prompt_ids(&self) -> Result<Vec<String>, ArcherError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM prompts WHERE is_active = 1 ORDER BY created_at")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn count_records(&self) -> Result<usize, ArcherError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl PromptStore for Store {
    fn store_prompt(&self, prompt: &Prompt) -> Result<String, ArcherError> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO prompts (id, parent_id, content, generation, score, feedback, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                generation = excluded.generation,
                score = excluded.score,
                feedback = excluded.feedback,
                updated_at = excluded.updated_at",
            params![
                prompt.id,
                prompt.parent_id,
                prompt.content(),
                prompt.generation(),
                prompt.score as f64,
                prompt.feedback,
                now
            ],
        )?;
        Ok(prompt.id.clone())
    }

    fn store_record(
        &self,
        input: &str,
        content: &str,
        generator_prompt_id: &str,
        evaluator_prompt_id: &str,
        generation: u32,
        round_id: &str,
    ) -> Result<String, ArcherError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO records (id, input, content, generator_prompt_id, evaluator_prompt_id,
             generation, round_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                input,
                content,
                generator_prompt_id,
                evaluator_prompt_id,
                generation,
                round_id,
                now
            ],
        )?;
        Ok(id)
    }

    fn store_evaluation(
        &self,
        output_id: &str,
        prompt_id: &str,
        evaluation: &EvaluationResult,
        validated: bool,
    ) -> Result<String, ArcherError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO evaluations (id, output_id, prompt_id, score, feedback, improved_output,
             summary, validated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                output_id,
                prompt_id,
                evaluation.score as f64,
                evaluation.feedback,
                evaluation.improved_output,
                evaluation.summary,
                validated,
                now
            ],
        )?;
        Ok(id)
    }

    fn update_prompt_performance(
        &self,
        prompt_id: &str,
        average_score: f32,
        rounds_survived: u32,
        is_active: bool,
    ) -> Result<bool, ArcherError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn()?.execute(
            "UPDATE prompts SET average_score = ?1, rounds_survived = ?2, is_active = ?3,
             updated_at = ?4 WHERE id = ?5",
            params![average_score as f64, rounds_survived, is_active, now, prompt_id],
        )?;
        Ok(changed > 0)
    }

    fn get_validated_evaluations(&self, limit: usize) -> Result<Vec<ValidatedEvaluation>, ArcherError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT output_id, prompt_id, score, feedback, improved_output
             FROM evaluations WHERE validated = 1
             ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |r| {
                Ok(ValidatedEvaluation {
                    output_id: r.get(0)?,
                    prompt_id: r.get(1)?,
                    score: r.get::<_, f64>(2)? as f32,
                    feedback: r.get(3)?,
                    improved_output: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
