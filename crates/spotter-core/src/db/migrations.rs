//! Database schema initialization and migrations.

use crate::error::{DatabaseResultExt, Result};

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        // Cascades from plans down to plan exercises depend on this
        self.connection
            .execute("PRAGMA foreign_keys = ON", [])
            .db_context("Failed to enable foreign keys")?;

        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize database schema")?;

        self.apply_migrations()?;

        Ok(())
    }

    /// Apply database migrations for existing databases
    fn apply_migrations(&self) -> Result<()> {
        // Databases created before coach notes were introduced lack the column
        let has_coach_note: bool = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('workout_session_details') WHERE name = 'coach_note'",
                [],
                |row| row.get(0),
            )
            .map(|count: i64| count > 0)
            .db_context("Failed to inspect workout_session_details columns")?;

        if !has_coach_note {
            self.connection
                .execute(
                    "ALTER TABLE workout_session_details ADD COLUMN coach_note TEXT",
                    [],
                )
                .db_context("Failed to add coach_note column to workout_session_details")?;
        }

        Ok(())
    }
}
