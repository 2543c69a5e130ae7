//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()`
//! checks the current version and applies only the new ones in order.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL UNIQUE,
                first_name TEXT,
                relationship TEXT,
                care_recipient_name TEXT,
                zip_code TEXT,
                journey_phase TEXT NOT NULL DEFAULT 'onboarding',
                subscription_status TEXT NOT NULL DEFAULT 'none',
                burnout_score REAL,
                burnout_confidence REAL,
                burnout_band TEXT,
                pressure_zones TEXT NOT NULL DEFAULT '[]',
                pressure_zone_scores TEXT NOT NULL DEFAULT '{}',
                onboarding_attempts TEXT NOT NULL DEFAULT '{}',
                onboarding_cooldown_until TEXT,
                consent_at TEXT,
                language_preference TEXT NOT NULL DEFAULT 'en',
                historical_summary TEXT NOT NULL DEFAULT '',
                last_contact_at TEXT,
                last_proactive_message_at TEXT,
                last_crisis_event_at TEXT,
                crisis_followup_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);

            CREATE TABLE IF NOT EXISTS assessment_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                assessment_type TEXT NOT NULL,
                total_questions INTEGER NOT NULL,
                current_index INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'in_progress',
                started_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON assessment_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON assessment_sessions(status);

            CREATE TABLE IF NOT EXISTS assessment_responses (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES assessment_sessions(id) ON DELETE CASCADE,
                question_id TEXT NOT NULL,
                raw_value TEXT NOT NULL,
                score REAL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_session ON assessment_responses(session_id);

            CREATE TABLE IF NOT EXISTS wellness_scores (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                overall REAL NOT NULL,
                band TEXT NOT NULL,
                confidence REAL NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wellness_user_created
                ON wellness_scores(user_id, created_at);

            CREATE TABLE IF NOT EXISTS triggers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                trigger_type TEXT NOT NULL,
                rrule TEXT NOT NULL,
                timezone TEXT NOT NULL,
                message TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                next_occurrence TEXT NOT NULL,
                last_triggered_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_triggers_user_type ON triggers(user_id, trigger_type);
            CREATE INDEX IF NOT EXISTS idx_triggers_next ON triggers(next_occurrence);

            CREATE TABLE IF NOT EXISTS conversation_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                direction TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_log_user_created
                ON conversation_log(user_id, created_at);
        "#,
    },
    Migration {
        version: 2,
        name: "scheduled_messages",
        sql: r#"
            CREATE TABLE IF NOT EXISTS scheduled_messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                send_at TEXT NOT NULL,
                sent_at TEXT,
                canceled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_send ON scheduled_messages(send_at);
            CREATE INDEX IF NOT EXISTS idx_scheduled_user_kind
                ON scheduled_messages(user_id, kind);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
