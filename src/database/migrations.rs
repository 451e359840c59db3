//! Schema setup for the engine's six tables. The DDL is idempotent
//! (`IF NOT EXISTS` throughout) so tests and workers can run it at startup
//! without coordination.

use sqlx::PgPool;

const ENGINE_TABLES: &str = include_str!("../../migrations/20250301000000_create_engine_tables.sql");

/// Apply the engine schema to the given database.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(ENGINE_TABLES).execute(pool).await?;
    Ok(())
}
