use sqlx::PgPool;
use tracing::info;

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    // Owned by the content system in production; created here so a bare
    // database is usable.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cities (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            latitude DOUBLE PRECISION,
            longitude DOUBLE PRECISION
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS city_readings (
            city_id BIGINT PRIMARY KEY REFERENCES cities(id) ON DELETE CASCADE,
            temperature_c DOUBLE PRECISION NOT NULL,
            description TEXT NOT NULL,
            humidity DOUBLE PRECISION NOT NULL CHECK (humidity >= 0 AND humidity <= 100),
            captured_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed successfully");
    Ok(())
}
