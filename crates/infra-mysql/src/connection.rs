// MySQL Connection Pool Setup

use std::str::FromStr;
use std::time::Duration;

use armada_core::error::{AppError, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

/// Create the MySQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<MySqlPool> {
    let options = MySqlConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("invalid database url: {e}")))?;

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Option<String> {
        std::env::var("ARMADA_TEST_DATABASE_URL").ok()
    }

    #[tokio::test]
    #[ignore = "requires MySQL running"]
    async fn test_create_pool() {
        let url = test_url().expect("ARMADA_TEST_DATABASE_URL not set");
        let pool = create_pool(&url).await.unwrap();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_config_error() {
        let err = create_pool("not-a-url").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
