/// Process configuration, read once at startup from the environment.
/// Secrets are masked in `Debug` so the struct is safe to log.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub secret_key: String,
    pub encryption_key: String,
    pub moodle_base_url: String,
    pub moodle_admin_token: Option<String>,
    pub hf_space_url: Option<String>,
    pub upload_dir: String,
    pub max_file_size_mb: u64,
    pub access_token_expire_minutes: i64,
    pub session_expire_hours: i64,
    pub run_migrations: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("encryption_key", &"<redacted>")
            .field("moodle_base_url", &self.moodle_base_url)
            .field(
                "moodle_admin_token",
                &self.moodle_admin_token.as_deref().map(|_| "<redacted>"),
            )
            .field("hf_space_url", &self.hf_space_url)
            .field("upload_dir", &self.upload_dir)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field(
                "access_token_expire_minutes",
                &self.access_token_expire_minutes,
            )
            .field("session_expire_hours", &self.session_expire_hours)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

/// Error returned when a required environment variable is absent or malformed.
#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl Config {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable (`DATABASE_URL`,
    /// `SECRET_KEY`, `ENCRYPTION_KEY`, `MOODLE_BASE_URL`) is missing, or if
    /// `ENCRYPTION_KEY` does not decode to exactly 32 bytes.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require_env("DATABASE_URL")?;
        let secret_key = require_env("SECRET_KEY")?;
        let encryption_key = require_env("ENCRYPTION_KEY")?;
        let moodle_base_url = require_env("MOODLE_BASE_URL")?;

        validate_encryption_key(&encryption_key)?;

        let port = std::env::var("PORT").ok().map_or(8080, |s| {
            s.parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("PORT env var {s:?} is invalid, defaulting to 8080");
                8080
            })
        });

        let run_migrations = std::env::var("RUN_MIGRATIONS")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Ok(Self {
            port,
            database_url,
            secret_key,
            encryption_key,
            moodle_base_url,
            moodle_admin_token: std::env::var("MOODLE_ADMIN_TOKEN").ok(),
            hf_space_url: std::env::var("HF_SPACE_URL").ok().filter(|s| !s.is_empty()),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_file_size_mb: std::env::var("MAX_FILE_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            access_token_expire_minutes: std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            session_expire_hours: std::env::var("SESSION_EXPIRE_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
            run_migrations,
        })
    }

    /// Decodes `encryption_key` into the raw 32-byte AEAD key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the decoded length isn't 32 bytes.
    pub fn encryption_key_bytes(&self) -> Result<[u8; 32], ConfigError> {
        let decoded = hex::decode(&self.encryption_key)
            .map_err(|e| ConfigError(format!("ENCRYPTION_KEY is not valid hex: {e}")))?;
        decoded
            .try_into()
            .map_err(|v: Vec<u8>| ConfigError(format!("ENCRYPTION_KEY must decode to 32 bytes, got {}", v.len())))
    }
}

fn validate_encryption_key(raw: &str) -> Result<(), ConfigError> {
    let decoded = hex::decode(raw)
        .map_err(|e| ConfigError(format!("ENCRYPTION_KEY is not valid hex: {e}")))?;
    if decoded.len() == 32 {
        Ok(())
    } else {
        Err(ConfigError(format!(
            "ENCRYPTION_KEY must decode to 32 bytes, got {}",
            decoded.len()
        )))
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError(format!("{name} environment variable is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_required_env() {
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/test");
            std::env::set_var("SECRET_KEY", "test-secret");
            std::env::set_var("ENCRYPTION_KEY", "00".repeat(32));
            std::env::set_var("MOODLE_BASE_URL", "https://moodle.example.com");
        }
    }

    fn clear_required_env() {
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("SECRET_KEY");
            std::env::remove_var("ENCRYPTION_KEY");
            std::env::remove_var("MOODLE_BASE_URL");
            std::env::remove_var("PORT");
        }
    }

    #[test]
    fn fails_without_required_vars() {
        let _g = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_required_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn succeeds_with_required_vars_and_defaults_port() {
        let _g = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        set_required_env();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_file_size_mb, 50);
        clear_required_env();
    }

    #[test]
    fn rejects_encryption_key_of_wrong_length() {
        let _g = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        set_required_env();
        unsafe { std::env::set_var("ENCRYPTION_KEY", "00") };
        assert!(Config::from_env().is_err());
        clear_required_env();
    }

    #[test]
    fn debug_masks_secrets() {
        let cfg = Config {
            port: 8080,
            database_url: "postgres://secret".to_string(),
            secret_key: "super-secret".to_string(),
            encryption_key: "00".repeat(32),
            moodle_base_url: "https://moodle.example.com".to_string(),
            moodle_admin_token: Some("admin-token".to_string()),
            hf_space_url: None,
            upload_dir: "./uploads".to_string(),
            max_file_size_mb: 50,
            access_token_expire_minutes: 60,
            session_expire_hours: 24,
            run_migrations: true,
        };
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("postgres://secret"));
        assert!(!debug_str.contains("super-secret"));
        assert!(!debug_str.contains("admin-token"));
        assert!(debug_str.contains("<redacted>"));
    }
}
