use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::compile::{CompileLimits, CompilerCommand};
use crate::jobs::retry::RetryPolicy;
use crate::storage::keys::KeyLayout;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
///
/// Every component receives the slice of this struct it needs at
/// construction time; nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Only the API reads records; see [`Config::database_url`].
    pub database_url: Option<String>,
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub compile: CompileConfig,
    pub templates_dir: PathBuf,
    pub work_root: PathBuf,
    /// Stable across restarts so in-flight deliveries can be reclaimed.
    pub worker_id: String,
    pub worker_concurrency: usize,
    pub port: u16,
    pub rust_log: String,
}

/// Broker and result-backend settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub broker_url: String,
    pub result_backend_url: String,
    /// Namespace for every Redis key the pipeline touches.
    pub prefix: String,
    pub result_ttl: Duration,
}

/// Object-store credentials and key layout.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub force_path_style: bool,
    pub keys: KeyLayout,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct CompileConfig {
    pub compiler: CompilerCommand,
    pub limits: CompileLimits,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let broker_url = env.require("REDIS_URL")?;
        let result_backend_url = env
            .optional("RESULT_BACKEND_URL")
            .unwrap_or_else(|| broker_url.clone());

        let soft = Duration::from_secs(env.parse_or("COMPILE_SOFT_TIMEOUT_SECS", 90u64)?);
        let hard = Duration::from_secs(env.parse_or("COMPILE_HARD_TIMEOUT_SECS", 120u64)?);
        let limits = CompileLimits::new(soft, hard)?;

        let endpoint = env.optional("S3_ENDPOINT");
        let force_path_style = match env.optional("S3_FORCE_PATH_STYLE") {
            Some(raw) => parse_bool(&raw).context("S3_FORCE_PATH_STYLE must be true or false")?,
            // Custom endpoints (MinIO, R2) generally need path-style addressing.
            None => endpoint
                .as_deref()
                .map(|e| !e.contains("amazonaws.com"))
                .unwrap_or(false),
        };

        let worker_concurrency: usize = env.parse_or("WORKER_CONCURRENCY", 2usize)?;
        if worker_concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }

        Ok(Config {
            database_url: env.optional("DATABASE_URL"),
            queue: QueueConfig {
                broker_url,
                result_backend_url,
                prefix: env.optional("QUEUE_PREFIX").unwrap_or_else(|| "vellum".to_string()),
                result_ttl: Duration::from_secs(env.parse_or("RESULT_TTL_SECS", 86_400u64)?),
            },
            store: StoreConfig {
                bucket: env.require("S3_BUCKET")?,
                endpoint,
                region: env
                    .optional("S3_REGION")
                    .unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: env.require("AWS_ACCESS_KEY_ID")?,
                secret_access_key: env.require("AWS_SECRET_ACCESS_KEY")?,
                force_path_style,
                keys: KeyLayout::new(
                    &env.optional("S3_KEY_PREFIX").unwrap_or_else(|| "resumes".to_string()),
                    &env
                        .optional("S3_JOB_PREFIX")
                        .unwrap_or_else(|| "resume-jobs".to_string()),
                ),
                public_base_url: env.require("PUBLIC_BASE_URL")?,
            },
            compile: CompileConfig {
                compiler: CompilerCommand::latex(
                    &env.optional("LATEX_COMPILER").unwrap_or_else(|| "xelatex".to_string()),
                ),
                limits,
                retry: RetryPolicy {
                    max_retries: env.parse_or("COMPILE_MAX_RETRIES", 2u32)?,
                    base_delay: Duration::from_millis(env.parse_or("RETRY_BASE_DELAY_MS", 1000u64)?),
                    max_delay: Duration::from_secs(30),
                },
            },
            templates_dir: PathBuf::from(
                env.optional("TEMPLATES_DIR")
                    .unwrap_or_else(|| "templates".to_string()),
            ),
            work_root: env
                .optional("WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("vellum-work")),
            worker_id: env
                .optional("WORKER_ID")
                .or_else(|| env.optional("HOSTNAME"))
                .unwrap_or_else(|| "worker-1".to_string()),
            worker_concurrency,
            port: env.parse_or("PORT", 8080u16)?,
            rust_log: env.optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl Config {
    /// The record database URL, required by the API binary.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("Required environment variable 'DATABASE_URL' is not set")
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: '{raw}'")),
            None => Ok(default),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}
