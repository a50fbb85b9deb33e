//! Configuration management for the agent and the sandbox server.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required for the chat server. API key for the reasoning service.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `openai/gpt-4o-mini`.
//! - `ORACLE_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `ORACLE_TIMEOUT_SECS` - Optional. Per-call timeout for the reasoning service. Defaults to `60`.
//! - `HOST` - Optional. Chat server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Chat server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Maximum tool dispatch steps per request. Defaults to `10`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Overall deadline per chat request. Defaults to `120`.
//! - `SANDBOX_URL` - Optional. Remote sandbox address. When unset, code runs in-process.
//! - `EXECUTION_TIMEOUT_MS` - Optional. Wall-clock budget per code execution. Defaults to `5000`.
//!
//! The sandbox server additionally reads:
//! - `SANDBOX_HOST` / `SANDBOX_PORT` - Bind address. Defaults to `127.0.0.1:3001`.
//! - `SANDBOX_INTERPRETER` - Interpreter binary. Defaults to `node`.
//! - `SANDBOX_INTERPRETER_ARGS` - Whitespace-separated args placed before the code. Defaults to `--permission -e`.
//! - `SANDBOX_WRAPPER` - Optional whitespace-separated isolation wrapper (e.g. `bwrap ...`). Required for
//!   interpreters other than Node with its permission model.
//! - `SANDBOX_MAX_OUTPUT_BYTES` - Per-stream capture ceiling. Defaults to `65536`.
//! - `SANDBOX_MAX_CONCURRENCY` - Concurrent executions. Defaults to `4`.
//! - `SANDBOX_PATH` - `PATH` given to the child. Defaults to `/usr/local/bin:/usr/bin:/bin`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::sandbox::{Runtime, SandboxLimits};

pub const DEFAULT_ORACLE_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for reaching the reasoning service.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Model identifier (OpenRouter format)
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: Url,

    /// Per-call HTTP timeout
    pub timeout: Duration,
}

/// Chat server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reasoning service settings
    pub oracle: OracleConfig,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum tool dispatch steps per request
    pub max_iterations: usize,

    /// Overall deadline for one chat request
    pub request_timeout: Duration,

    /// Remote sandbox address; `None` runs code in-process
    pub sandbox_url: Option<Url>,

    /// Wall-clock budget per code execution
    pub execution_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparsable numbers or URLs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let oracle = OracleConfig {
            api_key,
            model: env_or("DEFAULT_MODEL", DEFAULT_MODEL),
            base_url: parse_url("ORACLE_BASE_URL", &env_or("ORACLE_BASE_URL", DEFAULT_ORACLE_BASE_URL))?,
            timeout: Duration::from_secs(env_parse("ORACLE_TIMEOUT_SECS", 60)?),
        };

        let sandbox_url = std::env::var("SANDBOX_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_url("SANDBOX_URL", &v))
            .transpose()?;

        let max_iterations: usize = env_parse("MAX_ITERATIONS", 10)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            oracle,
            host: env_or("HOST", "127.0.0.1"),
            port: env_parse("PORT", 3000)?,
            max_iterations,
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 120)?),
            sandbox_url,
            execution_timeout: Duration::from_millis(env_parse("EXECUTION_TIMEOUT_MS", 5000)?),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Result<Self, ConfigError> {
        Ok(Self {
            oracle: OracleConfig {
                api_key,
                model,
                base_url: parse_url("ORACLE_BASE_URL", DEFAULT_ORACLE_BASE_URL)?,
                timeout: Duration::from_secs(60),
            },
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 10,
            request_timeout: Duration::from_secs(120),
            sandbox_url: None,
            execution_timeout: Duration::from_millis(5000),
        })
    }
}

/// Sandbox server configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub host: String,
    pub port: u16,
    pub runtime: Runtime,
    pub limits: SandboxLimits,
    pub max_concurrency: usize,
}

impl SandboxConfig {
    /// Load sandbox server configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let program = env_or("SANDBOX_INTERPRETER", "node");
        let args = split_words(&env_or("SANDBOX_INTERPRETER_ARGS", "--permission -e"));
        let wrapper = split_words(&std::env::var("SANDBOX_WRAPPER").unwrap_or_default());

        let runtime = Runtime::new(program, args)
            .with_wrapper(wrapper)
            .with_path(env_or("SANDBOX_PATH", DEFAULT_CHILD_PATH));

        let limits = SandboxLimits {
            time_budget: Duration::from_millis(env_parse("EXECUTION_TIMEOUT_MS", 5000)?),
            max_output_bytes: env_parse("SANDBOX_MAX_OUTPUT_BYTES", 64 * 1024)?,
            ..SandboxLimits::default()
        };

        let max_concurrency: usize = env_parse("SANDBOX_MAX_CONCURRENCY", 4)?;
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "SANDBOX_MAX_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host: env_or("SANDBOX_HOST", "127.0.0.1"),
            port: env_parse("SANDBOX_PORT", 3001)?,
            runtime,
            limits,
            max_concurrency,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("unsupported scheme: {}", other),
        )),
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
