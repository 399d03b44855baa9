use std::fmt::Display;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    constants::{DEFAULT_MAX_CONCURRENCY, MIN_MEMORY_BYTES},
    core::{domain::ExecutionLimits, limiter::ExecutionLimiter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Docker,
    Local,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Backend::Docker),
            "local" => Ok(Backend::Local),
            _ => Err("expected `docker` or `local`".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub max_concurrency: NonZeroUsize,
    pub admission_timeout: Option<Duration>,
    pub workspace_root: PathBuf,
    pub backend: Backend,
    pub docker_path: PathBuf,
    pub limits: ExecutionLimits,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: NonZeroUsize::new(DEFAULT_MAX_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
            admission_timeout: None,
            workspace_root: std::env::temp_dir().join("sandbox-judge"),
            backend: Backend::Docker,
            docker_path: PathBuf::from("docker"),
            limits: ExecutionLimits::default(),
        }
    }
}

impl JudgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `JUDGE_*` variables found through `lookup`,
    /// keeping the default for every variable that is absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(max) = parse::<NonZeroUsize, _>(&lookup, "JUDGE_MAX_CONCURRENCY")? {
            config.max_concurrency = max;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "JUDGE_ADMISSION_TIMEOUT_MS")? {
            config.admission_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(root) = lookup("JUDGE_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }
        if let Some(backend) = parse::<Backend, _>(&lookup, "JUDGE_BACKEND")? {
            config.backend = backend;
        }
        if let Some(path) = lookup("JUDGE_DOCKER_PATH") {
            config.docker_path = PathBuf::from(path);
        }

        let limits = &mut config.limits;
        if let Some(bytes) = parse::<u64, _>(&lookup, "JUDGE_MEMORY_BYTES")? {
            if bytes < MIN_MEMORY_BYTES {
                return Err(invalid(
                    "JUDGE_MEMORY_BYTES",
                    bytes,
                    format!("must be at least {} bytes", MIN_MEMORY_BYTES),
                ));
            }
            limits.memory_bytes = bytes;
        }
        if let Some(cpus) = parse::<f64, _>(&lookup, "JUDGE_CPUS")? {
            if !(cpus.is_finite() && cpus > 0.0) {
                return Err(invalid("JUDGE_CPUS", cpus, "must be a positive number"));
            }
            limits.cpus = cpus;
        }
        if let Some(pids) = parse::<u32, _>(&lookup, "JUDGE_PIDS_LIMIT")? {
            if pids == 0 {
                return Err(invalid("JUDGE_PIDS_LIMIT", pids, "must be greater than zero"));
            }
            limits.pids_count = pids;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "JUDGE_TIME_MS")? {
            if ms == 0 {
                return Err(invalid("JUDGE_TIME_MS", ms, "must be greater than zero"));
            }
            limits.time_ms = ms;
        }
        if let Some(bytes) = parse::<u64, _>(&lookup, "JUDGE_OUTPUT_LIMIT_BYTES")? {
            if bytes == 0 {
                return Err(invalid(
                    "JUDGE_OUTPUT_LIMIT_BYTES",
                    bytes,
                    "must be greater than zero",
                ));
            }
            limits.output_size_bytes = bytes;
        }

        Ok(config)
    }

    pub fn limiter(&self) -> ExecutionLimiter {
        let limiter = ExecutionLimiter::new(self.max_concurrency);
        match self.admission_timeout {
            Some(timeout) => limiter.with_queue_timeout(timeout),
            None => limiter,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().parse::<T>().map_err(|e| invalid(key, &value, e)))
        .transpose()
}

fn invalid(key: &'static str, value: impl Display, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
