pub const DEFAULT_MEMORY_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_CPUS: f64 = 0.5;
pub const DEFAULT_PIDS_LIMIT: u32 = 64;
pub const DEFAULT_TIME_MS: u64 = 2000;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Reported when a failed program wrote nothing to stderr.
pub const RUNTIME_ERROR_MSG: &str = "Runtime error";

/// Where the workspace is mounted inside a container.
pub const SANDBOX_WORKDIR: &str = "/app";
pub const WORKSPACE_PREFIX: &str = "run-";
pub const CONTAINER_PREFIX: &str = "judge-";

/// Smallest memory limit docker accepts for a container.
pub const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

/// How long pipes may stay open after the program exited. Whatever is
/// still holding them past this is killed.
pub const OUTPUT_DRAIN_MS: u64 = 100;
/// Upper bound for a `docker rm --force` call.
pub const CONTAINER_REMOVAL_TIMEOUT_MS: u64 = 10_000;

pub const SEMAPHORE_CLOSED_ERR: &str = "Execution limiter semaphore is never closed";
