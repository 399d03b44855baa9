/// Sandbox module runs submissions for real: a per-run workspace, the
/// isolation backends (docker containers or plain host processes) and the
/// runner driving them.
pub mod docker;
pub mod local;
pub mod process;
pub mod runner;
pub mod workspace;
