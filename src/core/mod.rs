pub mod domain;
pub mod limiter;
pub mod matcher;
pub mod pipeline;
pub mod traits;
