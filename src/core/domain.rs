use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_CPUS, DEFAULT_MEMORY_BYTES, DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_PIDS_LIMIT,
    DEFAULT_TIME_MS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    C,
}

impl Language {
    /// Sandbox image the submission runs in.
    pub fn image(&self) -> &'static str {
        match self {
            Language::Python => "runner-py",
            Language::JavaScript => "runner-js",
            Language::C => "runner-c",
        }
    }

    /// File name the source is written to inside the workspace.
    pub fn source_file_name(&self) -> &'static str {
        match self {
            Language::Python => "main.py",
            Language::JavaScript => "main.js",
            Language::C => "main.c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::C => "c",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct ParseLanguageError(pub String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "c" => Ok(Language::C),
            _ => Err(ParseLanguageError(s.to_string())),
        }
    }
}

/// Constraints applied to every sandboxed run. Network access is never granted.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionLimits {
    pub time_ms: u64,
    pub memory_bytes: u64,
    pub cpus: f64,
    pub pids_count: u32,
    pub output_size_bytes: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_ms: DEFAULT_TIME_MS,
            memory_bytes: DEFAULT_MEMORY_BYTES,
            cpus: DEFAULT_CPUS,
            pids_count: DEFAULT_PIDS_LIMIT,
            output_size_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: &str, expected_output: &str) -> Self {
        Self {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Submission {
    pub language: Language,
    pub code: String,
    pub test_cases: Vec<TestCase>,
}

/// Result of running one program against one input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { stdout: String },
    RuntimeFailed { reason: String },
    TimedOut,
}

/// Result of evaluating a whole submission. Test case indices are 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    RuntimeError {
        testcase: usize,
    },
    WrongOutput {
        testcase: usize,
        actual_output: String,
    },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Challenge definition as served by the external store. Only `language`
/// and `test_cases` are consumed by the judge, the rest belongs to the
/// similarity scorer.
#[derive(Clone, Debug)]
pub struct Challenge {
    pub id: String,
    pub language: Language,
    pub test_cases: Vec<TestCase>,
    pub base_code: String,
    pub similarity_threshold: f64,
    pub anchors: Vec<String>,
}
