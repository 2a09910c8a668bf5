//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Worker loop constants
pub mod worker {
    /// Delay between queue polls when no repository is pending (seconds)
    pub const IDLE_POLL_SECS: u64 = 5;

    /// Delay after a failed repository before resuming the loop (seconds)
    pub const FAILURE_BACKOFF_SECS: u64 = 5;

    /// Lease duration for a claimed repository. Must exceed the longest
    /// expected pipeline run; there is no mid-run renewal.
    pub const LEASE_SECS: u64 = 24 * 60 * 60;
}

/// Incremental updater constants
pub mod updater {
    /// Period between staleness sweeps (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 60 * 60;
}

/// Pipeline stage retry constants
pub mod retry {
    /// Attempts for LLM-bearing stages
    pub const STAGE_ATTEMPTS: u32 = 3;

    /// Exponential back-off base for stage retries (seconds, 2^n)
    pub const STAGE_BACKOFF_BASE_SECS: u64 = 2;

    /// Attempts for the directory-simplifier call in the catalogue stage
    pub const SIMPLIFIER_ATTEMPTS: u32 = 5;

    /// Linear back-off step for the simplifier (seconds x attempt)
    pub const SIMPLIFIER_BACKOFF_STEP_SECS: u64 = 5;
}

/// Catalogue stage constants
pub mod catalogue {
    /// File count at or above which the smart filter engages.
    /// Strictly-less-than cutoff: a tree of exactly this many files is
    /// still sent through the simplifier.
    pub const SMART_FILTER_THRESHOLD: usize = 800;
}

/// File tool constants
pub mod tools {
    /// Files at or below this size are returned whole by ReadFile/ReadFiles.
    /// One byte more and the caller is pointed at the line-ranged reader.
    pub const MAX_WHOLE_FILE_BYTES: u64 = 100 * 1024;

    /// Per-line truncation for the line-ranged reader (characters)
    pub const MAX_LINE_CHARS: usize = 2_000;

    /// Upper bound on auto-invoked tool rounds in a single prompt
    pub const MAX_TOOL_ROUNDS: usize = 24;
}

/// Dependency analyzer constants
pub mod analyzer {
    /// Maximum DFS depth for file dependency trees
    pub const MAX_FILE_DEPTH: usize = 10;

    /// Maximum DFS depth for function call trees
    pub const MAX_FUNCTION_DEPTH: usize = 10;
}

/// HTTP/LLM transport constants
pub mod network {
    /// Per-call ceiling for chat completions (seconds). Streaming
    /// completions run inside this window, so it is effectively
    /// "no timeout" at the transport.
    pub const LLM_TIMEOUT_SECS: u64 = 16_000;

    /// Maximum redirects followed by the LLM client
    pub const MAX_REDIRECTS: usize = 5;

    /// Keep-alive pool size per host
    pub const POOL_MAX_IDLE_PER_HOST: usize = 32;
}

/// Max-tokens lookup by model name. Unknown models use the fallback.
pub mod model_tokens {
    pub const FALLBACK: u32 = 8_192;

    /// (substring of model id, max tokens per call)
    pub const TABLE: &[(&str, u32)] = &[
        ("gpt-4o", 16_384),
        ("gpt-4-turbo", 4_096),
        ("gpt-4", 8_192),
        ("gpt-3.5-turbo-16k", 16_384),
        ("gpt-3.5", 4_096),
        ("o1", 32_768),
        ("claude", 8_192),
        ("deepseek", 8_192),
    ];

    pub fn max_tokens_for(model: &str) -> u32 {
        let lower = model.to_lowercase();
        TABLE
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, tokens)| *tokens)
            .unwrap_or(FALLBACK)
    }
}
