// build.rs - TOML-driven compile-time limit generation
use std::env;
use std::fs;
use std::path::Path;

#[derive(serde::Deserialize)]
struct CompileTimeConfig {
    lexical: LexicalLimits,
    syntax: SyntaxLimits,
    pipeline: PipelineLimits,
    evaluation: EvaluationLimits,
    dispatch: DispatchLimits,
    logging: LoggingLimits,
}

#[derive(serde::Deserialize)]
struct LexicalLimits {
    max_word_length: usize,
    max_token_count: usize,
}

#[derive(serde::Deserialize)]
struct SyntaxLimits {
    max_block_depth: usize,
}

#[derive(serde::Deserialize)]
struct PipelineLimits {
    default_queue_capacity: usize,
}

#[derive(serde::Deserialize)]
struct EvaluationLimits {
    max_matches_per_path: usize,
}

#[derive(serde::Deserialize)]
struct DispatchLimits {
    default_firing_timeout_ms: u64,
    max_worker_threads: usize,
}

#[derive(serde::Deserialize)]
struct LoggingLimits {
    max_log_message_length: usize,
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=HEARTH_BUILD_PROFILE");
    println!("cargo:rerun-if-env-changed=HEARTH_CONFIG_DIR");

    let profile = env::var("HEARTH_BUILD_PROFILE").unwrap_or_else(|_| "development".to_string());
    let config_dir = env::var("HEARTH_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

    // Find workspace root (parent of hearth_dsl directory)
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = Path::new(&manifest_dir)
        .parent()
        .expect("Could not find workspace root (parent directory)");

    let config_path = workspace_root
        .join(&config_dir)
        .join(format!("{}.toml", profile));

    println!("cargo:rerun-if-changed={}", config_path.display());

    if !config_path.exists() {
        panic!(
            "Configuration file not found: {}\nWorkspace root: {}\nLooking for: {}/{}/{}.toml",
            config_path.display(),
            workspace_root.display(),
            workspace_root.display(),
            config_dir,
            profile
        );
    }

    let config_content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", config_path.display(), e));

    let config: CompileTimeConfig = toml::from_str(&config_content)
        .unwrap_or_else(|e| panic!("Invalid TOML in {}: {}", config_path.display(), e));

    validate_limits(&config, &profile);
    generate_constants(&config, &profile);
}

fn validate_limits(config: &CompileTimeConfig, profile: &str) {
    const ABSOLUTE_MAX_TOKENS: usize = 10_000_000;
    const ABSOLUTE_MAX_FIRING_TIMEOUT_MS: u64 = 3_600_000;

    if config.lexical.max_word_length == 0 {
        panic!("LIMITS: max_word_length cannot be zero");
    }

    if config.lexical.max_token_count == 0 || config.lexical.max_token_count > ABSOLUTE_MAX_TOKENS
    {
        panic!("LIMITS: max_token_count must be between 1 and {}", ABSOLUTE_MAX_TOKENS);
    }

    if config.syntax.max_block_depth == 0 {
        panic!("LIMITS: max_block_depth cannot be zero");
    }

    // The token queue must be able to hold at least one token
    if config.pipeline.default_queue_capacity == 0 {
        panic!("LIMITS: default_queue_capacity must be at least 1");
    }

    if config.evaluation.max_matches_per_path == 0 {
        panic!("LIMITS: max_matches_per_path cannot be zero");
    }

    if config.dispatch.default_firing_timeout_ms == 0
        || config.dispatch.default_firing_timeout_ms > ABSOLUTE_MAX_FIRING_TIMEOUT_MS
    {
        panic!("LIMITS: default_firing_timeout_ms out of range");
    }

    if config.dispatch.max_worker_threads == 0 {
        panic!("LIMITS: max_worker_threads cannot be zero");
    }

    if profile == "production" && config.dispatch.default_firing_timeout_ms > 60_000 {
        panic!("PRODUCTION: default_firing_timeout_ms too high for production");
    }
}

fn generate_constants(config: &CompileTimeConfig, profile: &str) {
    let out_dir = env::var("OUT_DIR").unwrap();
    let output_path = Path::new(&out_dir).join("constants.rs");

    let constants_code = format!(
        r#"
// Generated compile-time constants from TOML configuration
// Profile: {}
// DO NOT EDIT - Generated by build.rs

pub mod compile_time {{
    pub mod lexical {{
        pub const MAX_WORD_LENGTH: usize = {};
        pub const MAX_TOKEN_COUNT: usize = {};
    }}

    pub mod syntax {{
        pub const MAX_BLOCK_DEPTH: usize = {};
    }}

    pub mod pipeline {{
        pub const DEFAULT_QUEUE_CAPACITY: usize = {};
    }}

    pub mod evaluation {{
        pub const MAX_MATCHES_PER_PATH: usize = {};
    }}

    pub mod dispatch {{
        pub const DEFAULT_FIRING_TIMEOUT_MS: u64 = {};
        pub const MAX_WORKER_THREADS: usize = {};
    }}

    pub mod logging {{
        pub const MAX_LOG_MESSAGE_LENGTH: usize = {};
    }}
}}
"#,
        profile,
        config.lexical.max_word_length,
        config.lexical.max_token_count,
        config.syntax.max_block_depth,
        config.pipeline.default_queue_capacity,
        config.evaluation.max_matches_per_path,
        config.dispatch.default_firing_timeout_ms,
        config.dispatch.max_worker_threads,
        config.logging.max_log_message_length,
    );

    fs::write(output_path, constants_code).unwrap();
}
