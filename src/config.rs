use anyhow::{Context, Result};
use project_indexer_core::chunk::ChunkSettings;
use project_indexer_core::context::{AnalysisSettings, DEFAULT_SEED_DIRS, DEFAULT_SEED_FILES};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/pidx.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn settings(&self) -> ChunkSettings {
        ChunkSettings {
            max_tokens: self.max_tokens,
            overlap_tokens: self.overlap_tokens,
        }
    }
}

fn default_max_tokens() -> usize {
    6000
}
fn default_overlap() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_files_per_iteration")]
    pub max_files_per_iteration: usize,
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_seed_files")]
    pub seed_files: Vec<String>,
    #[serde(default = "default_seed_dirs")]
    pub seed_dirs: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_iterations: default_max_iterations(),
            max_files_per_iteration: default_max_files_per_iteration(),
            max_file_chars: default_max_file_chars(),
            seed_files: default_seed_files(),
            seed_dirs: default_seed_dirs(),
        }
    }
}

impl AnalysisConfig {
    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            confidence_threshold: self.confidence_threshold,
            max_iterations: self.max_iterations,
            max_files_per_iteration: self.max_files_per_iteration,
            max_file_chars: self.max_file_chars,
            seed_files: self.seed_files.clone(),
            seed_dirs: self.seed_dirs.clone(),
        }
    }
}

fn default_confidence_threshold() -> u8 {
    90
}
fn default_max_iterations() -> u32 {
    10
}
fn default_max_files_per_iteration() -> usize {
    20
}
fn default_max_file_chars() -> usize {
    10_000
}
fn default_seed_files() -> Vec<String> {
    DEFAULT_SEED_FILES.iter().map(|s| s.to_string()).collect()
}
fn default_seed_dirs() -> Vec<String> {
    DEFAULT_SEED_DIRS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            max_file_size_mb: default_max_file_size_mb(),
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            follow_symlinks: false,
        }
    }
}

impl IndexingConfig {
    pub fn max_file_bytes(&self) -> u64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as u64
    }
}

fn default_max_concurrent_files() -> usize {
    5
}
fn default_max_file_size_mb() -> f64 {
    1.0
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.py", "**/*.js", "**/*.jsx", "**/*.ts", "**/*.tsx", "**/*.rs", "**/*.go",
        "**/*.java", "**/*.kt", "**/*.rb", "**/*.php", "**/*.c", "**/*.h", "**/*.cpp",
        "**/*.hpp", "**/*.cs", "**/*.swift", "**/*.scala", "**/*.sh", "**/*.sql",
        "**/*.md", "**/*.rst", "**/*.txt", "**/*.toml", "**/*.yaml", "**/*.yml",
        "**/*.json", "**/*.cfg", "**/*.ini", "**/Dockerfile", "**/Makefile",
        "**/Pipfile", "**/README", "**/.env.example",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_globs() -> Vec<String> {
    [
        "**/.git/**",
        "**/target/**",
        "**/node_modules/**",
        "**/__pycache__/**",
        "**/.venv/**",
        "**/venv/**",
        "**/dist/**",
        "**/build/**",
        "**/.idea/**",
        "**/.vscode/**",
        "**/*.min.js",
        "**/package-lock.json",
        "**/yarn.lock",
        "**/Cargo.lock",
        "**/poetry.lock",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_tpm")]
    pub tokens_per_minute: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            tokens_per_minute: default_tpm(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_rpm() -> u32 {
    3500
}
fn default_tpm() -> u64 {
    1_000_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }

    // Validate analysis
    if config.analysis.confidence_threshold > 100 {
        anyhow::bail!("analysis.confidence_threshold must be in [0, 100]");
    }
    if config.analysis.max_iterations == 0 {
        anyhow::bail!("analysis.max_iterations must be >= 1");
    }
    if config.analysis.max_files_per_iteration == 0 {
        anyhow::bail!("analysis.max_files_per_iteration must be >= 1");
    }

    // Validate indexing
    if config.indexing.max_concurrent_files == 0 {
        anyhow::bail!("indexing.max_concurrent_files must be >= 1");
    }
    if config.indexing.max_file_size_mb <= 0.0 {
        anyhow::bail!("indexing.max_file_size_mb must be > 0");
    }

    // Validate rate limits
    if config.rate_limit.requests_per_minute == 0 || config.rate_limit.tokens_per_minute == 0 {
        anyhow::bail!("rate_limit budgets must be > 0");
    }
    if config.rate_limit.max_delay_ms < config.rate_limit.base_delay_ms {
        anyhow::bail!("rate_limit.max_delay_ms must be >= rate_limit.base_delay_ms");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate providers
    for (section, provider) in [
        ("llm", config.llm.provider.as_str()),
        ("embedding", config.embedding.provider.as_str()),
    ] {
        match provider {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be >= 1");
        }
    }

    Ok(())
}
