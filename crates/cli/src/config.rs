use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use astseq_core::BatchOptions;
use serde::Deserialize;

use crate::cli::BatchArgs;

pub const DEFAULT_CONFIG: &str = "astseq.toml";

pub const DEFAULT_ENCODE_PATTERN: &str = "*.ast.json";
pub const DEFAULT_DECODE_PATTERN: &str = "*.seq.json";
pub const DEFAULT_TEXT_PATTERN: &str = "*";
pub const DEFAULT_HASH_PATTERN: &str = "*.hash";
pub const DEFAULT_VECTORIZE_PATTERN: &str = "*.seq.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Encode,
    Decode,
    Vocab,
    Hash,
    Unhash,
    Vectorize,
}

impl Stage {
    fn default_pattern(self) -> &'static str {
        match self {
            Stage::Encode => DEFAULT_ENCODE_PATTERN,
            Stage::Decode => DEFAULT_DECODE_PATTERN,
            Stage::Vocab | Stage::Hash => DEFAULT_TEXT_PATTERN,
            Stage::Unhash => DEFAULT_HASH_PATTERN,
            Stage::Vectorize => DEFAULT_VECTORIZE_PATTERN,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub batch: BatchDefaults,
    #[serde(default)]
    pub encode: StageDefaults,
    #[serde(default)]
    pub decode: StageDefaults,
    #[serde(default)]
    pub vocab: StageDefaults,
    #[serde(default)]
    pub hash: StageDefaults,
    #[serde(default)]
    pub unhash: StageDefaults,
    #[serde(default)]
    pub vectorize: StageDefaults,
    /// Vocabulary file used by `hash`/`unhash` when `--vocab` is not given.
    #[serde(default)]
    pub vocab_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchDefaults {
    pub threads: Option<usize>,
    pub manifest: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageDefaults {
    pub pattern: Option<String>,
    pub out_ext: Option<String>,
}

impl AppConfig {
    fn stage(&self, stage: Stage) -> &StageDefaults {
        match stage {
            Stage::Encode => &self.encode,
            Stage::Decode => &self.decode,
            Stage::Vocab => &self.vocab,
            Stage::Hash => &self.hash,
            Stage::Unhash => &self.unhash,
            Stage::Vectorize => &self.vectorize,
        }
    }

    /// Flags win over the config file, which wins over built-in defaults.
    pub fn pattern(&self, stage: Stage, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.stage(stage).pattern.clone())
            .unwrap_or_else(|| stage.default_pattern().to_string())
    }

    pub fn batch_options(&self, stage: Stage, args: &BatchArgs) -> BatchOptions {
        let mut opts = BatchOptions::new(self.pattern(stage, args.pattern.as_deref()));
        opts.threads = args.threads.or(self.batch.threads).unwrap_or(0);
        opts.out_ext = args
            .out_ext
            .clone()
            .or_else(|| self.stage(stage).out_ext.clone());
        opts.write_manifest = !args.no_manifest && self.batch.manifest.unwrap_or(true);
        opts
    }

    pub fn vocab_path(&self, flag: Option<PathBuf>) -> Result<PathBuf> {
        flag.or_else(|| self.vocab_file.clone())
            .ok_or_else(|| anyhow!("no vocabulary given: pass --vocab or set vocab_file in the config"))
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))
}
