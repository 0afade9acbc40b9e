mod cli;
mod config;
mod logging;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use astseq_core::{
    build_vocab_dir, decode_dir, encode_dir, format_vector, hash_dir, unhash_dir, vectorize,
    vectorize_dir, BatchReport, Decoder, Encoder, FeatureVocabulary, NodeSequence, SequenceStats,
    TokenHasher, TreeNode, Vocabulary,
};
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::{load_config, AppConfig, Stage, DEFAULT_CONFIG};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose || logging::env_flag());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let cfg = load_config(&config_path)?;
    tracing::debug!(config = %config_path.display(), "configuration resolved");

    match cli.command {
        Command::Encode { input, out, base } => {
            let tree = TreeNode::load_json(&input)
                .with_context(|| format!("failed to read AST {}", input.display()))?;
            let sequence = Encoder::with_base(base).encode(&tree)?;
            sequence.save_json(&out)?;
            println!("[astseq] encoded {} nodes -> {}", sequence.len(), out.display());
        }
        Command::Decode { input, out } => {
            let sequence = NodeSequence::load_json(&input)
                .with_context(|| format!("failed to read sequence {}", input.display()))?;
            let tree = Decoder::new().decode(&sequence)?;
            tree.save_json(&out)?;
            println!("[astseq] decoded {} nodes -> {}", tree.node_count(), out.display());
        }
        Command::EncodeDir { input, out, batch } => {
            let opts = cfg.batch_options(Stage::Encode, &batch);
            report("encode", &encode_dir(&input, &out, &opts)?);
        }
        Command::DecodeDir { input, out, batch } => {
            let opts = cfg.batch_options(Stage::Decode, &batch);
            report("decode", &decode_dir(&input, &out, &opts)?);
        }
        Command::Vocab {
            inputs,
            out,
            existing,
            pattern,
        } => {
            let existing = existing.map(Vocabulary::load).transpose()?;
            let vocab = build_vocab(&cfg, &inputs, existing, pattern.as_deref())?;
            vocab.save(&out)?;
            println!("[astseq] vocabulary of {} tokens -> {}", vocab.len(), out.display());
        }
        Command::Hash { input, vocab, out } => {
            let vocab = load_vocab(&cfg, vocab)?;
            let lines = TokenHasher::new(&vocab)?.hash_file(&input, &out)?;
            println!("[astseq] hashed {lines} lines -> {}", out.display());
        }
        Command::Unhash { input, vocab, out } => {
            let vocab = load_vocab(&cfg, vocab)?;
            let lines = TokenHasher::new(&vocab)?.unhash_file(&input, &out)?;
            println!("[astseq] unhashed {lines} lines -> {}", out.display());
        }
        Command::HashDir {
            input,
            vocab,
            out,
            batch,
        } => {
            let vocab = load_vocab(&cfg, vocab)?;
            let opts = cfg.batch_options(Stage::Hash, &batch);
            report("hash", &hash_dir(&input, &out, &vocab, &opts)?);
        }
        Command::UnhashDir {
            input,
            vocab,
            out,
            batch,
        } => {
            let vocab = load_vocab(&cfg, vocab)?;
            let opts = cfg.batch_options(Stage::Unhash, &batch);
            report("unhash", &unhash_dir(&input, &out, &vocab, &opts)?);
        }
        Command::Vectorize {
            input,
            out,
            features,
            single_pass,
        } => run_vectorize(&input, &out, features.as_deref(), single_pass)?,
        Command::VectorizeDir {
            input,
            out,
            features,
            batch,
        } => {
            let existing = features.map(FeatureVocabulary::load_json).transpose()?;
            let opts = cfg.batch_options(Stage::Vectorize, &batch);
            let (batch_report, features) = vectorize_dir(&input, &out, existing, &opts)?;
            report("vectorize", &batch_report);
            println!("[astseq] {} feature columns", features.len());
        }
        Command::Stats { input } => {
            let sequence = NodeSequence::load_json(&input)
                .with_context(|| format!("failed to read sequence {}", input.display()))?;
            let stats = SequenceStats::measure(&sequence);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

fn load_vocab(cfg: &AppConfig, flag: Option<PathBuf>) -> Result<Vocabulary> {
    let path = cfg.vocab_path(flag)?;
    Vocabulary::load(&path).with_context(|| format!("failed to load vocabulary {}", path.display()))
}

/// Files are read in the order given; directories contribute their matching
/// files in sorted path order.
fn build_vocab(
    cfg: &AppConfig,
    inputs: &[PathBuf],
    existing: Option<Vocabulary>,
    pattern: Option<&str>,
) -> Result<Vocabulary> {
    let pattern = cfg.pattern(Stage::Vocab, pattern);
    let mut vocab = existing;
    for input in inputs {
        let next = if input.is_dir() {
            build_vocab_dir(input, &pattern, vocab.take())?
        } else if input.is_file() {
            Vocabulary::build_from_corpus(&[input], vocab.take())?
        } else {
            return Err(anyhow!("input path {} does not exist", input.display()));
        };
        vocab = Some(next);
    }
    Ok(vocab.unwrap_or_default())
}

fn run_vectorize(
    input: &Path,
    out: &Path,
    features_path: Option<&Path>,
    single_pass: bool,
) -> Result<()> {
    let sequence = NodeSequence::load_json(input)
        .with_context(|| format!("failed to read sequence {}", input.display()))?;
    let mut features = match features_path {
        Some(path) if path.exists() => FeatureVocabulary::load_json(path)?,
        _ => FeatureVocabulary::new(),
    };
    let vectors = if single_pass {
        vectorize(sequence.records(), &mut features)
    } else {
        features.observe(sequence.records());
        features.freeze().emit(sequence.records())
    };
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let body: String = vectors
        .iter()
        .map(|vector| format_vector(vector) + "\n")
        .collect();
    fs::write(out, body)?;
    if let Some(path) = features_path {
        features.save_json(path)?;
    }
    println!(
        "[astseq] {} vectors ({} columns) -> {}",
        vectors.len(),
        features.len(),
        out.display()
    );
    Ok(())
}

fn report(stage: &str, report: &BatchReport) {
    println!(
        "[astseq::{stage}] processed {} files, {} failed",
        report.processed,
        report.failed.len()
    );
    for (path, reason) in &report.failed {
        eprintln!("[astseq::{stage}] failed {}: {reason}", path.display());
    }
}
