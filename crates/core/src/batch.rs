use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use astseq_index::{JsonlWriter, ManifestRecord, ManifestStatus};
use glob::Pattern;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{AstSeqError, Result};
use crate::hasher::TokenHasher;
use crate::sequence::NodeSequence;
use crate::tree::TreeNode;
use crate::vectorize::{format_vector, FeatureVocabulary, FrozenFeatures};
use crate::vocab::Vocabulary;

pub const MANIFEST_FILE: &str = "manifest.jsonl";
pub const FEATURES_FILE: &str = "features.json";

/// Suffixes stripped from input names before the stage's output suffix is added.
const KNOWN_SUFFIXES: &[&str] = &[".ast.json", ".seq.json", ".json"];

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Comma separated glob patterns matched against paths relative to the input root.
    pub pattern: String,
    /// Worker threads; zero lets rayon decide.
    pub threads: usize,
    /// Output suffix replacing the stage default, e.g. `.ids` for hashing.
    pub out_ext: Option<String>,
    pub write_manifest: bool,
}

impl BatchOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            threads: 0,
            out_ext: None,
            write_manifest: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    fn from_records(records: &[ManifestRecord]) -> Self {
        let mut report = BatchReport::default();
        for record in records {
            match record.status {
                ManifestStatus::Ok => report.processed += 1,
                ManifestStatus::Failed => report.failed.push((
                    PathBuf::from(&record.input),
                    record.error.clone().unwrap_or_default(),
                )),
            }
        }
        report
    }
}

/// AST JSON → `.seq.json`.
pub fn encode_dir(input: &Path, output: &Path, opts: &BatchOptions) -> Result<BatchReport> {
    let encoder = Encoder::new();
    run_stage("encode", input, output, ".seq.json", opts, |src, dst| {
        let tree = TreeNode::load_json(src)?;
        let sequence = encoder.encode(&tree)?;
        sequence.save_json(dst)?;
        Ok(sequence.len())
    })
}

/// `.seq.json` → AST JSON, for inspecting what a sequence decodes to.
pub fn decode_dir(input: &Path, output: &Path, opts: &BatchOptions) -> Result<BatchReport> {
    let decoder = Decoder::new();
    run_stage("decode", input, output, ".ast.json", opts, |src, dst| {
        let sequence = NodeSequence::load_json(src)?;
        let tree = decoder.decode(&sequence)?;
        tree.save_json(dst)?;
        Ok(tree.node_count())
    })
}

/// Text → `.hash`. Workers share the read-only vocabulary.
pub fn hash_dir(
    input: &Path,
    output: &Path,
    vocab: &Vocabulary,
    opts: &BatchOptions,
) -> Result<BatchReport> {
    let hasher = TokenHasher::new(vocab)?;
    run_stage("hash", input, output, ".hash", opts, |src, dst| {
        hasher.hash_file(src, dst)
    })
}

/// `.hash` → `.unhash`.
pub fn unhash_dir(
    input: &Path,
    output: &Path,
    vocab: &Vocabulary,
    opts: &BatchOptions,
) -> Result<BatchReport> {
    let hasher = TokenHasher::new(vocab)?;
    run_stage("unhash", input, output, ".unhash", opts, |src, dst| {
        hasher.unhash_file(src, dst)
    })
}

/// Builds a vocabulary from every matching file under `input`, visited in
/// sorted path order so ids are reproducible.
pub fn build_vocab_dir(
    input: &Path,
    pattern: &str,
    existing: Option<Vocabulary>,
) -> Result<Vocabulary> {
    let files = discover_files(input, pattern)?;
    let vocab = Vocabulary::build_from_corpus(&files, existing)?;
    tracing::info!(files = files.len(), tokens = vocab.len(), "vocabulary built");
    Ok(vocab)
}

/// Two passes over `.seq.json` files: observe every file on this thread, then
/// emit fixed-width `.vec` files in parallel against the frozen columns.
/// The grown vocabulary is written to `features.json` and returned.
pub fn vectorize_dir(
    input: &Path,
    output: &Path,
    existing: Option<FeatureVocabulary>,
    opts: &BatchOptions,
) -> Result<(BatchReport, FeatureVocabulary)> {
    let mut features = existing.unwrap_or_default();
    for file in discover_files(input, &opts.pattern)? {
        match NodeSequence::load_json(&file) {
            Ok(sequence) => {
                features.observe(sequence.records());
            }
            Err(err) => {
                tracing::debug!(path = %file.display(), error = %err, "observe pass skipped file")
            }
        }
    }
    let frozen: FrozenFeatures = features.freeze();
    tracing::info!(columns = frozen.width(), "feature columns frozen");
    let report = run_stage("vectorize", input, output, ".vec", opts, |src, dst| {
        let sequence = NodeSequence::load_json(src)?;
        let lines: Vec<String> = frozen
            .emit(sequence.records())
            .iter()
            .map(|vector| format_vector(vector))
            .collect();
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(dst, body)?;
        Ok(lines.len())
    })?;
    features.save_json(output.join(FEATURES_FILE))?;
    Ok((report, features))
}

/// Runs `job` over every discovered file on a rayon pool. Failing files are
/// logged and recorded, never fatal; only setup and manifest I/O abort.
fn run_stage<F>(
    stage: &str,
    input: &Path,
    output: &Path,
    out_suffix: &str,
    opts: &BatchOptions,
    job: F,
) -> Result<BatchReport>
where
    F: Fn(&Path, &Path) -> Result<usize> + Sync,
{
    let out_suffix = opts.out_ext.as_deref().unwrap_or(out_suffix);
    let files = discover_files(input, &opts.pattern)?;
    if files.is_empty() {
        tracing::warn!(
            stage,
            pattern = %opts.pattern,
            root = %input.display(),
            "no files matched"
        );
    }
    fs::create_dir_all(output)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads)
        .build()
        .map_err(|e| AstSeqError::Other(e.to_string()))?;

    let records: Vec<ManifestRecord> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                let dst = output_path(input, file, output, out_suffix);
                match job(file, &dst) {
                    Ok(items) => {
                        tracing::debug!(stage, path = %file.display(), items, "processed");
                        ManifestRecord::ok(stage, file, &dst, items)
                    }
                    Err(err) => {
                        tracing::warn!(stage, path = %file.display(), error = %err, "skipping file");
                        ManifestRecord::failed(stage, file, err)
                    }
                }
            })
            .collect()
    });

    if opts.write_manifest {
        let file = File::create(output.join(MANIFEST_FILE))?;
        let mut writer = JsonlWriter::new(BufWriter::new(file));
        for record in &records {
            writer.write_record(record)?;
        }
        writer.into_inner().flush()?;
    }
    let report = BatchReport::from_records(&records);
    tracing::info!(
        stage,
        processed = report.processed,
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}

pub fn discover_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(AstSeqError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input path {} does not exist", root.display()),
        )));
    }
    let patterns = build_patterns(pattern)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(entry.file_name()));
        let rel_norm = rel.to_string_lossy().replace('\\', "/").to_lowercase();
        if !patterns.is_empty() && !patterns.iter().any(|pat| pat.matches(&rel_norm)) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn build_patterns(pattern: &str) -> Result<Vec<Pattern>> {
    let mut patterns = Vec::new();
    for raw in pattern.split(',') {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = if trimmed.contains('/') {
            trimmed.to_lowercase()
        } else {
            format!("**/{}", trimmed.to_lowercase())
        };
        patterns.push(Pattern::new(&normalized).map_err(|e| AstSeqError::Other(e.msg.to_string()))?);
    }
    Ok(patterns)
}

/// Mirrors `file`'s position under `root` into `output`, swapping its suffix.
fn output_path(root: &Path, file: &Path, output: &Path, out_suffix: &str) -> PathBuf {
    let rel = file
        .strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new(file.file_name().unwrap_or_default()));
    let name = rel
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = KNOWN_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or_else(|| {
            Path::new(&name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    output.join(parent).join(format!("{stem}{out_suffix}"))
}
