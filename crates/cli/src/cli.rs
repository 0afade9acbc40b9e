use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "astseq", version, about = "AST linearization and token hashing toolkit")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Comma separated glob patterns, e.g. `*.ast.json,sub/*.json`.
    #[arg(long)]
    pub pattern: Option<String>,
    #[arg(long)]
    pub threads: Option<usize>,
    /// Output suffix replacing the stage default, e.g. `.ids`.
    #[arg(long = "out-ext")]
    pub out_ext: Option<String>,
    #[arg(long = "no-manifest", action = ArgAction::SetTrue)]
    pub no_manifest: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Linearize one AST JSON file into a `.seq.json` sequence.
    Encode {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 0)]
        base: usize,
    },
    /// Rebuild the AST JSON for one sequence file.
    Decode {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    EncodeDir {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    DecodeDir {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Build a vocabulary file from text files or directories.
    Vocab {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        /// Extend this vocabulary instead of starting empty.
        #[arg(long)]
        existing: Option<PathBuf>,
        #[arg(long)]
        pattern: Option<String>,
    },
    Hash {
        input: PathBuf,
        #[arg(long)]
        vocab: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    Unhash {
        input: PathBuf,
        #[arg(long)]
        vocab: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    HashDir {
        input: PathBuf,
        #[arg(long)]
        vocab: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    UnhashDir {
        input: PathBuf,
        #[arg(long)]
        vocab: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Vectorize one sequence file. Grows `--features` in place when given.
    Vectorize {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        features: Option<PathBuf>,
        /// Emit while growing: early rows are narrower than later ones.
        #[arg(long = "single-pass", action = ArgAction::SetTrue)]
        single_pass: bool,
    },
    VectorizeDir {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Start from previously saved feature columns.
        #[arg(long)]
        features: Option<PathBuf>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    Stats {
        input: PathBuf,
    },
}
