use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstSeqError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("malformed tree: {0}")]
    MalformedTree(String),
    #[error("record {parent} references missing index {index}")]
    DanglingReference { parent: usize, index: usize },
    #[error("malformed sequence: {0}")]
    MalformedSequence(String),
    #[error("vocabulary is not a bijection: {0}")]
    AmbiguousInverse(String),
    #[error("unknown token id: {0}")]
    UnknownId(u32),
    #[error("vocabulary file corrupt at line {line}: {reason}")]
    VocabularyFileCorrupt { line: usize, reason: String },
    #[error("invalid token stream: {0}")]
    InvalidTokenStream(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AstSeqError>;

impl From<anyhow::Error> for AstSeqError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
