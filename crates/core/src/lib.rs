mod batch;
mod decoder;
mod encoder;
mod error;
mod hasher;
mod sequence;
mod stats;
mod tree;
mod vectorize;
mod vocab;

pub use batch::{
    build_vocab_dir, decode_dir, discover_files, encode_dir, hash_dir, unhash_dir, vectorize_dir,
    BatchOptions, BatchReport, FEATURES_FILE, MANIFEST_FILE,
};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{AstSeqError, Result};
pub use hasher::{TokenHasher, TokenStream};
pub use sequence::{NodeSequence, SequenceRecord};
pub use stats::SequenceStats;
pub use tree::{Literal, Scalar, TreeNode, COORD_KEY, EMPTY_SLOTS_KEY, NODE_TYPE_KEY};
pub use vectorize::{
    format_vector, record_features, vectorize, FeatureKey, FeatureVocabulary, FrozenFeatures,
    NODE_TYPE_FEATURE,
};
pub use vocab::{InverseVocabulary, Vocabulary};
