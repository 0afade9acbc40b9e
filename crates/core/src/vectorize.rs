use std::fs::{self, File};
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sequence::SequenceRecord;
use crate::tree::{Literal, Scalar};

/// Pseudo attribute under which a record's `node_type` becomes a feature.
pub const NODE_TYPE_FEATURE: &str = "_nodetype";

/// One (attribute, value) pair; each distinct pair owns one vector column.
/// Elements of a list attribute carry their `position`, so they never share a
/// column with a plain attribute of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub value: Scalar,
}

impl FeatureKey {
    pub fn new(key: impl Into<String>, value: Scalar) -> Self {
        Self {
            key: key.into(),
            position: None,
            value,
        }
    }

    pub fn element(key: impl Into<String>, position: usize, value: Scalar) -> Self {
        Self {
            key: key.into(),
            position: Some(position),
            value,
        }
    }
}

/// Flattens a record into feature pairs, node type first. List attributes
/// expand into one positioned pair per element.
pub fn record_features(record: &SequenceRecord) -> Vec<FeatureKey> {
    let mut features = Vec::with_capacity(record.scalars.len() + 1);
    features.push(FeatureKey::new(
        NODE_TYPE_FEATURE,
        Scalar::Str(record.node_type.clone()),
    ));
    for (key, literal) in &record.scalars {
        match literal {
            Literal::One(value) => features.push(FeatureKey::new(key.clone(), value.clone())),
            Literal::Many(values) => {
                for (position, value) in values.iter().enumerate() {
                    features.push(FeatureKey::element(key.clone(), position, value.clone()));
                }
            }
        }
    }
    features
}

/// Growing pair → column mapping. Columns are assigned in first-seen order and
/// never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVocabulary {
    columns: IndexSet<FeatureKey>,
}

impl FeatureVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_of(&self, feature: &FeatureKey) -> Option<usize> {
        self.columns.get_index_of(feature)
    }

    pub fn feature_at(&self, column: usize) -> Option<&FeatureKey> {
        self.columns.get_index(column)
    }

    /// Growth phase: registers every pair seen in `records`.
    /// Returns how many new columns were added.
    pub fn observe(&mut self, records: &[SequenceRecord]) -> usize {
        let before = self.columns.len();
        for record in records {
            self.columns.extend(record_features(record));
        }
        self.columns.len() - before
    }

    /// Snapshot used for the emit phase; later growth does not affect it.
    pub fn freeze(&self) -> FrozenFeatures {
        FrozenFeatures {
            columns: self.columns.clone(),
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Immutable feature columns; every emitted vector has width [`FrozenFeatures::width`].
#[derive(Debug, Clone)]
pub struct FrozenFeatures {
    columns: IndexSet<FeatureKey>,
}

impl FrozenFeatures {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn emit_record(&self, record: &SequenceRecord) -> Vec<u32> {
        let mut vector = vec![0u32; self.columns.len()];
        let mut unseen = 0usize;
        for feature in record_features(record) {
            match self.columns.get_index_of(&feature) {
                Some(column) => vector[column] += 1,
                None => unseen += 1,
            }
        }
        if unseen > 0 {
            tracing::debug!(index = record.index, unseen, "features outside frozen vocabulary");
        }
        vector
    }

    pub fn emit(&self, records: &[SequenceRecord]) -> Vec<Vec<u32>> {
        records.iter().map(|record| self.emit_record(record)).collect()
    }
}

/// Single-pass mode: grows `features` while emitting, so each vector is as wide
/// as the vocabulary was when its record was reached. Use
/// [`FeatureVocabulary::observe`] + [`FeatureVocabulary::freeze`] for
/// fixed-width output.
pub fn vectorize(records: &[SequenceRecord], features: &mut FeatureVocabulary) -> Vec<Vec<u32>> {
    records
        .iter()
        .map(|record| {
            let columns: Vec<usize> = record_features(record)
                .into_iter()
                .map(|feature| features.columns.insert_full(feature).0)
                .collect();
            let mut vector = vec![0u32; features.len()];
            for column in columns {
                vector[column] += 1;
            }
            vector
        })
        .collect()
}

pub fn format_vector(vector: &[u32]) -> String {
    vector
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
