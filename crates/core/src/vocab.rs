use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{AstSeqError, Result};

/// Token → id mapping. Ids are handed out in first-seen order and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Vocabulary {
    by_token: IndexMap<String, u32>,
    next_id: u32,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an arbitrary mapping without validating it. Use [`Vocabulary::invert`]
    /// to check that it is a bijection onto `[0, len)`.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let by_token: IndexMap<String, u32> = pairs
            .into_iter()
            .map(|(token, id)| (token.into(), id))
            .collect();
        let next_id = by_token.values().max().map(|max| max + 1).unwrap_or(0);
        Self { by_token, next_id }
    }

    /// Scans whitespace-delimited tokens from `paths`, in the order given, and
    /// appends every unseen token. Ids already present in `existing` are kept.
    pub fn build_from_corpus<P: AsRef<Path>>(
        paths: &[P],
        existing: Option<Vocabulary>,
    ) -> Result<Self> {
        let mut vocab = existing.unwrap_or_default();
        for path in paths {
            let reader = BufReader::new(File::open(path.as_ref())?);
            for line in reader.lines() {
                vocab.extend_from_line(&line?);
            }
            tracing::debug!(
                path = %path.as_ref().display(),
                tokens = vocab.len(),
                "scanned corpus file"
            );
        }
        Ok(vocab)
    }

    pub fn build_from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self::new();
        for line in lines {
            vocab.extend_from_line(line.as_ref());
        }
        vocab
    }

    pub fn extend_from_line(&mut self, line: &str) {
        for token in line.split_whitespace() {
            self.insert(token);
        }
    }

    /// Returns the id of `token`, assigning the next free id if it is new.
    pub fn insert(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.by_token.get(token) {
            return id;
        }
        let id = self.next_id;
        self.by_token.insert(token.to_string(), id);
        self.next_id += 1;
        id
    }

    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.by_token.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.by_token.iter().map(|(token, &id)| (token.as_str(), id))
    }

    pub fn invert(&self) -> Result<InverseVocabulary> {
        let len = self.by_token.len();
        let mut by_id: IndexMap<u32, String> = IndexMap::with_capacity(len);
        for (token, &id) in &self.by_token {
            if id as usize >= len {
                return Err(AstSeqError::AmbiguousInverse(format!(
                    "id {id} of {token:?} lies outside [0, {len})"
                )));
            }
            if let Some(previous) = by_id.insert(id, token.clone()) {
                return Err(AstSeqError::AmbiguousInverse(format!(
                    "tokens {previous:?} and {token:?} share id {id}"
                )));
            }
        }
        by_id.sort_keys();
        Ok(InverseVocabulary { by_id })
    }

    /// Parses the one-token-per-line format. Error line numbers are 1-based;
    /// ids are 0-based line positions.
    pub fn parse(text: &str) -> Result<Self> {
        let mut vocab = Self::new();
        if text.is_empty() {
            return Ok(vocab);
        }
        let body = text.strip_suffix('\n').unwrap_or(text);
        for (position, raw) in body.split('\n').enumerate() {
            let token = raw.strip_suffix('\r').unwrap_or(raw);
            if token.chars().any(char::is_whitespace) {
                return Err(AstSeqError::VocabularyFileCorrupt {
                    line: position + 1,
                    reason: format!("token {token:?} contains whitespace"),
                });
            }
            if let Some(first) = vocab.id_of(token) {
                return Err(AstSeqError::VocabularyFileCorrupt {
                    line: position + 1,
                    reason: format!("token {token:?} already defined on line {}", first + 1),
                });
            }
            vocab.insert(token);
        }
        Ok(vocab)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Writes one token per line in id order. Fails if the ids are not a
    /// bijection onto `[0, len)`, since line numbers could not express them.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let inverse = self.invert()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for (_, token) in inverse.iter() {
            writer.write_all(token.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Id → token mapping, the reverse view of a [`Vocabulary`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InverseVocabulary {
    by_id: IndexMap<u32, String>,
}

impl InverseVocabulary {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            by_id: pairs
                .into_iter()
                .map(|(id, token)| (id, token.into()))
                .collect(),
        }
    }

    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.by_id.iter().map(|(&id, token)| (id, token.as_str()))
    }

    pub fn invert(&self) -> Result<Vocabulary> {
        let mut by_token: IndexMap<String, u32> = IndexMap::with_capacity(self.by_id.len());
        let mut ordered: Vec<(u32, &String)> = self.by_id.iter().map(|(&id, t)| (id, t)).collect();
        ordered.sort_by_key(|(id, _)| *id);
        for (id, token) in ordered {
            if let Some(previous) = by_token.insert(token.clone(), id) {
                return Err(AstSeqError::AmbiguousInverse(format!(
                    "token {token:?} is mapped from ids {previous} and {id}"
                )));
            }
        }
        let next_id = by_token.values().max().map(|max| max + 1).unwrap_or(0);
        Ok(Vocabulary { by_token, next_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ids_follow_first_seen_order() {
        let vocab = Vocabulary::build_from_lines(["if ( x ) {", "\treturn x ;\n", "}"]);
        let tokens: Vec<&str> = vocab.iter().map(|(token, _)| token).collect();
        assert_eq!(tokens, vec!["if", "(", "x", ")", "{", "return", ";", "}"]);
        assert_eq!(vocab.id_of("return"), Some(5));
        assert_eq!(vocab.len(), 8);
    }

    #[test]
    fn existing_ids_are_preserved() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("train.txt");
        fs::write(&corpus, "b c\nd a\n").unwrap();
        let existing = Vocabulary::build_from_lines(["a b"]);
        let vocab = Vocabulary::build_from_corpus(&[&corpus], Some(existing)).unwrap();
        assert_eq!(vocab.id_of("a"), Some(0));
        assert_eq!(vocab.id_of("b"), Some(1));
        assert_eq!(vocab.id_of("c"), Some(2));
        assert_eq!(vocab.id_of("d"), Some(3));
    }

    #[test]
    fn blank_lines_are_tokens() {
        let vocab = Vocabulary::parse("+\n\n*\n").unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id_of(""), Some(1));
        assert_eq!(vocab.id_of("*"), Some(2));
        assert!(Vocabulary::parse("").unwrap().is_empty());
        assert_eq!(Vocabulary::parse("\n").unwrap().id_of(""), Some(0));
    }

    #[test]
    fn corrupt_files_are_rejected() {
        let err = Vocabulary::parse("+\n*\n+\n").unwrap_err();
        assert!(matches!(err, AstSeqError::VocabularyFileCorrupt { line: 3, .. }));
        let err = Vocabulary::parse("a b\n").unwrap_err();
        assert!(matches!(err, AstSeqError::VocabularyFileCorrupt { line: 1, .. }));
        assert_eq!(Vocabulary::parse("a\r\nb\r\n").unwrap().id_of("b"), Some(1));
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/vocab.txt");
        let mut vocab = Vocabulary::build_from_lines(["int main ( void )"]);
        vocab.insert("");
        vocab.save(&path).unwrap();
        assert_eq!(Vocabulary::load(&path).unwrap(), vocab);
    }

    #[test]
    fn inversion_detects_non_bijections() {
        let shared = Vocabulary::from_pairs([("a", 0), ("b", 0)]);
        assert!(matches!(shared.invert(), Err(AstSeqError::AmbiguousInverse(_))));
        let gap = Vocabulary::from_pairs([("a", 0), ("b", 5)]);
        assert!(matches!(gap.invert(), Err(AstSeqError::AmbiguousInverse(_))));
        assert!(gap.save(std::env::temp_dir().join("never-written.txt")).is_err());

        let inverse = InverseVocabulary::from_pairs([(0, "x"), (1, "x")]);
        assert!(matches!(inverse.invert(), Err(AstSeqError::AmbiguousInverse(_))));
    }

    #[test]
    fn double_inversion_is_identity() {
        let vocab = Vocabulary::build_from_lines(["+ * if", "if else +"]);
        let inverse = vocab.invert().unwrap();
        assert_eq!(inverse.token_of(2), Some("if"));
        assert_eq!(inverse.invert().unwrap(), vocab);
    }
}
