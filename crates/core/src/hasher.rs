use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{AstSeqError, Result};
use crate::vocab::{InverseVocabulary, Vocabulary};

/// Integer ids referencing a [`Vocabulary`], one stream per input line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenStream(pub Vec<u32>);

impl TokenStream {
    /// Parses a `.hash` line of space-separated ids.
    pub fn parse(line: &str) -> Result<Self> {
        line.split_whitespace()
            .map(|raw| {
                raw.parse::<u32>().map_err(|_| {
                    AstSeqError::InvalidTokenStream(format!("{raw:?} is not a token id"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(TokenStream)
    }

    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, id) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl From<Vec<u32>> for TokenStream {
    fn from(ids: Vec<u32>) -> Self {
        TokenStream(ids)
    }
}

/// Maps whitespace-tokenized text to ids and back through a fixed vocabulary.
///
/// Tokens missing from the vocabulary are dropped from the stream rather than
/// replaced by a placeholder, so a batch never aborts on an unseen operator.
pub struct TokenHasher<'a> {
    vocab: &'a Vocabulary,
    inverse: InverseVocabulary,
}

impl<'a> TokenHasher<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Result<Self> {
        Ok(Self {
            vocab,
            inverse: vocab.invert()?,
        })
    }

    pub fn hash(&self, line: &str) -> TokenStream {
        TokenStream(
            line.split_whitespace()
                .filter_map(|token| self.vocab.id_of(token))
                .collect(),
        )
    }

    pub fn unhash(&self, stream: &TokenStream) -> Result<String> {
        let tokens = stream
            .0
            .iter()
            .map(|&id| self.inverse.token_of(id).ok_or(AstSeqError::UnknownId(id)))
            .collect::<Result<Vec<_>>>()?;
        Ok(tokens.join(" "))
    }

    /// Hashes every line of `text`; the output has one line per input line.
    pub fn hash_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            out.push_str(&self.hash(line).to_string());
            out.push('\n');
        }
        out
    }

    /// Returns the number of lines written.
    pub fn hash_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let reader = BufReader::new(File::open(input)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(self.hash(&line?).to_string());
        }
        write_lines(output, &lines)?;
        Ok(lines.len())
    }

    /// Inverse of [`TokenHasher::hash_file`]; fails on the first bad line.
    pub fn unhash_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let reader = BufReader::new(File::open(input)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let stream = TokenStream::parse(&line?)?;
            lines.push(self.unhash(&stream)?);
        }
        write_lines(output, &lines)?;
        Ok(lines.len())
    }
}

fn write_lines(output: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(output)?);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn operators() -> Vocabulary {
        Vocabulary::build_from_lines(["+ * if"])
    }

    #[test]
    fn known_tokens_hash_in_line_order() {
        let vocab = operators();
        let hasher = TokenHasher::new(&vocab).unwrap();
        let stream = hasher.hash("if + *");
        assert_eq!(stream, TokenStream(vec![2, 0, 1]));
        assert_eq!(hasher.unhash(&stream).unwrap(), "if + *");
    }

    #[test]
    fn unknown_tokens_are_dropped() {
        let vocab = operators();
        let hasher = TokenHasher::new(&vocab).unwrap();
        assert_eq!(hasher.hash("+ foo *").ids(), &[0, 1]);
        assert!(hasher.hash("foo bar").is_empty());
    }

    #[test]
    fn unknown_ids_fail_unhash() {
        let vocab = operators();
        let hasher = TokenHasher::new(&vocab).unwrap();
        let err = hasher.unhash(&TokenStream(vec![0, 9])).unwrap_err();
        assert!(matches!(err, AstSeqError::UnknownId(9)));
    }

    #[test]
    fn token_stream_parsing() {
        assert_eq!(TokenStream::parse(" 2 0  1 ").unwrap().ids(), &[2, 0, 1]);
        assert_eq!(TokenStream::parse("").unwrap(), TokenStream::default());
        assert!(matches!(
            TokenStream::parse("1 x").unwrap_err(),
            AstSeqError::InvalidTokenStream(_)
        ));
        assert_eq!(TokenStream(vec![3, 1]).to_string(), "3 1");
    }

    #[test]
    fn files_keep_one_line_per_input_line() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("prog.nosym");
        fs::write(&input, "if + *\n\n* foo\n").unwrap();
        let vocab = operators();
        let hasher = TokenHasher::new(&vocab).unwrap();

        let hashed = dir.path().join("out/prog.hash");
        assert_eq!(hasher.hash_file(&input, &hashed).unwrap(), 3);
        assert_eq!(fs::read_to_string(&hashed).unwrap(), "2 0 1\n\n1\n");

        let restored = dir.path().join("out/prog.unhash");
        hasher.unhash_file(&hashed, &restored).unwrap();
        assert_eq!(fs::read_to_string(&restored).unwrap(), "if + *\n\n*\n");
        assert_eq!(hasher.hash_text("* +\nif"), "1 0\n2\n");
    }
}
