use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Ok,
    Failed,
}

/// One line of a batch `manifest.jsonl`: what happened to a single input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestRecord {
    pub stage: String,
    pub input: String,
    pub output: Option<String>,
    pub status: ManifestStatus,
    #[serde(default)]
    pub items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestRecord {
    pub fn ok(stage: &str, input: &Path, output: &Path, items: usize) -> Self {
        Self {
            stage: stage.to_string(),
            input: input.display().to_string(),
            output: Some(output.display().to_string()),
            status: ManifestStatus::Ok,
            items,
            error: None,
        }
    }

    pub fn failed(stage: &str, input: &Path, error: impl ToString) -> Self {
        Self {
            stage: stage.to_string(),
            input: input.display().to_string(),
            output: None,
            status: ManifestStatus::Failed,
            items: 0,
            error: Some(error.to_string()),
        }
    }
}

pub struct JsonlWriter<W> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_writer_roundtrips_records() {
        let record = ManifestRecord::ok(
            "encode",
            Path::new("/tmp/main.ast.json"),
            Path::new("/tmp/out/main.seq.json"),
            42,
        );
        let writer = Vec::new();
        let mut writer = JsonlWriter::new(writer);
        writer.write_record(&record).unwrap();
        let buf = writer.into_inner();
        assert!(buf.ends_with(b"\n"));
        let parsed: ManifestRecord = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, record);
        assert!(!String::from_utf8(buf).unwrap().contains("\"error\""));
    }

    #[test]
    fn failed_record_keeps_reason() {
        let record = ManifestRecord::failed("decode", Path::new("broken.seq.json"), "dangling");
        assert_eq!(record.status, ManifestStatus::Failed);
        assert_eq!(record.output, None);
        assert_eq!(record.error.as_deref(), Some("dangling"));
    }

    #[test]
    fn read_manifest_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let mut writer = JsonlWriter::new(File::create(&path).unwrap());
        writer
            .write_record(&ManifestRecord::failed("hash", Path::new("a.txt"), "io"))
            .unwrap();
        drop(writer);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n").unwrap();
        let records = read_manifest(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, "hash");
    }
}
