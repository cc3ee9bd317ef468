use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::model::{FactRecord, load_fact_records};
use crate::validation::ChunkBatch;

#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("session directory not found: {}", root.display());
        }
        if !root.join("facts").is_dir() {
            bail!("session has no facts directory: {}", root.display());
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn facts_path(&self, document_name: &str, chunk_id: u32) -> PathBuf {
        self.root
            .join("facts")
            .join(format!("{document_name}_chunk_{chunk_id:04}.json"))
    }

    pub fn chunk_text_path(&self, document_name: &str, chunk_id: u32) -> PathBuf {
        self.root
            .join("chunks")
            .join(format!("{document_name}_chunk_{chunk_id:04}.txt"))
    }

    pub fn chunk_ids(&self, document_name: &str) -> Result<Vec<u32>> {
        let facts_dir = self.root.join("facts");
        let prefix = format!("{document_name}_chunk_");
        let mut chunk_ids = Vec::new();

        for entry in fs::read_dir(&facts_dir)
            .with_context(|| format!("failed to list {}", facts_dir.display()))?
        {
            let entry = entry.with_context(|| format!("failed to list {}", facts_dir.display()))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            let chunk_id = file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u32>().ok());
            match chunk_id {
                Some(chunk_id) => chunk_ids.push(chunk_id),
                None => debug!(file = file_name, "skipping unrelated facts file"),
            }
        }

        chunk_ids.sort_unstable();
        Ok(chunk_ids)
    }

    pub fn load_chunk_facts(&self, document_name: &str, chunk_id: u32) -> Result<Vec<FactRecord>> {
        load_fact_records(&self.facts_path(document_name, chunk_id))
    }

    pub fn load_chunk_text(&self, document_name: &str, chunk_id: u32) -> Result<String> {
        let path = self.chunk_text_path(document_name, chunk_id);
        fs::read_to_string(&path)
            .with_context(|| format!("failed to read chunk text: {}", path.display()))
    }

    pub fn load_chunk_batches(&self, document_name: &str) -> Result<Vec<ChunkBatch>> {
        let chunk_ids = self.chunk_ids(document_name)?;
        if chunk_ids.is_empty() {
            bail!(
                "no fact files for document '{document_name}' in {}",
                self.root.join("facts").display()
            );
        }

        let batches = chunk_ids
            .into_iter()
            .map(|chunk_id| {
                Ok(ChunkBatch {
                    chunk_id,
                    text: self.load_chunk_text(document_name, chunk_id)?,
                    records: self.load_chunk_facts(document_name, chunk_id)?,
                })
            })
            .collect::<Result<Vec<ChunkBatch>>>()?;

        info!(
            session = %self.root.display(),
            document = document_name,
            chunks = batches.len(),
            "loaded session chunks"
        );
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_chunk(root: &Path, document: &str, chunk_id: u32, facts: &str, text: &str) {
        fs::write(
            root.join("facts")
                .join(format!("{document}_chunk_{chunk_id:04}.json")),
            facts,
        )
        .expect("write facts");
        fs::write(
            root.join("chunks")
                .join(format!("{document}_chunk_{chunk_id:04}.txt")),
            text,
        )
        .expect("write chunk text");
    }

    fn session_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("facts")).expect("facts dir");
        fs::create_dir(dir.path().join("chunks")).expect("chunks dir");
        dir
    }

    #[test]
    fn chunk_ids_are_sorted_and_scoped_to_the_document() {
        let dir = session_root();
        write_chunk(dir.path(), "report", 12, "[]", "");
        write_chunk(dir.path(), "report", 2, "[]", "");
        write_chunk(dir.path(), "other", 1, "[]", "");
        fs::write(dir.path().join("facts").join("report_chunk_notes.json"), "[]")
            .expect("write stray file");

        let session = SessionDir::open(dir.path()).expect("open session");
        assert_eq!(session.chunk_ids("report").expect("chunk ids"), vec![2, 12]);
        assert_eq!(session.chunk_ids("other").expect("chunk ids"), vec![1]);
        assert!(session.chunk_ids("missing").expect("chunk ids").is_empty());
    }

    #[test]
    fn load_chunk_batches_pairs_facts_with_chunk_text() {
        let dir = session_root();
        write_chunk(
            dir.path(),
            "report",
            1,
            r#"[{"claim": "MFA is required", "source_location": "Lines 1-1",
                 "evidence_quote": "MFA is required", "confidence": 0.9}]"#,
            "MFA is required for all administrators.\n",
        );

        let session = SessionDir::open(dir.path()).expect("open session");
        let batches = session.load_chunk_batches("report").expect("load batches");

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].chunk_id, 1);
        assert!(batches[0].text.starts_with("MFA is required"));
        assert_eq!(batches[0].records.len(), 1);
        assert!(batches[0].records[0].is_ok());
    }

    #[test]
    fn missing_chunk_text_is_an_error() {
        let dir = session_root();
        fs::write(dir.path().join("facts").join("report_chunk_0003.json"), "[]")
            .expect("write facts");

        let session = SessionDir::open(dir.path()).expect("open session");
        assert!(session.load_chunk_batches("report").is_err());
    }

    #[test]
    fn open_requires_a_facts_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(SessionDir::open(dir.path()).is_err());
        assert!(SessionDir::open(&dir.path().join("absent")).is_err());
    }
}
