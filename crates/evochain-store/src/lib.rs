use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use evochain_core::Dataset;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const VERSION_PREFIX: &str = "sha256:";

/// Identity and size of a loaded dataset file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetInfo {
    pub source_path: PathBuf,
    pub version: String,
    pub chain_count: usize,
    pub record_count: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub info: DatasetInfo,
}

impl LoadedDataset {
    /// Check the content version against a pinned value.
    ///
    /// # Errors
    /// Returns an error when `expected` is not a `sha256:<hex>` value or does not match.
    pub fn verify_version(&self, expected: &str) -> Result<()> {
        let expected = expected.trim();
        if !expected.starts_with(VERSION_PREFIX) || expected.len() <= VERSION_PREFIX.len() {
            return Err(anyhow!("dataset version MUST look like sha256:<hex>, got {expected}"));
        }
        if expected != self.info.version {
            return Err(anyhow!(
                "dataset version mismatch for {}: expected {}, got {}",
                self.info.source_path.display(),
                expected,
                self.info.version
            ));
        }
        Ok(())
    }
}

/// Load and validate the precomputed dataset: a JSON array of chains.
///
/// # Errors
/// Returns an error when the file cannot be read, is not a JSON array of chains, or breaks a
/// dataset invariant.
pub fn load_dataset(path: &Path) -> Result<LoadedDataset> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read dataset file {}", path.display()))?;
    let dataset: Dataset = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse dataset JSON {}", path.display()))?;
    dataset
        .validate()
        .with_context(|| format!("dataset {} failed validation", path.display()))?;

    let info = DatasetInfo {
        source_path: path.to_path_buf(),
        version: content_version(&bytes),
        chain_count: dataset.len(),
        record_count: dataset.record_count(),
    };
    Ok(LoadedDataset { dataset, info })
}

/// Content version of raw dataset bytes, `sha256:<hex>`.
#[must_use]
pub fn content_version(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{VERSION_PREFIX}{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_fixture(body: &str) -> tempfile::NamedTempFile {
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(file) => file,
            Err(err) => panic!("failed to create temp dataset file: {err}"),
        };
        if let Err(err) = file.write_all(body.as_bytes()) {
            panic!("failed to write temp dataset file: {err}");
        }
        file
    }

    const FIXTURE: &str = r#"[
        [{"id": 1, "generationId": 1, "types": ["grass", "poison"], "name": "bulbasaur"},
         {"id": 2, "generationId": 1, "types": ["grass", "poison"], "name": "ivysaur"}],
        [{"id": 4, "generationId": 1, "types": ["fire"], "name": "charmander"}]
    ]"#;

    // Test IDs: TST-001
    #[test]
    fn load_dataset_reports_counts_and_content_version() -> Result<()> {
        let file = write_fixture(FIXTURE);
        let loaded = load_dataset(file.path())?;

        assert_eq!(loaded.info.chain_count, 2);
        assert_eq!(loaded.info.record_count, 3);
        assert_eq!(loaded.info.version, content_version(FIXTURE.as_bytes()));
        assert!(loaded.info.version.starts_with("sha256:"));
        assert_eq!(loaded.info.version.len(), "sha256:".len() + 64);
        Ok(())
    }

    // Test IDs: TST-002
    #[test]
    fn verify_version_accepts_match_and_rejects_mismatch() -> Result<()> {
        let file = write_fixture(FIXTURE);
        let loaded = load_dataset(file.path())?;

        loaded.verify_version(&loaded.info.version)?;

        let mismatch = loaded.verify_version(&content_version(b"[]"));
        assert!(mismatch.is_err_and(|err| err.to_string().contains("dataset version mismatch")));

        let malformed = loaded.verify_version("md5:abc");
        assert!(malformed.is_err_and(|err| err.to_string().contains("sha256:<hex>")));
        Ok(())
    }

    // Test IDs: TST-003
    #[test]
    fn load_dataset_rejects_invalid_chains() {
        let file = write_fixture("[[]]");
        let err = match load_dataset(file.path()) {
            Ok(_) => panic!("expected empty chain to fail validation"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("MUST contain at least one record"));
    }

    // Test IDs: TST-004
    #[test]
    fn load_dataset_rejects_non_array_json_and_missing_file() {
        let file = write_fixture(r#"{"chains": []}"#);
        let err = match load_dataset(file.path()) {
            Ok(_) => panic!("expected object payload to be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("failed to parse dataset JSON"));

        let missing = std::env::temp_dir().join("evochain-missing-dataset-does-not-exist.json");
        let err = match load_dataset(&missing) {
            Ok(_) => panic!("expected missing file to be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("failed to read dataset file"));
    }
}
