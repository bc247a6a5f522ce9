use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use evochain_core::{Catalog, Chain, ChainFilter, Dataset, PageSize};
use evochain_store::{content_version, load_dataset, DatasetInfo, LoadedDataset};
use serde::{Deserialize, Serialize};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Raw query parameters of a page request.
///
/// Every field is kept as text so a malformed value degrades to "absent" instead of failing
/// the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageQuery {
    #[serde(rename = "generationId", default)]
    pub generation_id: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl PageQuery {
    #[must_use]
    pub fn new(filter: &ChainFilter, page: u32) -> Self {
        Self {
            generation_id: filter.generation_id().map(|value| value.to_string()),
            type_name: filter.type_name().map(str::to_string),
            page: Some(page.to_string()),
        }
    }

    /// Build from decoded `key=value` pairs. The first occurrence of each known key wins;
    /// repeats and unknown keys are ignored.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "generationId" => &mut query.generation_id,
                "type" => &mut query.type_name,
                "page" => &mut query.page,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        query
    }

    /// Filter described by the parameters. Non-numeric, negative and zero generations are
    /// treated as absent.
    #[must_use]
    pub fn filter(&self) -> ChainFilter {
        let generation_id = self
            .generation_id
            .as_deref()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(|value| u32::try_from(value).ok());
        ChainFilter::new(generation_id, self.type_name.clone())
    }

    /// Requested page index; absent or non-numeric means page 0. Out-of-range integers
    /// saturate so they still land past the end of the data.
    #[must_use]
    pub fn page_index(&self) -> i64 {
        let Some(raw) = self.page.as_deref().map(str::trim) else {
            return 0;
        };
        if let Ok(index) = raw.parse::<i64>() {
            return index;
        }

        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return 0;
        }
        if raw.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSummary {
    pub version: String,
    pub source_path: PathBuf,
    pub chain_count: usize,
    pub record_count: usize,
    pub page_size: PageSize,
}

/// Read-only query facade over the dataset.
///
/// The dataset is loaded once and shared behind an [`Arc`]; clones are cheap and every clone
/// answers from the same immutable data.
#[derive(Debug, Clone)]
pub struct EvolutionApi {
    dataset: Arc<Dataset>,
    catalog: Arc<Catalog>,
    info: Arc<DatasetInfo>,
    page_size: PageSize,
}

impl EvolutionApi {
    #[must_use]
    pub fn new(loaded: LoadedDataset, page_size: PageSize) -> Self {
        let catalog = loaded.dataset.catalog();
        Self {
            dataset: Arc::new(loaded.dataset),
            catalog: Arc::new(catalog),
            info: Arc::new(loaded.info),
            page_size,
        }
    }

    /// Load the dataset file, optionally pinning its content version.
    ///
    /// # Errors
    /// Returns an error when the file cannot be loaded or its version does not match.
    pub fn open(path: &Path, page_size: PageSize, expected_version: Option<&str>) -> Result<Self> {
        let loaded = load_dataset(path)?;
        if let Some(expected) = expected_version {
            loaded.verify_version(expected)?;
        }
        tracing::info!(
            path = %path.display(),
            version = %loaded.info.version,
            chains = loaded.info.chain_count,
            %page_size,
            "dataset loaded"
        );
        Ok(Self::new(loaded, page_size))
    }

    /// Wrap an in-memory dataset. The version is derived from its JSON encoding.
    ///
    /// # Errors
    /// Returns an error when the dataset fails validation or cannot be encoded.
    pub fn from_dataset(dataset: Dataset, page_size: PageSize) -> Result<Self> {
        dataset.validate().context("in-memory dataset failed validation")?;
        let bytes = serde_json::to_vec(&dataset).context("failed to encode in-memory dataset")?;
        let info = DatasetInfo {
            source_path: PathBuf::from("<memory>"),
            version: content_version(&bytes),
            chain_count: dataset.len(),
            record_count: dataset.record_count(),
        };
        Ok(Self::new(LoadedDataset { dataset, info }, page_size))
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn dataset_info(&self) -> &DatasetInfo {
        &self.info
    }

    #[must_use]
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            version: self.info.version.clone(),
            source_path: self.info.source_path.clone(),
            chain_count: self.info.chain_count,
            record_count: self.info.record_count,
            page_size: self.page_size,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// One page of chains for `filter`. Never fails: indices outside the data yield `[]`.
    #[must_use]
    pub fn get_page(&self, filter: &ChainFilter, page_index: i64) -> Vec<Chain> {
        self.dataset.page(filter, page_index, self.page_size).into_iter().cloned().collect()
    }

    #[must_use]
    pub fn query_page(&self, query: &PageQuery) -> Vec<Chain> {
        let filter = query.filter();
        let page_index = query.page_index();
        let chains = self.get_page(&filter, page_index);
        tracing::debug!(%filter, page_index, returned = chains.len(), "page query");
        chains
    }
}
