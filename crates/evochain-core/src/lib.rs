use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Page size used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: PageSize = match NonZeroUsize::new(25) {
    Some(size) => PageSize(size),
    None => panic!("default page size must be non-zero"),
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One member of an evolution chain.
///
/// Only `id`, `generationId` and `types` take part in filtering. Every other field of the
/// dataset entry (name, artwork, ...) is kept in `extra` and serialized back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Record {
    pub id: RecordId,
    #[serde(rename = "generationId")]
    pub generation_id: u32,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.iter().any(|candidate| candidate == type_name)
    }
}

/// Ordered group of related records, filtered and paged as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Chain(pub Vec<Record>);

impl Chain {
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenated member ids, used by consumers to key rendered rows.
    #[must_use]
    pub fn render_key(&self) -> String {
        self.0.iter().map(|record| record.id.to_string()).collect()
    }
}

/// Filter over chains. Zero generations and empty type names mean "no constraint" and are
/// dropped on construction, so two filters that select the same chains compare equal.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq, Hash)]
pub struct ChainFilter {
    #[serde(rename = "generationId", skip_serializing_if = "Option::is_none")]
    generation_id: Option<u32>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
}

impl ChainFilter {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(generation_id: Option<u32>, type_name: Option<String>) -> Self {
        Self {
            generation_id: generation_id.filter(|value| *value != 0),
            type_name: type_name.filter(|value| !value.is_empty()),
        }
    }

    #[must_use]
    pub fn with_generation(self, generation_id: u32) -> Self {
        Self::new(Some(generation_id), self.type_name)
    }

    #[must_use]
    pub fn with_type(self, type_name: impl Into<String>) -> Self {
        Self::new(self.generation_id, Some(type_name.into()))
    }

    #[must_use]
    pub fn generation_id(&self) -> Option<u32> {
        self.generation_id
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.generation_id.is_none() && self.type_name.is_none()
    }

    /// A chain matches when some member satisfies each active predicate. The two predicates
    /// may be satisfied by different members.
    #[must_use]
    pub fn matches(&self, chain: &Chain) -> bool {
        let generation_ok = self.generation_id.map_or(true, |generation_id| {
            chain.records().iter().any(|record| record.generation_id == generation_id)
        });
        let type_ok = self
            .type_name
            .as_deref()
            .map_or(true, |type_name| {
                chain.records().iter().any(|record| record.has_type(type_name))
            });
        generation_ok && type_ok
    }
}

impl Display for ChainFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "generation={};type={}",
            self.generation_id.unwrap_or(0),
            self.type_name.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(try_from = "usize", into = "usize")]
pub struct PageSize(NonZeroUsize);

impl PageSize {
    /// # Errors
    /// Returns [`CatalogError::Validation`] when `size` is zero.
    pub fn new(size: usize) -> Result<Self, CatalogError> {
        NonZeroUsize::new(size)
            .map(Self)
            .ok_or_else(|| CatalogError::Validation("page size MUST be >= 1".to_string()))
    }

    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// A full page is the only signal that more data may follow.
    #[must_use]
    pub fn is_full(self, page_len: usize) -> bool {
        page_len == self.get()
    }

    /// Offset of the first chain on `page_index`, or `None` for negative or overflowing indices.
    #[must_use]
    pub fn start_of(self, page_index: i64) -> Option<usize> {
        usize::try_from(page_index).ok()?.checked_mul(self.get())
    }
}

impl Default for PageSize {
    fn default() -> Self {
        DEFAULT_PAGE_SIZE
    }
}

impl TryFrom<usize> for PageSize {
    type Error = CatalogError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for PageSize {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let size = value.trim().parse::<usize>().map_err(|err| {
            CatalogError::Validation(format!("invalid page size {value:?}: {err}"))
        })?;
        Self::new(size)
    }
}

impl From<PageSize> for usize {
    fn from(value: PageSize) -> Self {
        value.get()
    }
}

impl Display for PageSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinct filter values present in a dataset, for building filter controls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Catalog {
    pub generations: Vec<u32>,
    pub types: Vec<String>,
}

/// The precomputed, read-only list of chains.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Dataset {
    chains: Vec<Chain>,
}

impl Dataset {
    #[must_use]
    pub fn new(chains: Vec<Chain>) -> Self {
        Self { chains }
    }

    /// Build a dataset after checking the invariants every chain must satisfy.
    ///
    /// # Errors
    /// Returns [`CatalogError::Validation`] when a chain is empty, repeats a record id, or a
    /// record carries an empty type tag.
    pub fn validated(chains: Vec<Chain>) -> Result<Self, CatalogError> {
        let dataset = Self::new(chains);
        dataset.validate()?;
        Ok(dataset)
    }

    /// # Errors
    /// See [`Dataset::validated`].
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (index, chain) in self.chains.iter().enumerate() {
            if chain.is_empty() {
                return Err(CatalogError::Validation(format!(
                    "chain {index} MUST contain at least one record"
                )));
            }

            let mut seen = BTreeSet::new();
            for record in chain.records() {
                if !seen.insert(record.id) {
                    return Err(CatalogError::Validation(format!(
                        "chain {index} repeats record id {}",
                        record.id
                    )));
                }
                if record.types.iter().any(|type_name| type_name.trim().is_empty()) {
                    return Err(CatalogError::Validation(format!(
                        "record {} in chain {index} has an empty type tag",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.chains.iter().map(Chain::len).sum()
    }

    /// One fixed-size page of the filtered view, in dataset order.
    ///
    /// Pages are disjoint: page `n` always starts at `page_size * n`. Negative indices and
    /// indices past the end of the filtered view yield an empty page.
    #[must_use]
    pub fn page(&self, filter: &ChainFilter, page_index: i64, page_size: PageSize) -> Vec<&Chain> {
        let Some(start) = page_size.start_of(page_index) else {
            return Vec::new();
        };
        if filter.is_unconstrained() {
            return self.chains.iter().skip(start).take(page_size.get()).collect();
        }
        self.chains
            .iter()
            .filter(|chain| filter.matches(chain))
            .skip(start)
            .take(page_size.get())
            .collect()
    }

    #[must_use]
    pub fn catalog(&self) -> Catalog {
        let mut generations = BTreeSet::new();
        let mut types = BTreeSet::new();
        for record in self.chains.iter().flat_map(Chain::records) {
            generations.insert(record.generation_id);
            for type_name in &record.types {
                types.insert(type_name.clone());
            }
        }
        Catalog {
            generations: generations.into_iter().collect(),
            types: types.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn mk_record(id: u64, generation_id: u32, types: &[&str]) -> Record {
        Record {
            id: RecordId(id),
            generation_id,
            types: types.iter().map(|value| (*value).to_string()).collect(),
            extra: serde_json::Map::new(),
        }
    }

    fn mk_chain(records: Vec<Record>) -> Chain {
        Chain(records)
    }

    fn page_size(size: usize) -> PageSize {
        match PageSize::new(size) {
            Ok(size) => size,
            Err(err) => panic!("invalid fixture page size {size}: {err}"),
        }
    }

    /// Chain `n` has generation `n % 4 + 1` and alternates fire/water.
    fn generated_dataset(chain_count: u64) -> Dataset {
        let chains = (0..chain_count)
            .map(|index| {
                let generation_id = u32::try_from(index % 4).unwrap_or(0) + 1;
                let type_name = if index % 2 == 0 { "fire" } else { "water" };
                mk_chain(vec![
                    mk_record(index * 10 + 1, generation_id, &[type_name]),
                    mk_record(index * 10 + 2, generation_id, &[type_name, "flying"]),
                ])
            })
            .collect();
        Dataset::new(chains)
    }

    fn ids(page: &[&Chain]) -> Vec<u64> {
        page.iter().map(|chain| chain.records()[0].id.0).collect()
    }

    // Test IDs: TPG-001
    #[test]
    fn thirty_chains_split_into_full_short_and_empty_pages() {
        let dataset = generated_dataset(30);
        let filter = ChainFilter::any();
        let size = page_size(25);

        assert_eq!(dataset.page(&filter, 0, size).len(), 25);
        assert_eq!(dataset.page(&filter, 1, size).len(), 5);
        assert!(dataset.page(&filter, 2, size).is_empty());
        assert!(size.is_full(dataset.page(&filter, 0, size).len()));
        assert!(!size.is_full(dataset.page(&filter, 1, size).len()));
    }

    // Test IDs: TPG-002
    #[test]
    fn page_beyond_filtered_length_is_empty_not_error() {
        let dataset = generated_dataset(3);
        let filter = ChainFilter::any();

        assert!(dataset.page(&filter, 1, DEFAULT_PAGE_SIZE).is_empty());
        assert!(dataset.page(&filter, 1_000_000, DEFAULT_PAGE_SIZE).is_empty());
        assert!(dataset.page(&filter, i64::MAX, DEFAULT_PAGE_SIZE).is_empty());
    }

    // Test IDs: TPG-003
    #[test]
    fn negative_page_index_returns_empty_page() {
        let dataset = generated_dataset(10);
        assert!(dataset.page(&ChainFilter::any(), -1, DEFAULT_PAGE_SIZE).is_empty());
        assert!(dataset.page(&ChainFilter::any(), i64::MIN, DEFAULT_PAGE_SIZE).is_empty());
    }

    // Test IDs: TPG-004
    #[test]
    fn generation_filter_matches_when_any_member_matches() {
        let dataset = Dataset::new(vec![
            mk_chain(vec![mk_record(1, 1, &["grass"]), mk_record(2, 1, &["grass"])]),
            mk_chain(vec![mk_record(172, 2, &["electric"]), mk_record(25, 1, &["electric"])]),
            mk_chain(vec![mk_record(252, 3, &["grass"])]),
        ]);

        let gen2 = ChainFilter::any().with_generation(2);
        assert_eq!(ids(&dataset.page(&gen2, 0, DEFAULT_PAGE_SIZE)), vec![172]);

        let gen1 = ChainFilter::any().with_generation(1);
        assert_eq!(ids(&dataset.page(&gen1, 0, DEFAULT_PAGE_SIZE)), vec![1, 172]);
    }

    // Test IDs: TPG-005
    #[test]
    fn type_and_generation_filters_combine_with_and() {
        let dataset = Dataset::new(vec![
            mk_chain(vec![mk_record(4, 1, &["fire"]), mk_record(6, 1, &["fire", "flying"])]),
            mk_chain(vec![mk_record(155, 2, &["fire"])]),
            mk_chain(vec![mk_record(7, 1, &["water"])]),
        ]);

        let filter = ChainFilter::any().with_generation(1).with_type("fire");
        assert_eq!(ids(&dataset.page(&filter, 0, DEFAULT_PAGE_SIZE)), vec![4]);

        let flying = ChainFilter::any().with_type("flying");
        assert_eq!(ids(&dataset.page(&flying, 0, DEFAULT_PAGE_SIZE)), vec![4]);
    }

    // Test IDs: TPG-006
    #[test]
    fn filter_with_no_matches_yields_empty_first_page() {
        let dataset = generated_dataset(12);
        let filter = ChainFilter::any().with_generation(9);
        assert!(dataset.page(&filter, 0, DEFAULT_PAGE_SIZE).is_empty());
        assert!(dataset.page(&filter, 1, DEFAULT_PAGE_SIZE).is_empty());
    }

    // Test IDs: TPG-007
    #[test]
    fn zero_generation_and_empty_type_are_unconstrained() {
        let normalized = ChainFilter::new(Some(0), Some(String::new()));
        assert_eq!(normalized, ChainFilter::any());
        assert!(normalized.is_unconstrained());
        assert_eq!(ChainFilter::any().with_generation(3).with_generation(0), ChainFilter::any());
        assert_eq!(normalized.to_string(), "generation=0;type=");
    }

    // Test IDs: TPG-008
    #[test]
    fn type_membership_is_exact() {
        let chain = mk_chain(vec![mk_record(1, 1, &["fire"])]);
        assert!(ChainFilter::any().with_type("fire").matches(&chain));
        assert!(!ChainFilter::any().with_type("Fire").matches(&chain));
        assert!(!ChainFilter::any().with_type("fir").matches(&chain));
    }

    // Test IDs: TPG-009
    #[test]
    fn page_size_rejects_zero() {
        let err = match PageSize::new(0) {
            Ok(size) => panic!("expected zero page size to be rejected, got {size}"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("page size MUST be >= 1"));
        assert_eq!(DEFAULT_PAGE_SIZE.get(), 25);
        assert_eq!(PageSize::default(), DEFAULT_PAGE_SIZE);
    }

    // Test IDs: TDS-001
    #[test]
    fn validate_rejects_empty_chain() {
        let chains = vec![mk_chain(vec![mk_record(1, 1, &["grass"])]), mk_chain(vec![])];
        let err = match Dataset::validated(chains) {
            Ok(_) => panic!("expected empty chain to be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("chain 1 MUST contain at least one record"));
    }

    // Test IDs: TDS-002
    #[test]
    fn validate_rejects_duplicate_member_ids_and_blank_types() {
        let duplicate = Dataset::validated(vec![mk_chain(vec![
            mk_record(133, 1, &["normal"]),
            mk_record(133, 1, &["normal"]),
        ])]);
        assert!(matches!(
            duplicate,
            Err(CatalogError::Validation(message)) if message.contains("repeats record id 133")
        ));

        let blank = Dataset::validated(vec![mk_chain(vec![mk_record(1, 1, &[" "])])]);
        assert!(matches!(
            blank,
            Err(CatalogError::Validation(message)) if message.contains("empty type tag")
        ));
    }

    // Test IDs: TDS-003
    #[test]
    fn record_keeps_display_fields_through_json() {
        let raw = serde_json::json!([[
            {"id": 1, "generationId": 1, "types": ["grass", "poison"], "name": "bulbasaur"},
            {"id": 2, "generationId": 1, "types": ["grass", "poison"], "name": "ivysaur"}
        ]]);
        let dataset: Dataset = match serde_json::from_value(raw.clone()) {
            Ok(dataset) => dataset,
            Err(err) => panic!("fixture should deserialize: {err}"),
        };
        assert_eq!(dataset.record_count(), 2);
        assert_eq!(dataset.chains()[0].render_key(), "12");
        assert_eq!(
            dataset.chains()[0].records()[1].extra.get("name").and_then(serde_json::Value::as_str),
            Some("ivysaur")
        );

        let encoded = match serde_json::to_value(&dataset) {
            Ok(value) => value,
            Err(err) => panic!("dataset should serialize: {err}"),
        };
        assert_eq!(encoded, raw);
    }

    // Test IDs: TDS-004
    #[test]
    fn catalog_lists_sorted_distinct_generations_and_types() {
        let dataset = generated_dataset(8);
        let catalog = dataset.catalog();
        assert_eq!(catalog.generations, vec![1, 2, 3, 4]);
        assert_eq!(catalog.types, ["fire", "flying", "water"]);
    }

    fn arb_filter() -> impl Strategy<Value = ChainFilter> {
        (0u32..6, prop_oneof![Just(""), Just("fire"), Just("water"), Just("flying"), Just("ice")])
            .prop_map(|(generation_id, type_name)| {
                ChainFilter::new(Some(generation_id), Some(type_name.to_string()))
            })
    }

    // Test IDs: TPG-010
    proptest! {
        #[test]
        fn property_pages_partition_the_filtered_view(
            chain_count in 0u64..90,
            size in 1usize..30,
            filter in arb_filter(),
            last_page in 0i64..6,
        ) {
            let dataset = generated_dataset(chain_count);
            let size = page_size(size);

            let concatenated = (0..=last_page)
                .flat_map(|index| dataset.page(&filter, index, size))
                .collect::<Vec<_>>();
            let window = usize::try_from(last_page + 1).unwrap_or(usize::MAX) * size.get();
            let expected = dataset
                .chains()
                .iter()
                .filter(|chain| filter.matches(chain))
                .take(window)
                .collect::<Vec<_>>();

            prop_assert_eq!(concatenated, expected);
        }
    }

    // Test IDs: TPG-011
    proptest! {
        #[test]
        fn property_page_query_is_deterministic(
            chain_count in 0u64..60,
            filter in arb_filter(),
            index in -2i64..5,
        ) {
            let dataset = generated_dataset(chain_count);
            let first = dataset.page(&filter, index, DEFAULT_PAGE_SIZE);
            let second = dataset.page(&filter, index, DEFAULT_PAGE_SIZE);
            prop_assert_eq!(first, second);
        }
    }

    // Test IDs: TPG-012
    proptest! {
        #[test]
        fn property_short_page_is_followed_only_by_empty_pages(
            chain_count in 0u64..80,
            size in 1usize..30,
            filter in arb_filter(),
        ) {
            let dataset = generated_dataset(chain_count);
            let size = page_size(size);
            let mut index = 0;
            loop {
                let page = dataset.page(&filter, index, size);
                if !size.is_full(page.len()) {
                    prop_assert!(dataset.page(&filter, index + 1, size).is_empty());
                    break;
                }
                index += 1;
            }
        }
    }

    // Test IDs: TPG-013
    #[test]
    fn page_size_parses_from_text() {
        assert_eq!("  10 ".parse::<PageSize>(), Ok(page_size(10)));
        assert!(matches!("0".parse::<PageSize>(), Err(CatalogError::Validation(_))));
        assert!(matches!("ten".parse::<PageSize>(), Err(CatalogError::Validation(_))));
        assert_eq!(PageSize::default().to_string(), "25");
    }

    // Test IDs: TPG-014
    #[test]
    fn page_borrows_from_dataset_not_from_filter() {
        let dataset = generated_dataset(6);
        let page = {
            let filter = ChainFilter::any().with_type("water");
            dataset.page(&filter, 0, DEFAULT_PAGE_SIZE)
        };
        assert_eq!(ids(&page), vec![11, 31, 51]);

        let unfiltered = dataset.page(&ChainFilter::any(), 1, page_size(4));
        assert_eq!(ids(&unfiltered), vec![41, 51]);
    }
}
