//! Static reference data: ingredients and beer styles.
//!
//! Reference data is read-mostly and owned by the server. Each dataset is
//! cached as one [`StaticDataSnapshot`] tagged with the server version it
//! was downloaded at; a refresh is needed when the server reports a
//! different version. None of this touches the operation queue.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StaticDataset {
    Ingredients,
    BeerStyles,
}

impl StaticDataset {
    /// Every dataset.
    pub const ALL: [StaticDataset; 2] = [StaticDataset::Ingredients, StaticDataset::BeerStyles];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StaticDataset::Ingredients => "ingredients",
            StaticDataset::BeerStyles => "beerStyles",
        }
    }
}

impl fmt::Display for StaticDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached copy of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticDataSnapshot {
    /// Which dataset this is
    pub dataset: StaticDataset,
    /// Server version the data was fetched at
    pub version: String,
    /// The items
    pub data: Vec<serde_json::Value>,
    /// When the data was downloaded
    pub cached_at: Timestamp,
    /// When the version was last compared with the server
    pub last_checked: Timestamp,
}

impl StaticDataSnapshot {
    /// A freshly downloaded snapshot.
    pub fn new(
        dataset: StaticDataset,
        version: impl Into<String>,
        data: Vec<serde_json::Value>,
        now: Timestamp,
    ) -> Self {
        Self {
            dataset,
            version: version.into(),
            data,
            cached_at: now,
            last_checked: now,
        }
    }

    /// Whether the server has moved to another version.
    pub fn is_stale(&self, server_version: &str) -> bool {
        self.version != server_version
    }

    /// Whether the version should be compared with the server again.
    pub fn is_check_due(&self, now: Timestamp, interval_ms: u64) -> bool {
        now.saturating_sub(self.last_checked) >= interval_ms
    }

    /// Number of cached items.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the snapshot holds no items.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Versions reported by the server's lightweight version query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticVersions {
    pub ingredients: String,
    pub beer_styles: String,
}

impl StaticVersions {
    /// Version of one dataset.
    pub fn version_for(&self, dataset: StaticDataset) -> &str {
        match dataset {
            StaticDataset::Ingredients => &self.ingredients,
            StaticDataset::BeerStyles => &self.beer_styles,
        }
    }
}

/// Which datasets need a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub ingredients: bool,
    pub beer_styles: bool,
}

impl UpdateCheck {
    /// Whether a dataset needs a refresh given its cached snapshot.
    pub fn needs_refresh(cached: Option<&StaticDataSnapshot>, server_version: &str) -> bool {
        cached.map_or(true, |snapshot| snapshot.is_stale(server_version))
    }

    /// Record the verdict for one dataset.
    pub fn set(&mut self, dataset: StaticDataset, stale: bool) {
        match dataset {
            StaticDataset::Ingredients => self.ingredients = stale,
            StaticDataset::BeerStyles => self.beer_styles = stale,
        }
    }

    /// Datasets to refresh.
    pub fn stale_datasets(&self) -> Vec<StaticDataset> {
        StaticDataset::ALL
            .into_iter()
            .filter(|d| match d {
                StaticDataset::Ingredients => self.ingredients,
                StaticDataset::BeerStyles => self.beer_styles,
            })
            .collect()
    }

    /// Check if any dataset needs a refresh.
    pub fn any(&self) -> bool {
        self.ingredients || self.beer_styles
    }
}

fn field<'a>(item: &'a serde_json::Value, name: &str) -> &'a str {
    item.get(name)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Filter over cached ingredients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientFilter {
    /// Exact ingredient type (`grain`, `hop`, `yeast`, `other`)
    pub ingredient_type: Option<String>,
    /// Case-insensitive substring of the name
    pub search: Option<String>,
}

impl IngredientFilter {
    pub fn matches(&self, item: &serde_json::Value) -> bool {
        if let Some(kind) = &self.ingredient_type {
            if !field(item, "type").eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        match &self.search {
            Some(term) if !term.trim().is_empty() => contains_ci(field(item, "name"), term.trim()),
            _ => true,
        }
    }

    pub fn apply(&self, items: &[serde_json::Value]) -> Vec<serde_json::Value> {
        items.iter().filter(|i| self.matches(i)).cloned().collect()
    }
}

/// Filter over cached beer styles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeerStyleFilter {
    /// Case-insensitive substring of the name or category
    pub search: Option<String>,
    /// Exact category
    pub category: Option<String>,
}

impl BeerStyleFilter {
    pub fn matches(&self, item: &serde_json::Value) -> bool {
        if let Some(category) = &self.category {
            if !field(item, "category").eq_ignore_ascii_case(category) {
                return false;
            }
        }
        match &self.search {
            Some(term) if !term.trim().is_empty() => {
                let term = term.trim();
                contains_ci(field(item, "name"), term) || contains_ci(field(item, "category"), term)
            }
            _ => true,
        }
    }

    pub fn apply(&self, items: &[serde_json::Value]) -> Vec<serde_json::Value> {
        items.iter().filter(|i| self.matches(i)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ingredients() -> Vec<serde_json::Value> {
        vec![
            json!({"name": "Maris Otter", "type": "grain"}),
            json!({"name": "Citra", "type": "hop"}),
            json!({"name": "Crystal 60", "type": "grain"}),
            json!({"name": "US-05", "type": "yeast"}),
        ]
    }

    #[test]
    fn missing_snapshot_needs_refresh() {
        assert!(UpdateCheck::needs_refresh(None, "v1"));
    }

    #[test]
    fn version_mismatch_needs_refresh() {
        let snapshot = StaticDataSnapshot::new(StaticDataset::Ingredients, "v1", vec![], 1000);
        assert!(!UpdateCheck::needs_refresh(Some(&snapshot), "v1"));
        assert!(UpdateCheck::needs_refresh(Some(&snapshot), "v2"));
    }

    #[test]
    fn check_due_after_interval() {
        let snapshot = StaticDataSnapshot::new(StaticDataset::BeerStyles, "v1", vec![], 1000);
        assert!(!snapshot.is_check_due(1500, 1000));
        assert!(snapshot.is_check_due(2000, 1000));
        // Clock going backwards never triggers a check.
        assert!(!snapshot.is_check_due(10, 1000));
    }

    #[test]
    fn stale_datasets() {
        let mut check = UpdateCheck::default();
        assert!(!check.any());
        check.set(StaticDataset::BeerStyles, true);
        assert_eq!(check.stale_datasets(), vec![StaticDataset::BeerStyles]);
    }

    #[test]
    fn ingredient_filter_by_type_and_search() {
        let filter = IngredientFilter {
            ingredient_type: Some("grain".into()),
            search: Some("crys".into()),
        };
        let found = filter.apply(&ingredients());
        assert_eq!(found, vec![json!({"name": "Crystal 60", "type": "grain"})]);

        assert_eq!(IngredientFilter::default().apply(&ingredients()).len(), 4);
    }

    #[test]
    fn beer_style_search_covers_category() {
        let styles = vec![
            json!({"name": "American IPA", "category": "IPA"}),
            json!({"name": "Dry Stout", "category": "Irish Beer"}),
        ];
        let filter = BeerStyleFilter {
            search: Some("irish".into()),
            category: None,
        };
        assert_eq!(filter.apply(&styles).len(), 1);
    }

    #[test]
    fn versions_wire_format() {
        let versions: StaticVersions =
            serde_json::from_str(r#"{"ingredients": "12", "beer_styles": "3"}"#).unwrap();
        assert_eq!(versions.version_for(StaticDataset::BeerStyles), "3");
    }
}
