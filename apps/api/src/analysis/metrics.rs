//! Metric resolution: merges model-supplied scores into the fixed metric catalog.
//!
//! The catalog decides which metrics exist and in what order. The model can only
//! fill in values; unknown keys it returns are ignored and missing ones fall back
//! to the configured default.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Presentation hints passed through untouched to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDisplay {
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub key: String,
    pub label: String,
    /// 0–10
    pub default_value: f64,
    pub display: MetricDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMetric {
    #[serde(flatten)]
    pub config: MetricConfig,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricCatalog {
    entries: Vec<MetricConfig>,
}

impl MetricCatalog {
    /// Rejects empty catalogs, duplicate keys and defaults outside 0–10.
    pub fn new(entries: Vec<MetricConfig>) -> Result<Self> {
        if entries.is_empty() {
            bail!("metric catalog must contain at least one entry");
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.key == entry.key) {
                bail!("duplicate metric key '{}'", entry.key);
            }
            if !(0.0..=10.0).contains(&entry.default_value) {
                bail!(
                    "default for metric '{}' must be within 0-10, got {}",
                    entry.key,
                    entry.default_value
                );
            }
        }
        Ok(Self { entries })
    }

    /// Loads a JSON array of `MetricConfig` from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read metric catalog {}", path.display()))?;
        let entries: Vec<MetricConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid metric catalog {}", path.display()))?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[MetricConfig] {
        &self.entries
    }
}

impl Default for MetricCatalog {
    fn default() -> Self {
        let entry = |key: &str, label: &str, default_value: f64, icon: &str, color: &str| {
            MetricConfig {
                key: key.to_string(),
                label: label.to_string(),
                default_value,
                display: MetricDisplay {
                    icon: icon.to_string(),
                    color: color.to_string(),
                },
            }
        };
        Self {
            entries: vec![
                entry("formatting", "Formatting", 7.0, "layout", "emerald"),
                entry("contentQuality", "Content Quality", 6.0, "file-text", "sky"),
                entry("atsCompatibility", "ATS Compatibility", 6.0, "scan", "violet"),
                entry("keywordUsage", "Keyword Usage", 5.0, "key", "amber"),
                entry("quantifiableResults", "Quantifiable Results", 4.0, "bar-chart", "rose"),
            ],
        }
    }
}

/// One resolved metric per catalog entry, in catalog order.
/// Supplied values are used verbatim: nothing is clamped to 0–10.
pub fn resolve_metrics(
    catalog: &MetricCatalog,
    supplied: Option<&BTreeMap<String, f64>>,
) -> Vec<ResolvedMetric> {
    catalog
        .entries
        .iter()
        .map(|config| {
            let value = supplied
                .and_then(|m| m.get(&config.key))
                .copied()
                .unwrap_or(config.default_value);
            ResolvedMetric {
                config: config.clone(),
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn supplied(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let catalog = MetricCatalog::default();
        let resolved = resolve_metrics(&catalog, Some(&supplied(&[("formatting", 9.0)])));
        for metric in &resolved {
            if metric.config.key == "formatting" {
                assert_eq!(metric.value, 9.0);
            } else {
                assert_eq!(metric.value, metric.config.default_value);
            }
        }
    }

    #[test]
    fn test_no_mapping_yields_all_defaults() {
        let catalog = MetricCatalog::default();
        let resolved = resolve_metrics(&catalog, None);
        assert_eq!(resolved.len(), catalog.entries().len());
        assert!(resolved.iter().all(|m| m.value == m.config.default_value));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let catalog = MetricCatalog::default();
        let resolved = resolve_metrics(&catalog, Some(&supplied(&[("charisma", 10.0)])));
        assert_eq!(resolved.len(), 5);
        assert!(resolved.iter().all(|m| m.config.key != "charisma"));
    }

    #[test]
    fn test_catalog_order_is_preserved() {
        let catalog = MetricCatalog::default();
        let resolved = resolve_metrics(
            &catalog,
            Some(&supplied(&[("quantifiableResults", 1.0), ("formatting", 2.0)])),
        );
        let keys: Vec<_> = resolved.iter().map(|m| m.config.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["formatting", "contentQuality", "atsCompatibility", "keywordUsage", "quantifiableResults"]
        );
    }

    #[test]
    fn test_out_of_range_values_pass_through_unclamped() {
        let catalog = MetricCatalog::default();
        let resolved = resolve_metrics(
            &catalog,
            Some(&supplied(&[("formatting", 42.0), ("keywordUsage", -3.5)])),
        );
        assert_eq!(resolved[0].value, 42.0);
        assert_eq!(resolved[3].value, -3.5);
    }

    #[test]
    fn test_resolved_metric_serializes_flat() {
        let resolved = resolve_metrics(&MetricCatalog::default(), None);
        let value = serde_json::to_value(&resolved[0]).unwrap();
        assert_eq!(value["key"], "formatting");
        assert_eq!(value["defaultValue"], 7.0);
        assert_eq!(value["display"]["icon"], "layout");
        assert_eq!(value["value"], 7.0);
    }

    #[test]
    fn test_catalog_rejects_duplicates_and_bad_defaults() {
        let mut entries = MetricCatalog::default().entries().to_vec();
        entries.push(entries[0].clone());
        assert!(MetricCatalog::new(entries).is_err());

        let mut entries = MetricCatalog::default().entries().to_vec();
        entries[1].default_value = 11.0;
        assert!(MetricCatalog::new(entries).is_err());

        assert!(MetricCatalog::new(vec![]).is_err());
    }

    #[test]
    fn test_catalog_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"key":"clarity","label":"Clarity","defaultValue":3,"display":{{"icon":"eye","color":"teal"}}}}]"#
        )
        .unwrap();
        let catalog = MetricCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.entries().len(), 1);
        assert_eq!(catalog.entries()[0].key, "clarity");
        assert_eq!(catalog.entries()[0].default_value, 3.0);
    }

    #[test]
    fn test_catalog_file_with_bad_json_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(MetricCatalog::from_file(file.path()).is_err());
    }
}
