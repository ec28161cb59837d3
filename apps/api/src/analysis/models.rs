use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::analysis::checklist::ChecklistItem;
use crate::analysis::metrics::ResolvedMetric;

/// Structured feedback extracted from the model reply.
///
/// Scores are taken as given: nothing here clamps them to 0–10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(deserialize_with = "deserialize_score")]
    pub overall_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub summary: String,
    /// Partial: the model may omit any metric. Entries that are not numbers are dropped.
    #[serde(default, deserialize_with = "deserialize_metric_map")]
    pub performance_metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro_tips: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Everything one successful run produces, handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub page_count: usize,
    pub analysis: AnalysisResult,
    pub checklist: Vec<ChecklistItem>,
    pub metrics: Vec<ResolvedMetric>,
}

/// Numbers, or strings that read as numbers. Anything else is not a score.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    numeric(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("overallScore is not numeric: {value}")))
}

fn deserialize_metric_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Object(map)) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .iter()
        .filter_map(|(key, v)| numeric(v).map(|n| (key.clone(), n)))
        .collect())
}
