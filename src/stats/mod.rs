//! Rule-driven aggregation over the retained request records.
//!
//! A rule filters records on one field, groups the survivors by another,
//! and aggregates a weight field per group: `sum` adds the numeric weight,
//! `tally` counts distinct weight values. Rules are plain data and can be
//! supplied externally as JSON; the built-in set ranks Frontier production
//! traffic by query popularity and per-client volume.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// How the weight field is folded per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Add the numeric weight field.
    Sum,
    /// Count distinct weight-field values.
    Tally,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Sum => f.write_str("sum"),
            Action::Tally => f.write_str("tally"),
        }
    }
}

/// One aggregation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRule {
    /// Field the filter tests.
    pub filter_field: String,
    /// Value (string form) the filter requires.
    pub filter_value: String,
    /// Field whose values become the groups.
    pub group_by: String,
    /// Field folded per group.
    pub weight: String,
    pub action: Action,
}

impl StatsRule {
    /// Human-readable label used as the report heading.
    pub fn label(&self) -> String {
        format!(
            "{}={}: {} of {} by {}",
            self.filter_field, self.filter_value, self.action, self.weight, self.group_by
        )
    }
}

/// Aggregated totals for one rule.
#[derive(Debug, Clone)]
pub struct StatReport {
    pub label: String,
    totals: HashMap<String, i64>,
}

impl StatReport {
    /// Top `n` groups, largest total first; ties break on the group name
    /// so the ranking is deterministic.
    pub fn top(&self, n: usize) -> Vec<(&str, i64)> {
        let mut ranked: Vec<(&str, i64)> = self
            .totals
            .iter()
            .map(|(group, total)| (group.as_str(), *total))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Evaluates a fixed rule set against a snapshot of records.
#[derive(Debug, Clone)]
pub struct RecordStatistics {
    rules: Vec<StatsRule>,
}

impl Default for RecordStatistics {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RecordStatistics {
    pub fn new(rules: Vec<StatsRule>) -> Self {
        Self { rules }
    }

    /// Parses a JSON array of rules.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn rules(&self) -> &[StatsRule] {
        &self.rules
    }

    /// Runs every rule over `records`, one report per rule. Records missing
    /// a referenced field are skipped for that rule.
    pub fn aggregate<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<StatReport> {
        let records: Vec<&Record> = records.into_iter().collect();

        self.rules
            .iter()
            .map(|rule| {
                let mut totals: HashMap<String, i64> = HashMap::new();
                let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

                for record in &records {
                    let Some(filter_value) = record.field(&rule.filter_field) else {
                        continue;
                    };
                    if !filter_value.matches(&rule.filter_value) {
                        continue;
                    }
                    let Some(group) = record.field(&rule.group_by) else {
                        continue;
                    };
                    let group = group.to_string();
                    let Some(weight) = record.field(&rule.weight) else {
                        continue;
                    };

                    match rule.action {
                        Action::Sum => {
                            let Some(value) = weight.as_int() else {
                                continue;
                            };
                            *totals.entry(group).or_insert(0) += value;
                        }
                        Action::Tally => {
                            if seen
                                .entry(group.clone())
                                .or_default()
                                .insert(weight.to_string())
                            {
                                *totals.entry(group).or_insert(0) += 1;
                            }
                        }
                    }
                }

                StatReport {
                    label: rule.label(),
                    totals,
                }
            })
            .collect()
    }
}

/// The built-in rule set: query popularity and per-client volume on the
/// production servlet, per-client volume on the small-files servlet.
pub fn default_rules() -> Vec<StatsRule> {
    vec![
        StatsRule {
            filter_field: "servlet".to_string(),
            filter_value: "FrontierProd".to_string(),
            group_by: "query".to_string(),
            weight: "who".to_string(),
            action: Action::Tally,
        },
        StatsRule {
            filter_field: "servlet".to_string(),
            filter_value: "FrontierProd".to_string(),
            group_by: "who".to_string(),
            weight: "size".to_string(),
            action: Action::Sum,
        },
        StatsRule {
            filter_field: "servlet".to_string(),
            filter_value: "smallfiles".to_string(),
            group_by: "who".to_string(),
            weight: "size".to_string(),
            action: Action::Sum,
        },
    ]
}
