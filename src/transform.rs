//! Backend normalization rules
//!
//! The platform rewrites some authored values before they are observable:
//! a bare estimation gains a unit, an unset milestone resolves to the
//! project default. A [`RuleSet`] states those rewrites explicitly as data,
//! versioned alongside the scenario that depends on them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::record::{AuthoredRecord, Field};

/// Name of the built-in tracker rule set
pub const TRACKER_V1: &str = "tracker-v1";

/// A pure rewrite of one expected field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationRule {
    Identity,
    /// Append `unit` to a bare number; values that already carry a unit pass
    UnitSuffix { unit: String },
    /// Replace `sentinel` with `resolved`
    DefaultSentinel { sentinel: String, resolved: String },
    /// Exact-match value table; unmapped values pass
    Lookup { table: BTreeMap<String, String> },
}

impl TransformationRule {
    pub fn apply(&self, value: &str) -> String {
        match self {
            TransformationRule::Identity => value.to_string(),
            TransformationRule::UnitSuffix { unit } => {
                let trimmed = value.trim();
                if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok() {
                    format!("{}{}", trimmed, unit)
                } else {
                    value.to_string()
                }
            }
            TransformationRule::DefaultSentinel { sentinel, resolved } => {
                if value == sentinel {
                    resolved.clone()
                } else {
                    value.to_string()
                }
            }
            TransformationRule::Lookup { table } => {
                table.get(value).cloned().unwrap_or_else(|| value.to_string())
            }
        }
    }
}

/// Named, versioned field→rule mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub rules: BTreeMap<Field, TransformationRule>,
}

impl RuleSet {
    /// Rule set with no rewrites
    pub fn identity() -> Self {
        Self {
            name: "identity".to_string(),
            version: 1,
            rules: BTreeMap::new(),
        }
    }

    /// Tracker normalization: estimations are stored in hours, and an issue
    /// created without a milestone lands in the project's default milestone
    pub fn tracker_v1() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            Field::Estimation,
            TransformationRule::UnitSuffix { unit: "h".into() },
        );
        rules.insert(
            Field::Milestone,
            TransformationRule::DefaultSentinel {
                sentinel: "No Milestone".into(),
                resolved: "Milestone".into(),
            },
        );
        Self {
            name: TRACKER_V1.to_string(),
            version: 1,
            rules,
        }
    }

    /// Look up a built-in preset
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            TRACKER_V1 => Ok(Self::tracker_v1()),
            "identity" => Ok(Self::identity()),
            other => Err(Error::Config(format!(
                "Unknown rule preset '{}'. Available: '{}', 'identity'",
                other, TRACKER_V1
            ))),
        }
    }

    /// Rule for a field, identity when none is registered
    pub fn rule(&self, field: Field) -> &TransformationRule {
        self.rules.get(&field).unwrap_or(&TransformationRule::Identity)
    }

    pub fn apply(&self, field: Field, value: &str) -> String {
        self.rule(field).apply(value)
    }

    /// The record as the backend is expected to present it
    pub fn transform(&self, record: &AuthoredRecord) -> AuthoredRecord {
        let mut out = record.clone();
        for (field, rule) in &self.rules {
            out.set_value(*field, rule.apply(&record.value(*field)));
        }
        out
    }

    /// `name@vN`, used in reports
    pub fn label(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::new_issue;

    #[test]
    fn test_estimation_gains_hours() {
        let rules = RuleSet::tracker_v1();
        assert_eq!(rules.apply(Field::Estimation, "2"), "2h");
        assert_eq!(rules.apply(Field::Estimation, "0.5"), "0.5h");
        assert_eq!(rules.apply(Field::Estimation, "2h"), "2h");
        assert_eq!(rules.apply(Field::Estimation, ""), "");
    }

    #[test]
    fn test_no_milestone_resolves_to_default() {
        let rules = RuleSet::tracker_v1();
        assert_eq!(rules.apply(Field::Milestone, "No Milestone"), "Milestone");
        assert_eq!(rules.apply(Field::Milestone, "Sprint 4"), "Sprint 4");
    }

    #[test]
    fn test_unregistered_field_is_identity() {
        let rules = RuleSet::tracker_v1();
        assert_eq!(rules.rule(Field::Title), &TransformationRule::Identity);
        assert_eq!(rules.apply(Field::Priority, "Urgent"), "Urgent");
    }

    #[test]
    fn test_lookup_passes_unmapped_values() {
        let rule = TransformationRule::Lookup {
            table: [("today".to_string(), "2026-10-16".to_string())]
                .into_iter()
                .collect(),
        };
        assert_eq!(rule.apply("today"), "2026-10-16");
        assert_eq!(rule.apply("tomorrow"), "tomorrow");
    }

    #[test]
    fn test_transform_record() {
        let expected = RuleSet::tracker_v1().transform(&new_issue("t"));
        assert_eq!(expected.estimation, "2h");
        assert_eq!(expected.milestone, "Milestone");
        assert_eq!(expected.title, new_issue("t").title);
    }

    #[test]
    fn test_rule_set_from_yaml() {
        let yaml = r#"
name: custom
version: 3
rules:
  estimation: { kind: unit_suffix, unit: d }
  milestone: { kind: default_sentinel, sentinel: "No Milestone", resolved: "Backlog M" }
"#;
        let rules: RuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.label(), "custom@v3");
        assert_eq!(rules.apply(Field::Estimation, "4"), "4d");
        assert_eq!(rules.apply(Field::Milestone, "No Milestone"), "Backlog M");
    }

    #[test]
    fn test_unknown_preset() {
        assert!(RuleSet::preset("tracker-v9").is_err());
        assert_eq!(RuleSet::preset("tracker-v1").unwrap(), RuleSet::tracker_v1());
    }
}
