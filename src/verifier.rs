//! Field-by-field convergence check

use serde::Serialize;

use crate::record::{AuthoredRecord, Field, ObservedRecord};
use crate::transform::RuleSet;

/// Outcome of comparing an expected record against an observed one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Match {
        compared: Vec<Field>,
    },
    Mismatch {
        field: Field,
        /// Value as authored
        authored: String,
        /// Value after the field's rule was applied
        expected: String,
        observed: String,
        /// Fields that matched before the mismatch
        compared: Vec<Field>,
    },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. })
    }
}

/// Compare fields in [`Field::ALL`] order, stopping at the first mismatch
pub fn verify(expected: &AuthoredRecord, observed: &ObservedRecord, rules: &RuleSet) -> MatchResult {
    let mut compared = Vec::with_capacity(Field::ALL.len());
    for field in Field::ALL {
        let authored = expected.value(field);
        let want = rules.apply(field, &authored);
        let got = observed.value(field);
        if want != got {
            tracing::debug!(%field, expected = %want, observed = %got, "Field mismatch");
            return MatchResult::Mismatch {
                field,
                authored,
                expected: want,
                observed: got,
                compared,
            };
        }
        compared.push(field);
    }
    MatchResult::Match { compared }
}
