//! Identifier registry for the tracker front end
//!
//! The front end refers to applications, viewlets and strings through
//! symbolic ids such as `tracker:viewlet:IssueList`. Those ids are declared
//! in a base table and extended by a model table; the two are merged once
//! at startup into an immutable lookup.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::common::{Error, Result};

/// Namespace of every tracker id
pub const TRACKER: &str = "tracker";

/// A table of `category.name` keys and explicit values
///
/// An empty value is a placeholder that resolves to `namespace:category:name`.
pub type IdTable<'a> = &'a [(&'a str, &'a str)];

/// Ids declared by the tracker resources package
const TRACKER_BASE: IdTable<'static> = &[
    ("string.Issues", ""),
    ("string.AllIssues", ""),
    ("string.NewIssue", ""),
    ("string.SearchIssue", ""),
    ("component.CreateIssue", ""),
    ("component.EditIssue", ""),
    ("viewlet.IssueList", ""),
    ("viewlet.IssueKanban", ""),
];

/// Ids declared by the tracker model, layered over the base table
const TRACKER_MODEL: IdTable<'static> = &[
    ("string.TrackerApplication", ""),
    ("string.Projects", ""),
    ("string.GotoIssues", ""),
    ("string.SearchIssue", ""),
    ("string.AllProjects", ""),
    ("component.MilestoneSelector", ""),
    ("component.IssueStatistics", ""),
    ("app.Tracker", ""),
    ("viewlet.IssueList", ""),
    ("viewlet.IssueTemplateList", ""),
    ("viewlet.MilestoneList", ""),
    ("viewlet.ComponentList", ""),
    ("viewlet.ProjectList", ""),
    ("ids.BaseProjectType", ""),
    ("completion.IssueQuery", ""),
    ("action.NewRelatedIssue", ""),
    ("action.DeleteIssue", ""),
];

/// Immutable merged id table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRegistry {
    namespace: String,
    ids: BTreeMap<String, String>,
}

impl IdRegistry {
    /// Resolve a `category.name` key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    /// Resolve a key that the caller knows is declared
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            Error::Config(format!("id '{}' is not declared in '{}'", key, self.namespace))
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is one of the values in this registry
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.values().any(|v| v == id)
    }
}

fn resolve(namespace: &str, key: &str, value: &str) -> Result<String> {
    if !value.is_empty() {
        return Ok(value.to_string());
    }
    let (category, name) = key
        .split_once('.')
        .filter(|(c, n)| !c.is_empty() && !n.is_empty())
        .ok_or_else(|| Error::Config(format!("malformed id key '{}'", key)))?;
    Ok(format!("{namespace}:{category}:{name}"))
}

/// Merge a base table and an override table into one registry
///
/// Redeclaring a key is fine as long as both sides agree on its value; a
/// conflicting redeclaration is a configuration error.
pub fn merge_ids(namespace: &str, base: IdTable<'_>, overrides: IdTable<'_>) -> Result<IdRegistry> {
    let mut ids = BTreeMap::new();
    for (key, value) in base.iter().chain(overrides.iter()) {
        let resolved = resolve(namespace, key, value)?;
        if let Some(existing) = ids.get(*key) {
            if existing != &resolved {
                return Err(Error::Config(format!(
                    "id '{}' redeclared as '{}' (was '{}')",
                    key, resolved, existing
                )));
            }
            continue;
        }
        ids.insert(key.to_string(), resolved);
    }
    Ok(IdRegistry {
        namespace: namespace.to_string(),
        ids,
    })
}

/// Process-wide tracker ids, built on first use
pub fn tracker_ids() -> &'static IdRegistry {
    static IDS: OnceLock<IdRegistry> = OnceLock::new();
    IDS.get_or_init(|| {
        // The built-in tables are all placeholders, so merging cannot conflict.
        merge_ids(TRACKER, TRACKER_BASE, TRACKER_MODEL).unwrap_or_else(|_| IdRegistry {
            namespace: TRACKER.to_string(),
            ids: BTreeMap::new(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_resolve_to_qualified_ids() {
        let ids = tracker_ids();
        assert_eq!(ids.get("app.Tracker"), Some("tracker:app:Tracker"));
        assert_eq!(ids.get("viewlet.IssueList"), Some("tracker:viewlet:IssueList"));
        assert!(ids.contains_id("tracker:string:AllIssues"));
    }

    #[test]
    fn test_overlapping_placeholders_are_merged_once() {
        let ids = tracker_ids();
        let expected = TRACKER_BASE.len() + TRACKER_MODEL.len() - 2;
        assert_eq!(ids.len(), expected);
    }

    #[test]
    fn test_conflicting_redeclaration_is_rejected() {
        let base = &[("component.Editor", "ui:component:Editor")];
        let over = &[("component.Editor", "ui:component:OtherEditor")];
        let err = merge_ids("ui", base, over).unwrap_err();
        assert!(err.to_string().contains("component.Editor"));
    }

    #[test]
    fn test_agreeing_redeclaration_is_accepted() {
        let base = &[("string.Title", "")];
        let over = &[("string.Title", "ui:string:Title")];
        let ids = merge_ids("ui", base, over).unwrap();
        assert_eq!(ids.require("string.Title").unwrap(), "ui:string:Title");
    }

    #[test]
    fn test_malformed_key() {
        assert!(merge_ids("ui", &[("nodot", "")], &[]).is_err());
        assert!(tracker_ids().require("app.Missing").is_err());
    }

    #[test]
    fn test_registry_is_built_once() {
        assert!(std::ptr::eq(tracker_ids(), tracker_ids()));
    }
}
