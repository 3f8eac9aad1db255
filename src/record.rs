//! Shared record data model
//!
//! An [`AuthoredRecord`] is what the authoring session types into the
//! "new issue" form. An [`ObservedRecord`] is what a peer reads back from
//! the issue details view. Both expose their values through [`Field`] in a
//! fixed comparison order so the verifier can walk them uniformly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder expanded to a per-run generated id in scenario strings
pub const ID_PLACEHOLDER: &str = "{id}";

/// Comparable record fields, declared in comparison order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Description,
    Status,
    Priority,
    Assignee,
    Labels,
    Component,
    Estimation,
    Milestone,
    DueDate,
    Attachment,
}

impl Field {
    /// All fields in the order the verifier compares them
    pub const ALL: [Field; 11] = [
        Field::Title,
        Field::Description,
        Field::Status,
        Field::Priority,
        Field::Assignee,
        Field::Labels,
        Field::Component,
        Field::Estimation,
        Field::Milestone,
        Field::DueDate,
        Field::Attachment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::Status => "status",
            Field::Priority => "priority",
            Field::Assignee => "assignee",
            Field::Labels => "labels",
            Field::Component => "component",
            Field::Estimation => "estimation",
            Field::Milestone => "milestone",
            Field::DueDate => "due_date",
            Field::Attachment => "attachment",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The intent for a shared record, as entered by the authoring actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredRecord {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Whether the labels should be created if the project lacks them
    #[serde(default)]
    pub create_label: bool,
    pub component: String,
    pub estimation: String,
    pub milestone: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub attachment: Option<String>,
}

/// The same logical record as read back through a peer session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservedRecord {
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub labels: BTreeSet<String>,
    pub component: String,
    pub estimation: String,
    pub milestone: String,
    pub due_date: String,
    pub attachment: Option<String>,
}

fn render_labels(labels: &BTreeSet<String>) -> String {
    labels.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl AuthoredRecord {
    /// Comparable string value of a field
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.clone(),
            Field::Description => self.description.clone(),
            Field::Status => self.status.clone(),
            Field::Priority => self.priority.clone(),
            Field::Assignee => self.assignee.clone(),
            Field::Labels => render_labels(&self.labels),
            Field::Component => self.component.clone(),
            Field::Estimation => self.estimation.clone(),
            Field::Milestone => self.milestone.clone(),
            Field::DueDate => self.due_date.clone(),
            Field::Attachment => self.attachment.clone().unwrap_or_default(),
        }
    }

    /// Overwrite a field from its comparable string value
    ///
    /// Labels are parsed back from their comma-joined rendering.
    pub fn set_value(&mut self, field: Field, value: String) {
        match field {
            Field::Title => self.title = value,
            Field::Description => self.description = value,
            Field::Status => self.status = value,
            Field::Priority => self.priority = value,
            Field::Assignee => self.assignee = value,
            Field::Labels => {
                self.labels = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Field::Component => self.component = value,
            Field::Estimation => self.estimation = value,
            Field::Milestone => self.milestone = value,
            Field::DueDate => self.due_date = value,
            Field::Attachment => {
                self.attachment = if value.is_empty() { None } else { Some(value) };
            }
        }
    }

    /// Replace every `{id}` placeholder in string fields with `id`
    pub fn with_id(&self, id: &str) -> Self {
        let expand = |s: &str| s.replace(ID_PLACEHOLDER, id);
        Self {
            title: expand(&self.title),
            description: expand(&self.description),
            status: expand(&self.status),
            priority: expand(&self.priority),
            assignee: expand(&self.assignee),
            labels: self.labels.iter().map(|l| expand(l)).collect(),
            create_label: self.create_label,
            component: expand(&self.component),
            estimation: expand(&self.estimation),
            milestone: expand(&self.milestone),
            due_date: expand(&self.due_date),
            attachment: self.attachment.as_deref().map(expand),
        }
    }
}

impl ObservedRecord {
    /// Comparable string value of a field
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.clone(),
            Field::Description => self.description.clone(),
            Field::Status => self.status.clone(),
            Field::Priority => self.priority.clone(),
            Field::Assignee => self.assignee.clone(),
            Field::Labels => render_labels(&self.labels),
            Field::Component => self.component.clone(),
            Field::Estimation => self.estimation.clone(),
            Field::Milestone => self.milestone.clone(),
            Field::DueDate => self.due_date.clone(),
            Field::Attachment => self.attachment.clone().unwrap_or_default(),
        }
    }
}

impl From<&AuthoredRecord> for ObservedRecord {
    fn from(record: &AuthoredRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            status: record.status.clone(),
            priority: record.priority.clone(),
            assignee: record.assignee.clone(),
            labels: record.labels.clone(),
            component: record.component.clone(),
            estimation: record.estimation.clone(),
            milestone: record.milestone.clone(),
            due_date: record.due_date.clone(),
            attachment: record.attachment.clone(),
        }
    }
}

/// Backend identifier of a created record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    /// Opaque backend id
    pub id: String,
    /// Title the record was created with
    pub title: String,
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.title)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A new issue as authored by the assignment scenario
    pub fn new_issue(id: &str) -> AuthoredRecord {
        AuthoredRecord {
            title: format!("Collaborative test for issue-{id}"),
            description: "Collaborative test for issue".into(),
            status: "Backlog".into(),
            priority: "Urgent".into(),
            assignee: "Appleseed John".into(),
            labels: [format!("CREATE-ISSUE-{id}")].into_iter().collect(),
            create_label: true,
            component: "No component".into(),
            estimation: "2".into(),
            milestone: "No Milestone".into(),
            due_date: "today".into(),
            attachment: Some("cat.jpeg".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::new_issue;
    use super::*;

    #[test]
    fn test_field_order_is_declaration_order() {
        let mut sorted = Field::ALL;
        sorted.sort();
        assert_eq!(sorted, Field::ALL);
        assert_eq!(Field::ALL[0], Field::Title);
        assert_eq!(Field::ALL[10], Field::Attachment);
    }

    #[test]
    fn test_labels_render_sorted() {
        let mut record = new_issue("x");
        record.labels = ["b", "a", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(record.value(Field::Labels), "a, b, c");
    }

    #[test]
    fn test_set_value_round_trips_labels_and_attachment() {
        let mut record = new_issue("x");
        record.set_value(Field::Labels, "one, two".into());
        assert_eq!(record.labels.len(), 2);
        record.set_value(Field::Attachment, String::new());
        assert_eq!(record.attachment, None);
    }

    #[test]
    fn test_with_id_expands_placeholders() {
        let mut record = new_issue("x");
        record.title = "T-{id}".into();
        record.labels = ["L-{id}".to_string()].into_iter().collect();
        let expanded = record.with_id("q1w2e3r4");
        assert_eq!(expanded.title, "T-q1w2e3r4");
        assert!(expanded.labels.contains("L-q1w2e3r4"));
        assert_eq!(expanded.estimation, "2");
    }

    #[test]
    fn test_field_serde_name_matches_display() {
        for field in Field::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.name()));
        }
    }
}
