use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{ClassId, DatasetModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataField {
    Name,
    Description,
}

/// A problem that blocks submission. Reported together, never one at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingMetadata(MetadataField),
    EmptyName { class_id: ClassId },
    DuplicateName { name: String, class_ids: Vec<ClassId> },
    EmptyImages { class_id: ClassId },
}

impl ValidationIssue {
    /// User-facing text; issues of the same kind share one message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingMetadata(_) => "Please fill all fields",
            Self::EmptyName { .. } => "Class names cannot be empty",
            Self::DuplicateName { .. } => "each class should have a unique name",
            Self::EmptyImages { .. } => "Add images for all classes",
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMetadata(MetadataField::Name) => f.write_str("Model name is empty"),
            Self::MissingMetadata(MetadataField::Description) => {
                f.write_str("Model description is empty")
            }
            Self::EmptyName { class_id } => write!(f, "Class {class_id} has no name"),
            Self::DuplicateName { name, class_ids } => {
                write!(f, "Class name {name:?} is used by classes {class_ids:?}")
            }
            Self::EmptyImages { class_id } => write!(f, "Class {class_id} has no images"),
        }
    }
}

/// Distinct user-facing messages for `issues`, in first-seen order.
pub fn summarize(issues: &[ValidationIssue]) -> Vec<&'static str> {
    let mut seen = BTreeSet::new();
    issues
        .iter()
        .map(ValidationIssue::message)
        .filter(|message| seen.insert(*message))
        .collect()
}

pub(super) fn validate(model: &DatasetModel) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if model.name.trim().is_empty() {
        issues.push(ValidationIssue::MissingMetadata(MetadataField::Name));
    }
    if model.description.trim().is_empty() {
        issues.push(ValidationIssue::MissingMetadata(MetadataField::Description));
    }

    let mut by_name: BTreeMap<&str, Vec<ClassId>> = BTreeMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for class in model.classes() {
        if class.name.trim().is_empty() {
            issues.push(ValidationIssue::EmptyName { class_id: class.id });
        } else {
            let ids = by_name.entry(class.name.as_str()).or_default();
            if ids.is_empty() {
                first_seen.push(class.name.as_str());
            }
            ids.push(class.id);
        }
    }
    for name in first_seen {
        if let Some(class_ids) = by_name.get(name).filter(|ids| ids.len() > 1) {
            issues.push(ValidationIssue::DuplicateName {
                name: name.to_string(),
                class_ids: class_ids.clone(),
            });
        }
    }

    for class in model.classes() {
        if class.images.is_empty() {
            issues.push(ValidationIssue::EmptyImages { class_id: class.id });
        }
    }
    issues
}
