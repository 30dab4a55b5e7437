//! In-memory dataset assembled on the training view before upload.
//!
//! The model always holds at least [`MIN_CLASSES`] classes. Class ids come
//! from a high-water mark so an id is never handed out twice in a session,
//! even after the class that held it is deleted.

pub mod validation;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use validation::{MetadataField, ValidationIssue};

/// Minimum number of classes a dataset may hold.
pub const MIN_CLASSES: usize = 2;

pub type ClassId = u32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("A dataset needs at least {MIN_CLASSES} classes (currently {classes})")]
    InvariantViolation { classes: usize },
    #[error("Unknown class id {0}")]
    UnknownClass(ClassId),
}

/// Local reference to image bytes that have not been uploaded yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef {
    location: PathBuf,
}

impl ImageRef {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Last path component, used when reporting problems with this image.
    pub fn file_name(&self) -> String {
        self.location
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.location.display().to_string())
    }

    pub fn is_png(&self) -> bool {
        self.location
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }
}

impl From<PathBuf> for ImageRef {
    fn from(location: PathBuf) -> Self {
        Self::new(location)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassEntry {
    pub id: ClassId,
    pub name: String,
    pub images: Vec<ImageRef>,
}

impl ClassEntry {
    fn placeholder(id: ClassId) -> Self {
        Self {
            id,
            name: String::new(),
            images: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Plants,
    AnimalsDiseases,
    Entertainment,
    #[default]
    Other,
}

impl ModelCategory {
    pub const ALL: [Self; 4] = [
        Self::Plants,
        Self::AnimalsDiseases,
        Self::Entertainment,
        Self::Other,
    ];

    /// Wire value sent to the training service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plants => "plants",
            Self::AnimalsDiseases => "animals_diseases",
            Self::Entertainment => "entertainment",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Plants => "Plants",
            Self::AnimalsDiseases => "Animals diseases",
            Self::Entertainment => "Entertainment",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[default]
    #[serde(rename = "resnet50")]
    ResNet50,
    #[serde(rename = "googlenet")]
    GoogLeNet,
    #[serde(rename = "mobilenet_v2")]
    MobileNetV2,
}

impl Architecture {
    pub const ALL: [Self; 3] = [Self::ResNet50, Self::GoogLeNet, Self::MobileNetV2];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResNet50 => "resnet50",
            Self::GoogLeNet => "googlenet",
            Self::MobileNetV2 => "mobilenet_v2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ResNet50 => "ResNet50 (default)",
            Self::GoogLeNet => "Googlenet",
            Self::MobileNetV2 => "Mobilenet_v2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.as_str() == value.trim())
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classes, their images and model-level metadata awaiting submission.
#[derive(Clone, Debug)]
pub struct DatasetModel {
    pub name: String,
    pub description: String,
    pub category: ModelCategory,
    pub architecture: Architecture,
    classes: Vec<ClassEntry>,
    highest_issued_id: ClassId,
}

impl Default for DatasetModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetModel {
    /// Fresh dataset with two unnamed placeholder classes.
    pub fn new() -> Self {
        let mut model = Self {
            name: String::new(),
            description: String::new(),
            category: ModelCategory::default(),
            architecture: Architecture::default(),
            classes: Vec::with_capacity(MIN_CLASSES),
            highest_issued_id: 0,
        };
        for _ in 0..MIN_CLASSES {
            model.add_class();
        }
        model
    }

    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassEntry> {
        self.classes.iter().find(|class| class.id == id)
    }

    pub fn contains_class(&self, id: ClassId) -> bool {
        self.class(id).is_some()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|class| class.images.len()).sum()
    }

    /// Append an unnamed class and return its id.
    pub fn add_class(&mut self) -> ClassId {
        let max_existing = self.classes.iter().map(|class| class.id).max().unwrap_or(0);
        let id = self.highest_issued_id.max(max_existing) + 1;
        self.highest_issued_id = id;
        self.classes.push(ClassEntry::placeholder(id));
        id
    }

    /// Remove a class. Refused while only [`MIN_CLASSES`] remain.
    pub fn remove_class(&mut self, id: ClassId) -> Result<ClassEntry, DatasetError> {
        let index = self.index_of(id)?;
        if self.classes.len() <= MIN_CLASSES {
            return Err(DatasetError::InvariantViolation {
                classes: self.classes.len(),
            });
        }
        Ok(self.classes.remove(index))
    }

    pub fn rename_class(&mut self, id: ClassId, name: impl Into<String>) -> Result<(), DatasetError> {
        self.class_mut(id)?.name = name.into();
        Ok(())
    }

    /// Append images in order; returns the class's new image count.
    pub fn append_images(
        &mut self,
        id: ClassId,
        images: impl IntoIterator<Item = ImageRef>,
    ) -> Result<usize, DatasetError> {
        let class = self.class_mut(id)?;
        class.images.extend(images);
        Ok(class.images.len())
    }

    pub fn clear_images(&mut self, id: ClassId) -> Result<(), DatasetError> {
        self.class_mut(id)?.images.clear();
        Ok(())
    }

    /// Every problem blocking submission, in a stable order.
    pub fn validate_for_submission(&self) -> Vec<ValidationIssue> {
        validation::validate(self)
    }

    fn index_of(&self, id: ClassId) -> Result<usize, DatasetError> {
        self.classes
            .iter()
            .position(|class| class.id == id)
            .ok_or(DatasetError::UnknownClass(id))
    }

    fn class_mut(&mut self, id: ClassId) -> Result<&mut ClassEntry, DatasetError> {
        self.classes
            .iter_mut()
            .find(|class| class.id == id)
            .ok_or(DatasetError::UnknownClass(id))
    }
}
