//! Result bundles produced by the document engine.
//!
//! A [`ResultBundle`] is owned by the engine and handed to the session as a
//! read-only [`BundleHandle`]. The session never mutates a bundle; it only
//! queries it field by field through the accessors below and through the
//! [`extractor`].

pub mod extractor;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use extractor::{
    Extraction, ExtractionError, FieldValue, ImageRef, ResultExtractor, NAME_NOT_FOUND,
};

/// Shared read-only reference to a live bundle.
pub type BundleHandle = Arc<ResultBundle>;

/// Identifier assigned to each bundle when it is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text field types the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFieldType {
    SurnameAndGivenNames,
    Surname,
    GivenNames,
    DocumentNumber,
    DateOfBirth,
    DateOfExpiry,
    Nationality,
}

/// Image field types the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFieldType {
    Portrait,
    DocumentImage,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    pub field_type: TextFieldType,
    pub value: String,
}

/// An image field as delivered by the engine: a base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageField {
    pub field_type: ImageFieldType,
    pub value: String,
}

/// Outcome of a single per-feature authenticity determination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticityCheck {
    pub feature_id: String,
    pub status: CheckStatus,
}

impl AuthenticityCheck {
    pub fn new(feature_id: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            feature_id: feature_id.into(),
            status,
        }
    }
}

/// Opaque container of every field produced by a capture or chip read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultBundle {
    #[serde(skip, default)]
    id: BundleId,

    #[serde(default)]
    text_fields: Vec<TextField>,

    #[serde(default)]
    image_fields: Vec<ImageField>,

    /// `None` when the engine ran no authenticity processing at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authenticity_checks: Option<Vec<AuthenticityCheck>>,

    /// Marker set by the engine when the document carries a readable chip
    #[serde(default)]
    chip_data_expected: bool,
}

impl ResultBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, field_type: TextFieldType, value: impl Into<String>) -> Self {
        self.text_fields.push(TextField {
            field_type,
            value: value.into(),
        });
        self
    }

    pub fn with_image(mut self, field_type: ImageFieldType, base64: impl Into<String>) -> Self {
        self.image_fields.push(ImageField {
            field_type,
            value: base64.into(),
        });
        self
    }

    pub fn with_authenticity(mut self, checks: Vec<AuthenticityCheck>) -> Self {
        self.authenticity_checks = Some(checks);
        self
    }

    pub fn with_chip_data(mut self, expected: bool) -> Self {
        self.chip_data_expected = expected;
        self
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    /// First non-empty value of the given text field.
    pub fn text_field(&self, field_type: TextFieldType) -> Option<&str> {
        self.text_fields
            .iter()
            .filter(|f| f.field_type == field_type)
            .map(|f| f.value.as_str())
            .find(|v| !v.trim().is_empty())
    }

    /// Raw base64 payload of the given image field.
    pub fn image_field(&self, field_type: ImageFieldType) -> Option<&str> {
        self.image_fields
            .iter()
            .filter(|f| f.field_type == field_type)
            .map(|f| f.value.as_str())
            .find(|v| !v.is_empty())
    }

    pub fn authenticity_checks(&self) -> Option<&[AuthenticityCheck]> {
        self.authenticity_checks.as_deref()
    }

    pub fn chip_data_expected(&self) -> bool {
        self.chip_data_expected
    }

    pub fn into_handle(self) -> BundleHandle {
        Arc::new(self)
    }
}
