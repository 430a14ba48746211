//! Best-effort field extraction from a [`ResultBundle`].
//!
//! Every field is extracted independently. A missing field is an extraction
//! gap and maps to [`FieldValue::NotFound`]; a field that is present but
//! unusable is recorded in [`Extraction::errors`] and also maps to `NotFound`,
//! so one bad field never hides the others.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use thiserror::Error;

use super::{AuthenticityCheck, ImageFieldType, ResultBundle, TextFieldType};

/// Headline shown when the bundle carries no holder name.
pub const NAME_NOT_FOUND: &str = "Name not found";

/// Value of a single extracted field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FieldValue<T> {
    /// No bundle has been processed yet for this session
    NotAttempted,
    /// A bundle was processed but did not contain the field
    NotFound,
    Found(T),
}

impl<T> Default for FieldValue<T> {
    fn default() -> Self {
        FieldValue::NotAttempted
    }
}

impl<T> FieldValue<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, FieldValue::Found(_))
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            FieldValue::Found(v) => Some(v),
            _ => None,
        }
    }

    fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => FieldValue::Found(v),
            None => FieldValue::NotFound,
        }
    }
}

impl FieldValue<String> {
    /// Text for display, substituting `sentinel` when the field is absent.
    pub fn text_or<'a>(&'a self, sentinel: &'a str) -> Option<&'a str> {
        match self {
            FieldValue::Found(v) => Some(v.as_str()),
            FieldValue::NotFound => Some(sentinel),
            FieldValue::NotAttempted => None,
        }
    }
}

/// Decoded image data ready to hand to a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub field_type: ImageFieldType,
    pub byte_len: usize,
    #[serde(skip)]
    bytes: Arc<[u8]>,
}

impl ImageRef {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `data:` URI for renderers that take inline images.
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {detail}")]
pub struct ExtractionError {
    pub field: String,
    pub detail: String,
}

/// Everything the presentation layer needs from one bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub identity_name: FieldValue<String>,
    pub portrait: FieldValue<ImageRef>,
    pub document_image: FieldValue<ImageRef>,
    pub authenticity_checks: FieldValue<Vec<AuthenticityCheck>>,
    pub errors: Vec<ExtractionError>,
}

/// Pulls the session's named fields out of a bundle.
#[derive(Debug, Clone)]
pub struct ResultExtractor {
    name_field: TextFieldType,
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self {
            name_field: TextFieldType::SurnameAndGivenNames,
        }
    }
}

impl ResultExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different text field as the holder name.
    pub fn with_name_field(mut self, field_type: TextFieldType) -> Self {
        self.name_field = field_type;
        self
    }

    pub fn extract(&self, bundle: &ResultBundle) -> Extraction {
        let mut errors = Vec::new();

        let identity_name = self.extract_text(bundle, self.name_field);
        let portrait = collect(
            self.extract_image(bundle, ImageFieldType::Portrait),
            &mut errors,
        );
        let document_image = collect(
            self.extract_image(bundle, ImageFieldType::DocumentImage),
            &mut errors,
        );
        let authenticity_checks =
            FieldValue::from_option(bundle.authenticity_checks().map(<[_]>::to_vec));

        if !errors.is_empty() {
            tracing::warn!(
                "Extraction from bundle {} finished with {} error(s)",
                bundle.id(),
                errors.len()
            );
        }

        Extraction {
            identity_name,
            portrait,
            document_image,
            authenticity_checks,
            errors,
        }
    }

    pub fn extract_text(&self, bundle: &ResultBundle, field_type: TextFieldType) -> FieldValue<String> {
        FieldValue::from_option(bundle.text_field(field_type).map(|v| v.trim().to_string()))
    }

    pub fn extract_image(
        &self,
        bundle: &ResultBundle,
        field_type: ImageFieldType,
    ) -> Result<FieldValue<ImageRef>, ExtractionError> {
        let Some(payload) = bundle.image_field(field_type) else {
            return Ok(FieldValue::NotFound);
        };

        let bytes = decode_image_payload(payload).map_err(|e| ExtractionError {
            field: format!("{:?}", field_type),
            detail: format!("undecodable image payload: {}", e),
        })?;

        if bytes.is_empty() {
            return Ok(FieldValue::NotFound);
        }

        Ok(FieldValue::Found(ImageRef {
            field_type,
            byte_len: bytes.len(),
            bytes: bytes.into(),
        }))
    }
}

/// Fold a per-field error into the error list, leaving the field `NotFound`.
fn collect<T>(
    result: Result<FieldValue<T>, ExtractionError>,
    errors: &mut Vec<ExtractionError>,
) -> FieldValue<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Field extraction failed: {}", e);
            errors.push(e);
            FieldValue::NotFound
        }
    }
}

/// Accepts raw base64 or a `data:` URI.
fn decode_image_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = payload.trim();
    let raw = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };
    STANDARD.decode(raw)
}
