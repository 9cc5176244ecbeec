//! Structured field-level validation errors.
//!
//! Errors carry a machine-readable code and the violated constraint, never human text, so that
//! clients can render their own (localized) messages.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Machine-readable reason a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required field is missing or empty.
    Required,
    /// The value has the wrong JSON type.
    InvalidType,
    /// String shorter than the minimum length.
    TooShort,
    /// String longer than the maximum length.
    TooLong,
    /// Number below the minimum.
    BelowMinimum,
    /// Number above the maximum.
    AboveMaximum,
    /// String does not match the required pattern.
    PatternMismatch,
    /// Value is not one of the allowed options.
    NotAllowed,
    /// Field is not part of the schema.
    UnknownField,
    /// File reference does not name an attachment of this request.
    InvalidReference,
}

impl ErrorCode {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::InvalidType => "invalid_type",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::BelowMinimum => "below_minimum",
            Self::AboveMaximum => "above_maximum",
            Self::PatternMismatch => "pattern_mismatch",
            Self::NotAllowed => "not_allowed",
            Self::UnknownField => "unknown_field",
            Self::InvalidReference => "invalid_reference",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The constraint a field violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// The field must be present.
    Presence,
    /// The field must have this JSON type.
    Type {
        /// Expected type name.
        expected: String,
    },
    /// Character-count bounds.
    Length {
        /// Minimum characters.
        min: Option<usize>,
        /// Maximum characters.
        max: Option<usize>,
    },
    /// Inclusive numeric bounds.
    Range {
        /// Minimum value.
        min: Option<i64>,
        /// Maximum value.
        max: Option<i64>,
    },
    /// Regular expression the normalized value must match.
    Pattern {
        /// The pattern source.
        pattern: String,
    },
    /// Enumeration of allowed values.
    OneOf {
        /// Allowed values.
        values: Vec<String>,
    },
    /// The set of fields the schema accepts.
    KnownField,
    /// Must reference an attachment staged on the same request.
    AttachmentReference,
    /// Minimum number of attachments on the request.
    MinAttachments {
        /// Required count.
        min: usize,
    },
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `contact_phone`).
    pub path: String,
    /// Reason code.
    pub code: ErrorCode,
    /// The violated constraint.
    pub constraint: Constraint,
}

impl FieldError {
    /// Create a field error.
    #[must_use]
    pub fn new(path: impl Into<String>, code: ErrorCode, constraint: Constraint) -> Self {
        Self {
            path: path.into(),
            code,
            constraint,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.code)
    }
}

/// Ordered list of field errors. Never empty when returned as an error.
///
/// Most failing payloads have one or two problems, so a few errors live inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(SmallVec<[FieldError; 4]>);

impl FieldErrors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Collection holding a single error.
    #[must_use]
    pub fn single(error: FieldError) -> Self {
        let mut errors = Self::new();
        errors.push(error);
        errors
    }

    /// Append an error.
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Append all errors from `other`.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether there are no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the errors in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error names `path`.
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path == path)
    }

    /// `Ok(())` if empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns the collection itself when it holds at least one error.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{error}")?;
            first = false;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
