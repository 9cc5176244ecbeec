//! Type registry and the generic payload validator.
//!
//! The registry is built once at process start from the declarative schemas in
//! [`schema`](crate::schema), compiles every pattern up front, and is then shared read-only
//! (behind an `Arc`) by all concurrent engine operations.
//!
//! Validation is pure and total: for a registered type and any JSON input it returns either a
//! normalized [`RequestPayload`] or a non-empty, ordered [`FieldErrors`] list.

use crate::ids::AttachmentId;
use crate::payload::RequestPayload;
use crate::request::{RequestType, UnknownRequestType};
use crate::schema::{Case, FieldKind, FieldRule, RequestSchema, standard_schemas};
use crate::validation::{Constraint, ErrorCode, FieldError, FieldErrors};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Problems building a registry (programming errors in schema tables).
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A field pattern failed to compile.
    #[error("Invalid pattern for {request_type}.{field}: {source}")]
    InvalidPattern {
        /// Request type of the schema.
        request_type: RequestType,
        /// Field name.
        field: &'static str,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// Two schemas were registered for one type.
    #[error("Duplicate schema for {0}")]
    DuplicateSchema(RequestType),

    /// A request type has no schema.
    #[error("Missing schema for {0}")]
    MissingSchema(RequestType),
}

/// Why a payload was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The type tag is not registered.
    #[error(transparent)]
    UnknownType(#[from] UnknownRequestType),

    /// One or more fields violate the schema.
    #[error("Invalid payload: {0}")]
    Invalid(FieldErrors),
}

struct CompiledRule {
    rule: FieldRule,
    pattern: Option<Regex>,
}

struct CompiledSchema {
    schema: RequestSchema,
    rules: Vec<CompiledRule>,
}

/// Closed mapping from request type to its compiled schema.
pub struct TypeRegistry {
    schemas: HashMap<RequestType, CompiledSchema>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.schemas.keys().collect();
        types.sort();
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}

impl TypeRegistry {
    /// Build a registry from explicit schemas. Every [`RequestType`] must be covered exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if a pattern does not compile or the type coverage is wrong.
    pub fn new(schemas: Vec<RequestSchema>) -> Result<Self, SchemaError> {
        let mut compiled = HashMap::with_capacity(schemas.len());

        for schema in schemas {
            let request_type = schema.request_type();
            let rules = schema
                .fields()
                .iter()
                .map(|rule| {
                    let pattern = rule
                        .effective_pattern()
                        .map(Regex::new)
                        .transpose()
                        .map_err(|source| SchemaError::InvalidPattern {
                            request_type,
                            field: rule.name,
                            source,
                        })?;
                    Ok(CompiledRule {
                        rule: rule.clone(),
                        pattern,
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;

            if compiled
                .insert(request_type, CompiledSchema { schema, rules })
                .is_some()
            {
                return Err(SchemaError::DuplicateSchema(request_type));
            }
        }

        if let Some(missing) = RequestType::ALL.into_iter().find(|t| !compiled.contains_key(t)) {
            return Err(SchemaError::MissingSchema(missing));
        }

        Ok(Self { schemas: compiled })
    }

    /// Registry with the schemas shipped in [`standard_schemas`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] only if the built-in tables are broken.
    pub fn standard() -> Result<Self, SchemaError> {
        Self::new(standard_schemas())
    }

    /// Schema registered for `request_type`.
    #[must_use]
    pub fn schema(&self, request_type: RequestType) -> Option<&RequestSchema> {
        self.schemas.get(&request_type).map(|c| &c.schema)
    }

    /// Validate a raw payload against the schema named by `type_tag`.
    ///
    /// # Errors
    ///
    /// - [`ValidationFailure::UnknownType`] if the tag is not registered.
    /// - [`ValidationFailure::Invalid`] with the ordered field errors otherwise.
    pub fn validate(&self, type_tag: &str, raw: &Value) -> Result<RequestPayload, ValidationFailure> {
        let request_type: RequestType = type_tag.parse()?;
        self.validate_typed(request_type, raw)
    }

    /// Validate a raw payload for a known type.
    ///
    /// # Errors
    ///
    /// See [`TypeRegistry::validate`].
    pub fn validate_typed(
        &self,
        request_type: RequestType,
        raw: &Value,
    ) -> Result<RequestPayload, ValidationFailure> {
        let compiled = self
            .schemas
            .get(&request_type)
            .ok_or_else(|| UnknownRequestType(request_type.as_str().to_string()))?;

        let normalized = normalize(compiled, raw).map_err(ValidationFailure::Invalid)?;

        RequestPayload::from_fields(request_type, Value::Object(normalized)).map_err(|_| {
            ValidationFailure::Invalid(FieldErrors::single(FieldError::new(
                "",
                ErrorCode::InvalidType,
                Constraint::Type {
                    expected: request_type.as_str().to_string(),
                },
            )))
        })
    }

    /// Re-run validation over an already typed payload.
    ///
    /// Used before submission so that a payload persisted under an older schema revision cannot
    /// slip through.
    ///
    /// # Errors
    ///
    /// See [`TypeRegistry::validate`].
    pub fn revalidate(&self, payload: &RequestPayload) -> Result<RequestPayload, ValidationFailure> {
        let fields = payload.to_fields().map_err(|_| {
            ValidationFailure::Invalid(FieldErrors::single(FieldError::new(
                "",
                ErrorCode::InvalidType,
                Constraint::Type {
                    expected: payload.request_type().as_str().to_string(),
                },
            )))
        })?;
        self.validate_typed(payload.request_type(), &fields)
    }

    /// Attachment references held in the payload's file-reference fields, in schema order.
    #[must_use]
    pub fn file_references(&self, payload: &RequestPayload) -> Vec<(&'static str, AttachmentId)> {
        let Some(compiled) = self.schemas.get(&payload.request_type()) else {
            return Vec::new();
        };
        let Ok(fields) = payload.to_fields() else {
            return Vec::new();
        };

        compiled
            .rules
            .iter()
            .filter(|c| c.rule.kind == FieldKind::FileReference)
            .filter_map(|c| {
                fields
                    .get(c.rule.name)
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .map(|id| (c.rule.name, id))
            })
            .collect()
    }
}

fn normalize(compiled: &CompiledSchema, raw: &Value) -> Result<Map<String, Value>, FieldErrors> {
    let Some(input) = raw.as_object() else {
        return Err(FieldErrors::single(FieldError::new(
            "",
            ErrorCode::InvalidType,
            Constraint::Type {
                expected: "object".to_string(),
            },
        )));
    };

    let mut errors = FieldErrors::new();
    let mut output = Map::new();

    for compiled_rule in &compiled.rules {
        let rule = &compiled_rule.rule;
        let value = input.get(rule.name).filter(|v| !is_blank(v));

        let value = match (value, &rule.default) {
            (Some(v), _) => v.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) if rule.required => {
                errors.push(FieldError::new(rule.name, ErrorCode::Required, Constraint::Presence));
                continue;
            }
            (None, None) => continue,
        };

        match check_field(compiled_rule, value) {
            Ok(normalized) => {
                output.insert(rule.name.to_string(), normalized);
            }
            Err(error) => errors.push(error),
        }
    }

    let mut unknown: Vec<&String> = input
        .keys()
        .filter(|key| compiled.schema.rule(key).is_none())
        .collect();
    unknown.sort();
    for key in unknown {
        errors.push(FieldError::new(
            key.clone(),
            ErrorCode::UnknownField,
            Constraint::KnownField,
        ));
    }

    errors.into_result().map(|()| output)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn type_error(rule: &FieldRule) -> FieldError {
    FieldError::new(
        rule.name,
        ErrorCode::InvalidType,
        Constraint::Type {
            expected: rule.kind.expected_type().to_string(),
        },
    )
}

fn check_field(compiled: &CompiledRule, value: Value) -> Result<Value, FieldError> {
    let rule = &compiled.rule;

    match rule.kind {
        FieldKind::Integer => {
            let number = value.as_i64().ok_or_else(|| type_error(rule))?;
            check_range(rule, number)?;
            Ok(Value::from(number))
        }
        FieldKind::Boolean => value
            .as_bool()
            .map(Value::from)
            .ok_or_else(|| type_error(rule)),
        _ => {
            let text = value.as_str().ok_or_else(|| type_error(rule))?;
            let text = normalize_text(rule, text);
            check_length(rule, &text)?;

            if rule.kind == FieldKind::Enumeration && !rule.options.contains(&text.as_str()) {
                return Err(FieldError::new(
                    rule.name,
                    ErrorCode::NotAllowed,
                    Constraint::OneOf {
                        values: rule.options.iter().map(|o| (*o).to_string()).collect(),
                    },
                ));
            }

            if rule.kind == FieldKind::FileReference && text.parse::<AttachmentId>().is_err() {
                return Err(type_error(rule));
            }

            if let Some(pattern) = &compiled.pattern {
                if !pattern.is_match(&text) {
                    return Err(FieldError::new(
                        rule.name,
                        ErrorCode::PatternMismatch,
                        Constraint::Pattern {
                            pattern: pattern.as_str().to_string(),
                        },
                    ));
                }
            }

            Ok(Value::String(text))
        }
    }
}

fn normalize_text(rule: &FieldRule, raw: &str) -> String {
    let trimmed = raw.trim();
    let folded = match rule.case {
        Case::Preserve => trimmed.to_string(),
        Case::Lower => trimmed.to_lowercase(),
        Case::Upper => trimmed.to_uppercase(),
    };

    match rule.kind {
        FieldKind::Phone => normalize_phone(&folded),
        FieldKind::FileReference => folded.to_lowercase(),
        _ => folded,
    }
}

/// Strip separators and add the national prefix to bare ten-digit numbers.
fn normalize_phone(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let all_digits = !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit());
    if all_digits && compact.len() == 10 {
        format!("+1{compact}")
    } else if all_digits && compact.len() == 11 && compact.starts_with('1') {
        format!("+{compact}")
    } else {
        compact
    }
}

fn check_length(rule: &FieldRule, text: &str) -> Result<(), FieldError> {
    let chars = text.chars().count();
    let constraint = || Constraint::Length {
        min: rule.min_len,
        max: rule.max_len,
    };

    if rule.min_len.is_some_and(|min| chars < min) {
        return Err(FieldError::new(rule.name, ErrorCode::TooShort, constraint()));
    }
    if rule.max_len.is_some_and(|max| chars > max) {
        return Err(FieldError::new(rule.name, ErrorCode::TooLong, constraint()));
    }
    Ok(())
}

fn check_range(rule: &FieldRule, number: i64) -> Result<(), FieldError> {
    let constraint = || Constraint::Range {
        min: rule.min,
        max: rule.max,
    };

    if rule.min.is_some_and(|min| number < min) {
        return Err(FieldError::new(rule.name, ErrorCode::BelowMinimum, constraint()));
    }
    if rule.max.is_some_and(|max| number > max) {
        return Err(FieldError::new(rule.name, ErrorCode::AboveMaximum, constraint()));
    }
    Ok(())
}
