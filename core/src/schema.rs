//! Declarative payload schemas.
//!
//! A schema is an ordered table of [`FieldRule`]s. Rules only describe constraints; the single
//! evaluator in [`registry`](crate::registry) applies them, so every request type validates the
//! same way.
//!
//! # Example
//!
//! ```
//! use request_desk_core::request::RequestType;
//! use request_desk_core::schema::{FieldRule, RequestSchema};
//!
//! let schema = RequestSchema::new(RequestType::Feedback)
//!     .field(FieldRule::text("subject").required().length(3, 120))
//!     .field(FieldRule::enumeration("priority", &["low", "medium", "high"]).default_value("medium"));
//!
//! assert_eq!(schema.fields().len(), 2);
//! ```

use crate::request::RequestType;
use serde_json::Value;

/// Fixed national phone format: `+1` followed by a ten-digit NANP number.
pub const NATIONAL_PHONE_PATTERN: &str = r"^\+1[2-9]\d{2}[2-9]\d{6}$";

/// Pragmatic e-mail shape check (one `@`, a dot in the domain, no whitespace).
pub const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Absolute http(s) URL.
pub const URL_PATTERN: &str = r"^https?://[^\s/$.?#][^\s]*$";

/// ISO-3166 alpha-2 country code.
pub const COUNTRY_CODE_PATTERN: &str = r"^[A-Z]{2}$";

/// The JSON shape and normalization of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text; trimmed.
    Text,
    /// E-mail address; trimmed and lowercased.
    Email,
    /// Phone number; separators stripped, national prefix added.
    Phone,
    /// Absolute http(s) URL; trimmed.
    Url,
    /// Signed integer.
    Integer,
    /// Boolean flag.
    Boolean,
    /// One of a fixed set of lowercase tags.
    Enumeration,
    /// UUID of an attachment staged on the same request.
    FileReference,
}

impl FieldKind {
    /// Pattern implied by the kind, used when the rule does not set one.
    #[must_use]
    pub const fn default_pattern(&self) -> Option<&'static str> {
        match self {
            Self::Email => Some(EMAIL_PATTERN),
            Self::Phone => Some(NATIONAL_PHONE_PATTERN),
            Self::Url => Some(URL_PATTERN),
            _ => None,
        }
    }

    /// Whether values of this kind are JSON strings.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        !matches!(self, Self::Integer | Self::Boolean)
    }

    /// JSON type name reported in type errors.
    #[must_use]
    pub const fn expected_type(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::FileReference => "attachment_id",
            _ => "string",
        }
    }
}

/// Case folding applied to string values before checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Case {
    /// Leave as entered.
    #[default]
    Preserve,
    /// Lowercase.
    Lower,
    /// Uppercase.
    Upper,
}

/// Constraints for one payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// Field name (JSON key).
    pub name: &'static str,
    /// Shape of the value.
    pub kind: FieldKind,
    /// Whether the field must be present (after defaults).
    pub required: bool,
    /// Value used when the field is absent.
    pub default: Option<Value>,
    /// Minimum character count.
    pub min_len: Option<usize>,
    /// Maximum character count.
    pub max_len: Option<usize>,
    /// Minimum integer value.
    pub min: Option<i64>,
    /// Maximum integer value.
    pub max: Option<i64>,
    /// Pattern overriding the kind's default.
    pub pattern: Option<&'static str>,
    /// Allowed values for enumerations.
    pub options: &'static [&'static str],
    /// Case folding.
    pub case: Case,
}

impl FieldRule {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        let case = match kind {
            FieldKind::Email | FieldKind::Enumeration => Case::Lower,
            _ => Case::Preserve,
        };
        Self {
            name,
            kind,
            required: false,
            default: None,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
            pattern: None,
            options: &[],
            case,
        }
    }

    /// Free-text field.
    #[must_use]
    pub fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// E-mail field.
    #[must_use]
    pub fn email(name: &'static str) -> Self {
        Self::new(name, FieldKind::Email).max_length(254)
    }

    /// Phone field in the fixed national format.
    #[must_use]
    pub fn phone(name: &'static str) -> Self {
        Self::new(name, FieldKind::Phone)
    }

    /// URL field.
    #[must_use]
    pub fn url(name: &'static str) -> Self {
        Self::new(name, FieldKind::Url).max_length(2048)
    }

    /// Integer field.
    #[must_use]
    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Boolean field.
    #[must_use]
    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Enumeration field.
    #[must_use]
    pub fn enumeration(name: &'static str, options: &'static [&'static str]) -> Self {
        let mut rule = Self::new(name, FieldKind::Enumeration);
        rule.options = options;
        rule
    }

    /// Attachment reference field.
    #[must_use]
    pub fn file_reference(name: &'static str) -> Self {
        Self::new(name, FieldKind::FileReference)
    }

    /// Mark the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value to use when the field is absent.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Inclusive character-count bounds.
    #[must_use]
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    /// Maximum character count.
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Inclusive numeric bounds.
    #[must_use]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Pattern the normalized value must match.
    #[must_use]
    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Uppercase the value before checks.
    #[must_use]
    pub fn uppercase(mut self) -> Self {
        self.case = Case::Upper;
        self
    }

    /// Pattern actually enforced (explicit or implied by the kind).
    #[must_use]
    pub fn effective_pattern(&self) -> Option<&'static str> {
        self.pattern.or_else(|| self.kind.default_pattern())
    }
}

/// Schema of one request type.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSchema {
    request_type: RequestType,
    fields: Vec<FieldRule>,
    min_attachments: usize,
}

impl RequestSchema {
    /// Start an empty schema for `request_type`.
    #[must_use]
    pub const fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            fields: Vec::new(),
            min_attachments: 0,
        }
    }

    /// Append a field rule. Field order is the order errors are reported in.
    #[must_use]
    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    /// Require at least `count` confirmed attachments before submission.
    #[must_use]
    pub const fn min_attachments(mut self, count: usize) -> Self {
        self.min_attachments = count;
        self
    }

    /// The type this schema describes.
    #[must_use]
    pub const fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Field rules in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Attachments required at submission.
    #[must_use]
    pub const fn required_attachments(&self) -> usize {
        self.min_attachments
    }

    /// Look up a rule by field name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|r| r.name == name)
    }
}

/// Feedback priorities.
pub const PRIORITIES: &[&str] = &["low", "medium", "high"];
/// Feedback categories.
pub const FEEDBACK_CATEGORIES: &[&str] = &["product", "service", "investor_relations", "other"];
/// Partnership kinds.
pub const PARTNERSHIP_TYPES: &[&str] = &["investment", "strategic", "distribution", "technology"];
/// Nominator's relationship to the nominee.
pub const NOMINATION_RELATIONSHIPS: &[&str] = &["self", "shareholder", "board_member", "external"];
/// Investor categories.
pub const INVESTOR_TYPES: &[&str] = &["individual", "institutional", "family_office"];

/// The schemas shipped with the engine, one per [`RequestType`].
#[must_use]
pub fn standard_schemas() -> Vec<RequestSchema> {
    vec![
        RequestSchema::new(RequestType::Feedback)
            .field(FieldRule::text("subject").required().length(3, 120))
            .field(FieldRule::text("message").required().length(20, 5000))
            .field(FieldRule::enumeration("priority", PRIORITIES).default_value("medium"))
            .field(FieldRule::enumeration("category", FEEDBACK_CATEGORIES)),
        RequestSchema::new(RequestType::Partnership)
            .field(FieldRule::text("company_name").required().length(2, 200))
            .field(FieldRule::text("contact_name").required().length(2, 120))
            .field(FieldRule::email("contact_email").required())
            .field(FieldRule::phone("contact_phone").required())
            .field(FieldRule::enumeration("partnership_type", PARTNERSHIP_TYPES).required())
            .field(FieldRule::text("proposal").required().length(50, 10_000))
            .field(FieldRule::url("website"))
            .field(FieldRule::file_reference("deck_attachment_id")),
        RequestSchema::new(RequestType::BoardNomination)
            .field(FieldRule::text("nominee_name").required().length(2, 120))
            .field(FieldRule::email("nominee_email").required())
            .field(FieldRule::text("nominee_bio").required().length(100, 5000))
            .field(FieldRule::enumeration("relationship", NOMINATION_RELATIONSHIPS).required())
            .field(FieldRule::integer("shares_held").range(0, 1_000_000_000))
            .field(FieldRule::file_reference("cv_attachment_id"))
            .min_attachments(1),
        RequestSchema::new(RequestType::Signup)
            .field(FieldRule::text("full_name").required().length(2, 120))
            .field(FieldRule::email("email").required())
            .field(FieldRule::phone("phone"))
            .field(FieldRule::enumeration("investor_type", INVESTOR_TYPES).required())
            .field(
                FieldRule::text("country")
                    .required()
                    .uppercase()
                    .pattern(COUNTRY_CODE_PATTERN),
            )
            .field(FieldRule::boolean("accredited").default_value(false)),
    ]
}
