//! Typed request payloads, one variant per [`RequestType`].
//!
//! Payloads are only ever constructed from values the
//! [`TypeRegistry`](crate::registry::TypeRegistry) has already normalized, so the structs below
//! hold canonical data (trimmed, case-folded, defaults applied).

use crate::ids::AttachmentId;
use crate::request::RequestType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feedback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low.
    Low,
    /// Medium (default).
    #[default]
    Medium,
    /// High.
    High,
}

/// Feedback category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    /// About the product.
    Product,
    /// About service quality.
    Service,
    /// About investor relations.
    InvestorRelations,
    /// Anything else.
    Other,
}

/// General feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    /// Short summary.
    pub subject: String,
    /// Body.
    pub message: String,
    /// Priority.
    pub priority: Priority,
    /// Optional category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FeedbackCategory>,
}

/// Kind of partnership proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnershipType {
    /// Capital investment.
    Investment,
    /// Strategic alliance.
    Strategic,
    /// Distribution agreement.
    Distribution,
    /// Technology partnership.
    Technology,
}

/// Partnership proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipPayload {
    /// Proposing company.
    pub company_name: String,
    /// Contact person.
    pub contact_name: String,
    /// Contact e-mail (lowercased).
    pub contact_email: String,
    /// Contact phone in national format.
    pub contact_phone: String,
    /// Kind of partnership.
    pub partnership_type: PartnershipType,
    /// Proposal text.
    pub proposal: String,
    /// Company website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Pitch deck attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_attachment_id: Option<AttachmentId>,
}

/// Nominator's relationship to the nominee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NominationRelationship {
    /// Self-nomination.
    #[serde(rename = "self")]
    SelfNomination,
    /// Nominated by a shareholder.
    Shareholder,
    /// Nominated by a sitting board member.
    BoardMember,
    /// External nomination.
    External,
}

/// Board nomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardNominationPayload {
    /// Candidate name.
    pub nominee_name: String,
    /// Candidate e-mail.
    pub nominee_email: String,
    /// Candidate biography.
    pub nominee_bio: String,
    /// Relationship of the nominator to the candidate.
    pub relationship: NominationRelationship,
    /// Shares held by the nominator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_held: Option<i64>,
    /// Candidate CV attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_attachment_id: Option<AttachmentId>,
}

/// Investor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestorType {
    /// Private individual.
    Individual,
    /// Institution.
    Institutional,
    /// Family office.
    FamilyOffice,
}

/// Investor signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupPayload {
    /// Full legal name.
    pub full_name: String,
    /// E-mail address.
    pub email: String,
    /// Phone in national format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Investor category.
    pub investor_type: InvestorType,
    /// ISO-3166 alpha-2 country code.
    pub country: String,
    /// Self-declared accreditation.
    pub accredited: bool,
}

/// Type-specific payload of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields", rename_all = "snake_case")]
pub enum RequestPayload {
    /// Board nomination.
    BoardNomination(BoardNominationPayload),
    /// Partnership proposal.
    Partnership(PartnershipPayload),
    /// Feedback.
    Feedback(FeedbackPayload),
    /// Signup.
    Signup(SignupPayload),
}

impl RequestPayload {
    /// The request type this payload belongs to.
    #[must_use]
    pub const fn request_type(&self) -> RequestType {
        match self {
            Self::BoardNomination(_) => RequestType::BoardNomination,
            Self::Partnership(_) => RequestType::Partnership,
            Self::Feedback(_) => RequestType::Feedback,
            Self::Signup(_) => RequestType::Signup,
        }
    }

    /// Build the typed variant for `request_type` from a normalized field map.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error if `fields` does not fit the variant's struct.
    pub fn from_fields(request_type: RequestType, fields: Value) -> Result<Self, serde_json::Error> {
        Ok(match request_type {
            RequestType::BoardNomination => Self::BoardNomination(serde_json::from_value(fields)?),
            RequestType::Partnership => Self::Partnership(serde_json::from_value(fields)?),
            RequestType::Feedback => Self::Feedback(serde_json::from_value(fields)?),
            RequestType::Signup => Self::Signup(serde_json::from_value(fields)?),
        })
    }

    /// The payload as a flat field map (the shape clients submit).
    ///
    /// # Errors
    ///
    /// Returns the serialization error; this cannot happen for the payload structs above but the
    /// signature stays honest.
    pub fn to_fields(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::BoardNomination(p) => serde_json::to_value(p),
            Self::Partnership(p) => serde_json::to_value(p),
            Self::Feedback(p) => serde_json::to_value(p),
            Self::Signup(p) => serde_json::to_value(p),
        }
    }
}
