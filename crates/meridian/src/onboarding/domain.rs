use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Identifier wrapper for partner applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier of a provisioned account profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub String);

/// Kind of partner the applicant wants to onboard as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Artist,
    Label,
}

impl AccountType {
    pub const fn label(self) -> &'static str {
        match self {
            AccountType::Artist => "artist",
            AccountType::Label => "label",
        }
    }
}

/// Applicant contact details collected at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Free-form intake answers carried for staff review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeDetails {
    #[serde(default)]
    pub catalog_size: Option<String>,
    #[serde(default)]
    pub current_distributor: Option<String>,
    #[serde(default)]
    pub distribution_goals: Option<String>,
    #[serde(default)]
    pub marketing_budget: Option<String>,
    #[serde(default)]
    pub team_size: Option<String>,
    #[serde(default)]
    pub revenue_sources: Vec<String>,
    pub motivation: String,
    #[serde(default)]
    pub additional_info: Option<String>,
}

/// The reviewed profile of a prospective partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub account_type: AccountType,
    pub contact: ContactInfo,
    /// Artist name or label name, depending on account type.
    pub entity_name: String,
    #[serde(default)]
    pub country: Option<String>,
    pub intake: IntakeDetails,
}

/// Lifecycle state of an application.
///
/// Legal edges: `pending -> approved`, `pending -> denied`,
/// `approved -> payment_complete`. Nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    Pending,
    Approved,
    Denied,
    PaymentComplete,
}

impl ApplicationState {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationState::Pending => "pending",
            ApplicationState::Approved => "approved",
            ApplicationState::Denied => "denied",
            ApplicationState::PaymentComplete => "payment_complete",
        }
    }

    /// Terminal states accept no further staff or provider transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationState::Denied | ApplicationState::PaymentComplete
        )
    }

    /// States counted toward the one-active-application-per-email rule.
    pub const fn is_active(self) -> bool {
        !matches!(self, ApplicationState::Denied)
    }
}

/// Staff decision over a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
}

/// Single-use capability authorizing checkout for one approved application.
///
/// Comparison goes through [`PaymentToken::matches`], which is
/// constant-time; the raw value never appears in logs or summaries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentToken(pub String);

impl PaymentToken {
    /// Constant-time equality against a caller-supplied candidate.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl std::fmt::Debug for PaymentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PaymentToken(..)")
    }
}

/// One partner application and its full lifecycle record.
///
/// Mutated only through the store's compare-and-swap transition; never
/// deleted, so the audit fields survive every terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub profile: ApplicantProfile,
    pub state: ApplicationState,
    #[serde(default)]
    pub payment_link_token: Option<PaymentToken>,
    #[serde(default)]
    pub payment_link_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_notes: Option<String>,
    #[serde(default)]
    pub profile_id: Option<ProfileId>,
}

impl Application {
    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            application_id: self.id.clone(),
            state: self.state.label(),
            email: self.profile.contact.email.clone(),
            name: self.profile.contact.full_name(),
            account_type: self.profile.account_type,
            entity_name: self.profile.entity_name.clone(),
        }
    }

    pub fn detail(&self) -> ApplicationDetail {
        ApplicationDetail {
            application_id: self.id.clone(),
            state: self.state.label(),
            profile: self.profile.clone(),
            payment_link_issued: self.payment_link_token.is_some(),
            payment_link_sent_at: self.payment_link_sent_at,
            created_at: self.created_at,
            reviewed_at: self.reviewed_at,
            review_notes: self.review_notes.clone(),
            profile_id: self.profile_id.clone(),
        }
    }
}

/// Staff-facing view of the whole record for the review console.
///
/// Includes the intake answers and audit fields; the token value is
/// reduced to an issued flag so it never crosses the API.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    pub application_id: ApplicationId,
    pub state: &'static str,
    pub profile: ApplicantProfile,
    pub payment_link_issued: bool,
    pub payment_link_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub profile_id: Option<ProfileId>,
}

/// Sanitized application view for API responses and notifications.
///
/// Deliberately excludes the payment token and intake free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub application_id: ApplicationId,
    pub state: &'static str,
    pub email: String,
    pub name: String,
    pub account_type: AccountType,
    pub entity_name: String,
}
