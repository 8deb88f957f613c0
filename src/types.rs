// =============================================================================
// Shared domain types — assets, owners, indicators, RRAs, risk documents
// =============================================================================
//
// Likelihood and impact labels are modeled as enums rather than bare strings
// so that an invalid label is a parse-time error, not a runtime surprise
// three modules downstream.
// =============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Asset kind — a host or a website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Hostname,
    Website,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Website => "website",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "hostname" => Ok(Self::Hostname),
            "website" => Ok(Self::Website),
            other => Err(AppError::Invalid(format!("unknown asset type '{other}'"))),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Likelihood / impact label. Raw values per spec.md §3: unknown=0, low=1,
/// medium=2, high=3, maximum=4 — except `calc_value()` treats `unknown` as
/// `low` wherever it feeds a risk calculation, matching
/// servicelib/rra.go::ImpactValueFromLabel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Unknown,
    Low,
    Medium,
    High,
    Maximum,
}

impl Label {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "maximum" => Ok(Self::Maximum),
            other => Err(AppError::Invalid(format!("invalid label '{other}'"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Maximum => "maximum",
        }
    }

    /// The raw ordinal value: unknown=0 .. maximum=4.
    pub fn raw_value(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
            Self::Maximum => 4.0,
        }
    }

    /// Value used in risk calculations; `unknown` folds to `low` so that
    /// unset attributes and unknown indicator likelihoods still contribute
    /// a minimal score instead of dropping out of consideration entirely.
    pub fn calc_value(self) -> f64 {
        match self {
            Self::Unknown => Self::Low.raw_value(),
            other => other.raw_value(),
        }
    }

    /// Converts a finalized numeric score back to a label using the
    /// thresholds in spec.md §4.E step 4 (>=13 maximum, >=9 high, >=5
    /// medium, else low). No `unknown` branch — this only ever applies to
    /// a real computed score.
    pub fn from_score(v: f64) -> Self {
        if v >= 13.0 {
            Self::Maximum
        } else if v >= 9.0 {
            Self::High
        } else if v >= 5.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default data classification for an RRA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataClass {
    Unknown,
    Public,
    ConfidentialInternal,
    ConfidentialRestricted,
    ConfidentialSecret,
}

impl DataClass {
    /// Normalizes a raw, free-text default-data-class string per spec.md
    /// §4.C: lowercase, then fold the legacy short forms into their full
    /// "confidential ..." names.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => Self::Public,
            "internal" | "confidential internal" => Self::ConfidentialInternal,
            "restricted" | "confidential restricted" => Self::ConfidentialRestricted,
            "secret" | "confidential secret" => Self::ConfidentialSecret,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Public => "public",
            Self::ConfidentialInternal => "confidential internal",
            Self::ConfidentialRestricted => "confidential restricted",
            Self::ConfidentialSecret => "confidential secret",
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Public => 1.0,
            Self::ConfidentialInternal => 2.0,
            Self::ConfidentialRestricted => 3.0,
            Self::ConfidentialSecret => 4.0,
        }
    }
}

/// A tracked asset (host or website).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub asset_type: AssetType,
    pub name: String,
    pub zone: String,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub last_indicator: Option<DateTime<Utc>>,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
}

/// Ownership details attached to an asset. `operator`/`team` default to the
/// literal "unset" and `triage_key` to "unset-unset" for an unowned asset,
/// per spec.md §4.B `get_asset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default, rename = "triagekey")]
    pub triage_key: Option<String>,
}

impl Owner {
    pub fn unset() -> Self {
        Self {
            operator: Some("unset".to_string()),
            team: Some("unset".to_string()),
            triage_key: Some("unset-unset".to_string()),
        }
    }
}

/// A single stored indicator row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub id: i64,
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_source: String,
    pub likelihood: Label,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Raw indicator document as submitted by an external publisher
/// (spec.md §6 "Indicator document").
#[derive(Debug, Clone, Deserialize)]
pub struct RawIndicator {
    pub asset_type: String,
    pub asset_identifier: String,
    pub zone: String,
    pub timestamp_utc: DateTime<Utc>,
    pub event_source_name: String,
    pub likelihood_indicator: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl RawIndicator {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.asset_identifier.trim().is_empty() {
            return Err(AppError::Invalid("asset_identifier is required".into()));
        }
        if self.event_source_name.trim().is_empty() {
            return Err(AppError::Invalid("event_source_name is required".into()));
        }
        AssetType::parse(&self.asset_type)?;
        Label::parse(&self.likelihood_indicator)?;
        Ok(())
    }
}

/// A named bag of assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A fully populated Risk/Relationship Assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rra {
    pub id: i64,
    pub service_name: String,
    pub last_updated: DateTime<Utc>,
    pub default_data_class: DataClass,

    pub availability_reputation: RraCell,
    pub availability_productivity: RraCell,
    pub availability_financial: RraCell,
    pub integrity_reputation: RraCell,
    pub integrity_productivity: RraCell,
    pub integrity_financial: RraCell,
    pub confidentiality_reputation: RraCell,
    pub confidentiality_productivity: RraCell,
    pub confidentiality_financial: RraCell,

    #[serde(default)]
    pub raw_document: serde_json::Value,
    #[serde(default)]
    pub groups: Vec<AssetGroup>,
}

/// One (impact, probability) attribute cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RraCell {
    pub impact: Label,
    pub probability: Label,
}

/// Minimal RRA header, as returned by `list_latest_rras`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RraHeader {
    pub id: i64,
    pub service_name: String,
    pub last_updated: DateTime<Utc>,
    pub default_data_class: DataClass,
}

/// Raw RRA document as submitted to `/rra/update` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRra {
    pub details: RawRraDetails,
    pub lastmodified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraDetails {
    pub metadata: RawRraMetadata,
    pub risk: RawRraRisk,
    pub data: RawRraData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraMetadata {
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraData {
    pub default: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraRisk {
    pub availability: RawRraAttr,
    pub integrity: RawRraAttr,
    pub confidentiality: RawRraAttr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraAttr {
    pub reputation: RawRraMeasure,
    pub finances: RawRraMeasure,
    pub productivity: RawRraMeasure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRraMeasure {
    pub impact: String,
    #[serde(default)]
    pub probability: String,
}

impl RawRra {
    /// Normalizes and validates the raw document, returning the service
    /// name, default data class, and the nine (impact, probability) cells
    /// in a fixed order: av-rep, av-prod, av-fin, it-rep, it-prod, it-fin,
    /// cf-rep, cf-prod, cf-fin.
    pub fn validate(&self) -> Result<(String, DataClass, [RraCell; 9]), AppError> {
        let service = self.details.metadata.service.replace('\n', " ");
        let service = service.trim().to_string();
        if service.is_empty() {
            return Err(AppError::Invalid("details.metadata.service is required".into()));
        }

        let data_class = DataClass::normalize(&self.details.data.default);

        let measure = |m: &RawRraMeasure| -> Result<RraCell, AppError> {
            let impact = Label::parse(&m.impact)?;
            let probability = if m.probability.trim().is_empty() {
                Label::Unknown
            } else {
                Label::parse(&m.probability)?
            };
            Ok(RraCell { impact, probability })
        };

        let risk = &self.details.risk;
        let cells = [
            measure(&risk.availability.reputation)?,
            measure(&risk.availability.productivity)?,
            measure(&risk.availability.finances)?,
            measure(&risk.integrity.reputation)?,
            measure(&risk.integrity.productivity)?,
            measure(&risk.integrity.finances)?,
            measure(&risk.confidentiality.reputation)?,
            measure(&risk.confidentiality.productivity)?,
            measure(&risk.confidentiality.finances)?,
        ];

        Ok((service, data_class, cells))
    }
}

/// One (impact, probability, score) contribution to a risk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScenario {
    pub name: String,
    pub impact: f64,
    pub probability: f64,
    pub score: f64,
}

/// The RRA attribute selected as dominant for risk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsedAttribute {
    pub attribute: String,
    pub impact: f64,
    pub probability: f64,
}

/// A computed risk document for one RRA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDocument {
    pub rra_id: i64,
    pub rra_name: String,
    pub used_attribute: UsedAttribute,
    pub scenarios: Vec<RiskScenario>,

    pub impact: f64,
    pub impact_label: String,
    pub median: f64,
    pub median_label: String,
    pub average: f64,
    pub average_label: String,
    pub worst_case: f64,
    pub worst_case_label: String,
    pub data_classification: f64,

    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

/// API capability bits attached to an authenticated key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiCapabilities {
    pub read_risk: bool,
    pub read_owner: bool,
    pub write_indicator: bool,
    pub write_rra: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetGroupsResponse {
    pub groups: Vec<AssetGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RrasResponse {
    pub rras: Vec<RraHeader>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RisksResponse {
    pub risks: Vec<RiskDocument>,
}
