//! Socio records on both sides of the sync and the mapping between them.

use crate::config::SyncDefaults;
use serde::{Deserialize, Serialize};

/// A partner/stakeholder row from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub company_code: i32,
    pub participation_percent: f64,
    pub is_administrator: bool,
    pub administrator_role: String,
    /// Join key (DNI). Empty means the record is invalid.
    pub national_id: String,
    pub legal_name: String,
}

impl SourceRecord {
    /// A record can be synced only when it carries a national ID.
    pub fn is_valid(&self) -> bool {
        !self.national_id.is_empty()
    }

    /// Map to the representation the CRM stores.
    pub fn to_remote(&self) -> RemoteRecord {
        let administrator_role = if self.administrator_role.is_empty() {
            SyncDefaults::FALLBACK_ROLE.to_string()
        } else {
            self.administrator_role.clone()
        };

        let display_title = if self.legal_name.is_empty() {
            self.national_id.clone()
        } else {
            self.legal_name.clone()
        };

        RemoteRecord {
            remote_id: None,
            display_title,
            national_id: self.national_id.clone(),
            administrator_role,
            administrator_flag: administrator_flag(self.is_administrator).to_string(),
            participation_percent: format_participation(self.participation_percent),
            legal_name: self.legal_name.clone(),
        }
    }
}

impl std::fmt::Display for SourceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Socio{{DNI: {}, RazonSocial: {}}}",
            self.national_id, self.legal_name
        )
    }
}

/// An item of the CRM custom-entity collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Assigned by the CRM once the item exists.
    pub remote_id: Option<i64>,
    pub display_title: String,
    pub national_id: String,
    pub administrator_role: String,
    /// "Y" or "N".
    pub administrator_flag: String,
    /// Fixed two-decimal form, e.g. "12.50".
    pub participation_percent: String,
    pub legal_name: String,
}

impl RemoteRecord {
    /// Whether the CRM copy differs from what `source` maps to.
    ///
    /// Only the four mutable fields are compared; the title is derived and
    /// the id is structural.
    pub fn needs_update(&self, source: &SourceRecord) -> bool {
        let expected = source.to_remote();
        self.administrator_role != expected.administrator_role
            || self.administrator_flag != expected.administrator_flag
            || self.participation_percent != expected.participation_percent
            || self.legal_name != expected.legal_name
    }

    /// Rebuild a ledger-shaped record from the CRM copy.
    ///
    /// The CRM does not store the company code, so it comes back as 0.
    pub fn to_source(&self) -> SourceRecord {
        SourceRecord {
            company_code: 0,
            participation_percent: parse_participation(&self.participation_percent),
            is_administrator: self.administrator_flag == "Y",
            administrator_role: self.administrator_role.clone(),
            national_id: self.national_id.clone(),
            legal_name: self.legal_name.clone(),
        }
    }
}

fn administrator_flag(is_administrator: bool) -> &'static str {
    if is_administrator {
        "Y"
    } else {
        "N"
    }
}

/// Format a percentage with exactly two fractional digits.
pub fn format_participation(value: f64) -> String {
    format!("{:.2}", value)
}

/// Parse a CRM percentage string, falling back to 0.0.
pub fn parse_participation(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}
