use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dialog::session::DialogSession;
use crate::domain::document::DocumentKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscription tier. The trial window grants `Premium` until it lapses so
/// a new business can exercise every flow before choosing a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Package {
    Starter,
    Business,
    Premium,
}

impl Package {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Business => "business",
            Self::Premium => "premium",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starter" => Some(Self::Starter),
            "business" => Some(Self::Business),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Business => "Business",
            Self::Premium => "Premium",
        }
    }
}

/// Package-gated capabilities. Functionality outside this list is available
/// on every tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    ExpenseReports,
    MultiBranch,
    UserInvites,
    LogoUpload,
}

impl Feature {
    pub fn label(self) -> &'static str {
        match self {
            Self::ExpenseReports => "expense reports",
            Self::MultiBranch => "multiple branches",
            Self::UserInvites => "team invitations",
            Self::LogoUpload => "logo on documents",
        }
    }

    /// The cheapest package that unlocks the feature, used by the upgrade
    /// message.
    pub fn minimum_package(self) -> Package {
        match self {
            Self::ExpenseReports | Self::UserInvites | Self::LogoUpload => Package::Business,
            Self::MultiBranch => Package::Premium,
        }
    }
}

/// A business account: the unit of billing, numbering and dialog-state
/// isolation. `session` and the document counters are owned exclusively by
/// the dialog router and finalizer; everything else treats them as opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub currency: String,
    pub package: Package,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub vat_rate: Decimal,
    pub logo_url: Option<String>,
    pub invoice_seq: i64,
    pub quote_seq: i64,
    pub receipt_seq: i64,
    pub session: DialogSession,
    pub state_version: i64,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// The tier the feature gate evaluates: the paid package, or `Premium`
    /// while the trial window is open.
    pub fn effective_package(&self, now: DateTime<Utc>) -> Package {
        match self.trial_ends_at {
            Some(ends_at) if now < ends_at => Package::Premium.max(self.package),
            _ => self.package,
        }
    }

    pub fn counter(&self, kind: DocumentKind) -> i64 {
        match kind {
            DocumentKind::Invoice => self.invoice_seq,
            DocumentKind::Quote => self.quote_seq,
            DocumentKind::Receipt => self.receipt_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::dialog::session::DialogSession;

    use super::{Feature, Package, Tenant, TenantId};

    fn tenant(package: Package, trial_days_left: Option<i64>) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: TenantId(Uuid::new_v4()),
            name: "Mama Njeri Tailors".to_owned(),
            currency: "KES".to_owned(),
            package,
            trial_ends_at: trial_days_left.map(|days| now + Duration::days(days)),
            vat_rate: Decimal::ZERO,
            logo_url: None,
            invoice_seq: 0,
            quote_seq: 0,
            receipt_seq: 0,
            session: DialogSession::ready(),
            state_version: 0,
            created_at: now,
        }
    }

    #[test]
    fn trial_window_grants_premium() {
        let tenant = tenant(Package::Starter, Some(7));
        assert_eq!(tenant.effective_package(Utc::now()), Package::Premium);
    }

    #[test]
    fn lapsed_trial_falls_back_to_paid_package() {
        let tenant = tenant(Package::Starter, Some(-1));
        assert_eq!(tenant.effective_package(Utc::now()), Package::Starter);
    }

    #[test]
    fn package_parse_round_trips() {
        for package in [Package::Starter, Package::Business, Package::Premium] {
            assert_eq!(Package::parse(package.as_str()), Some(package));
        }
        assert_eq!(Package::parse("gold"), None);
    }

    #[test]
    fn every_feature_names_an_unlocking_package() {
        for feature in [
            Feature::ExpenseReports,
            Feature::MultiBranch,
            Feature::UserInvites,
            Feature::LogoUpload,
        ] {
            assert!(feature.minimum_package() > Package::Starter);
        }
    }
}
