use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::branch::BranchId;
use crate::domain::document::DocumentId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    Bank,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::MobileMoney => "mobile_money",
            Self::Bank => "bank",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cash" => Some(Self::Cash),
            "mobile_money" => Some(Self::MobileMoney),
            "bank" => Some(Self::Bank),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::MobileMoney => "Mobile money",
            Self::Bank => "Bank transfer",
        }
    }
}

/// Money received against a committed invoice. Carries the payment flow's
/// draft generation so a redelivered confirm cannot record it twice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub draft_generation: Uuid,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Stock,
    Rent,
    Salaries,
    Transport,
    Utilities,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [Self; 6] =
        [Self::Stock, Self::Rent, Self::Salaries, Self::Transport, Self::Utilities, Self::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Rent => "rent",
            Self::Salaries => "salaries",
            Self::Transport => "transport",
            Self::Utilities => "utilities",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stock => "Stock & supplies",
            Self::Rent => "Rent",
            Self::Salaries => "Salaries",
            Self::Transport => "Transport",
            Self::Utilities => "Utilities",
            Self::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub category: ExpenseCategory,
    pub description: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub draft_generation: Uuid,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Today,
    ThisWeek,
    ThisMonth,
}

impl ReportPeriod {
    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::ThisWeek => "This week",
            Self::ThisMonth => "This month",
        }
    }

    /// Resolve the period to a half-open UTC range `[start, end)` relative
    /// to `now`. Weeks start on Monday.
    pub fn range(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();
        let start = match self {
            Self::Today => start_of_day,
            Self::ThisWeek => {
                start_of_day - Duration::days(i64::from(now.weekday().num_days_from_monday()))
            }
            Self::ThisMonth => start_of_day - Duration::days(i64::from(now.day0())),
        };
        (start, start_of_day + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ExpenseCategory, PaymentMethod, ReportPeriod};

    #[test]
    fn payment_method_round_trips() {
        for method in [PaymentMethod::Cash, PaymentMethod::MobileMoney, PaymentMethod::Bank] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
    }

    #[test]
    fn expense_category_round_trips() {
        for category in ExpenseCategory::ALL {
            assert_eq!(ExpenseCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn period_ranges_cover_now() {
        // A Wednesday mid-month, mid-day.
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 14, 30, 0).single().expect("valid timestamp");
        for period in [ReportPeriod::Today, ReportPeriod::ThisWeek, ReportPeriod::ThisMonth] {
            let (start, end) = period.range(now);
            assert!(start <= now && now < end, "{period:?} must contain now");
        }

        let (week_start, _) = ReportPeriod::ThisWeek.range(now);
        assert_eq!(week_start, Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).single().unwrap());
        let (month_start, _) = ReportPeriod::ThisMonth.range(now);
        assert_eq!(month_start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap());
    }
}
