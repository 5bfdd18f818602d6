use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::branch::BranchId;
use crate::domain::client::ClientId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Quote,
    Receipt,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Quote => "quote",
            Self::Receipt => "receipt",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "invoice" => Some(Self::Invoice),
            "quote" => Some(Self::Quote),
            "receipt" => Some(Self::Receipt),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::Quote => "Quote",
            Self::Receipt => "Receipt",
        }
    }

    pub fn number_prefix(self) -> &'static str {
        match self {
            Self::Invoice => "INV",
            Self::Quote => "QUO",
            Self::Receipt => "RCT",
        }
    }

    /// Receipts acknowledge money already taken; VAT is never added to them.
    pub fn carries_vat(self) -> bool {
        !matches!(self, Self::Receipt)
    }

    /// Document numbers are the zero-padded counter value under the kind
    /// prefix, e.g. the first invoice of a tenant is `INV-000001`.
    pub fn format_number(self, seq: i64) -> String {
        format!("{}-{seq:06}", self.number_prefix())
    }
}

/// One pending line of a document draft, living in session data until the
/// confirm state commits it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_pct: Option<Decimal>,
}

impl DraftItem {
    pub fn line_total(&self) -> Decimal {
        let gross = self.quantity * self.unit_price;
        let discounted = match self.discount_pct {
            Some(pct) if pct > Decimal::ZERO => gross * (Decimal::ONE_HUNDRED - pct) / Decimal::ONE_HUNDRED,
            _ => gross,
        };
        discounted.round_dp(2)
    }

    /// Quantities and prices must be non-negative at the moment a document
    /// is committed; the collecting states reject bad input earlier, this is
    /// the last line of defence before persistence.
    pub fn is_committable(&self) -> bool {
        !self.description.trim().is_empty()
            && self.quantity > Decimal::ZERO
            && self.unit_price >= Decimal::ZERO
            && self
                .discount_pct
                .map_or(true, |pct| (Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&pct))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

/// Compute document totals: per-line discounts inside `line_total`, then the
/// document discount percentage, then VAT on the discounted base. VAT is
/// skipped for receipts, and a configured zero rate produces no VAT line.
pub fn compute_totals(
    items: &[DraftItem],
    discount_pct: Decimal,
    vat_rate: Decimal,
    kind: DocumentKind,
) -> Totals {
    let subtotal: Decimal = items.iter().map(DraftItem::line_total).sum();
    let discount = (subtotal * discount_pct / Decimal::ONE_HUNDRED).round_dp(2);
    let base = subtotal - discount;
    let vat = if kind.carries_vat() && vat_rate > Decimal::ZERO {
        (base * vat_rate / Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    };
    Totals { subtotal, discount, vat, total: base + vat }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Issued,
    PartiallyPaid,
    Paid,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "issued" => Some(Self::Issued),
            "partially_paid" => Some(Self::PartiallyPaid),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// A committed, immutable business document. `draft_generation` is the uuid
/// minted when its draft flow started; committing the same generation twice
/// yields the original document instead of a duplicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub kind: DocumentKind,
    pub seq: i64,
    pub number: String,
    pub client_id: Option<ClientId>,
    pub client_name: String,
    pub totals: Totals,
    pub status: DocumentStatus,
    pub draft_generation: Uuid,
    pub issued_by: String,
    pub artifact_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub position: i64,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_pct: Option<Decimal>,
    pub line_total: Decimal,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{compute_totals, DocumentKind, DraftItem};

    fn item(quantity: i64, unit_price: i64) -> DraftItem {
        DraftItem {
            description: "Website design".to_owned(),
            quantity: Decimal::from(quantity),
            unit_price: Decimal::from(unit_price),
            discount_pct: None,
        }
    }

    #[test]
    fn totals_default_to_plain_sum_without_discount_or_vat() {
        let totals = compute_totals(
            &[item(2, 1500), item(1, 500)],
            Decimal::ZERO,
            Decimal::ZERO,
            DocumentKind::Invoice,
        );
        assert_eq!(totals.subtotal, Decimal::from(3500));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.vat, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::from(3500));
    }

    #[test]
    fn discount_applies_before_vat() {
        let totals = compute_totals(
            &[item(1, 1000)],
            Decimal::from(10),
            Decimal::from(16),
            DocumentKind::Invoice,
        );
        assert_eq!(totals.discount, Decimal::from(100));
        assert_eq!(totals.vat, Decimal::from(144));
        assert_eq!(totals.total, Decimal::from(1044));
    }

    #[test]
    fn receipts_never_carry_vat() {
        let totals = compute_totals(
            &[item(1, 1000)],
            Decimal::ZERO,
            Decimal::from(16),
            DocumentKind::Receipt,
        );
        assert_eq!(totals.vat, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::from(1000));
    }

    #[test]
    fn zero_configured_rate_produces_no_vat_line() {
        let totals =
            compute_totals(&[item(1, 1000)], Decimal::ZERO, Decimal::ZERO, DocumentKind::Quote);
        assert_eq!(totals.vat, Decimal::ZERO);
    }

    #[test]
    fn per_line_discount_is_applied_inside_the_line() {
        let discounted = DraftItem { discount_pct: Some(Decimal::from(25)), ..item(2, 1000) };
        assert_eq!(discounted.line_total(), Decimal::from(1500));
    }

    #[test]
    fn committable_rejects_non_positive_quantities() {
        assert!(item(1, 0).is_committable());
        assert!(!item(0, 100).is_committable());
        let negative = DraftItem { unit_price: Decimal::from(-5), ..item(1, 0) };
        assert!(!negative.is_committable());
    }

    #[test]
    fn first_document_number_has_six_digit_suffix() {
        assert_eq!(DocumentKind::Invoice.format_number(1), "INV-000001");
        assert_eq!(DocumentKind::Quote.format_number(42), "QUO-000042");
        assert_eq!(DocumentKind::Receipt.format_number(1_000_000), "RCT-1000000");
    }
}
