use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::branch::BranchId;
use crate::domain::tenant::TenantId;
use crate::msisdn::Msisdn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Clerk,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Clerk => "clerk",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "manager" => Some(Self::Manager),
            "clerk" => Some(Self::Clerk),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Manager => "Manager",
            Self::Clerk => "Clerk",
        }
    }
}

/// The gated areas of the assistant. Every non-ready dialog state belongs to
/// exactly one section; the access gate is consulted against it on every
/// turn, not only at flow entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Documents,
    Payments,
    Expenses,
    Clients,
    Reports,
    Settings,
    Team,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Payments => "payments",
            Self::Expenses => "expenses",
            Self::Clients => "clients",
            Self::Reports => "reports",
            Self::Settings => "settings",
            Self::Team => "team",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Documents => "invoices & documents",
            Self::Payments => "payments",
            Self::Expenses => "expenses",
            Self::Clients => "clients",
            Self::Reports => "reports",
            Self::Settings => "business settings",
            Self::Team => "team & branches",
        }
    }
}

/// A role binding between a phone identity and a tenant. While `pending` is
/// set the holder was invited but has not sent the join action; a pending
/// principal never resolves as an active identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub phone: Msisdn,
    pub role: Role,
    pub branch_id: Option<BranchId>,
    pub pending: bool,
    pub invite_code: Option<String>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        !self.pending
    }
}
