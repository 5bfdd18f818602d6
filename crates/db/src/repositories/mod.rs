use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use karani_core::dialog::session::DialogSession;
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::client::{Client, ClientId, Product, ProductId};
use karani_core::domain::document::{
    Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus,
};
use karani_core::domain::money::{Expense, ExpenseCategory, Payment};
use karani_core::domain::principal::Principal;
use karani_core::domain::tenant::{Tenant, TenantId};
use karani_core::msisdn::Msisdn;

pub mod client;
pub mod document;
pub mod expense;
pub mod membership;
pub mod memory;
pub mod tenant;

pub use client::SqlClientRepository;
pub use document::SqlDocumentRepository;
pub use expense::SqlExpenseRepository;
pub use membership::SqlMembershipRepository;
pub use memory::{
    InMemoryClientRepository, InMemoryDocumentRepository, InMemoryExpenseRepository,
    InMemoryMembershipRepository, InMemoryTenantRepository,
};
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stale state version for tenant {tenant_id}")]
    StaleVersion { tenant_id: TenantId },
}

/// An invoice with money still owed on it, as presented by the payment
/// flow's pick list.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenInvoice {
    pub document: Document,
    pub outstanding: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SalesSummary {
    pub document_count: i64,
    pub total: Decimal,
    pub paid: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpenseSummary {
    pub expense_count: i64,
    pub total: Decimal,
    pub by_category: Vec<(ExpenseCategory, Decimal)>,
}

/// Tenants, their branches, and the dialog state / counters the router and
/// finalizer own. `save_session` carries the optimistic version check;
/// `allocate_seq` is the atomic increment-and-read behind document numbers.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError>;
    async fn create(&self, tenant: &Tenant) -> Result<(), RepositoryError>;

    /// Persist the dialog position. Fails with `StaleVersion` when another
    /// turn has written since `expected_version` was read; the caller
    /// retries its whole turn rather than overwriting.
    async fn save_session(
        &self,
        id: &TenantId,
        session: &DialogSession,
        expected_version: i64,
    ) -> Result<i64, RepositoryError>;

    /// Increment the counter for `kind` and return the new value in one
    /// statement. Values are never reused, even when the surrounding
    /// commit later fails.
    async fn allocate_seq(
        &self,
        id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError>;

    /// Update the mutable business profile fields (name, currency, VAT
    /// rate, logo). Dialog state and counters are untouched.
    async fn update_profile(&self, tenant: &Tenant) -> Result<(), RepositoryError>;

    async fn list_branches(&self, id: &TenantId) -> Result<Vec<Branch>, RepositoryError>;
    async fn create_branch(&self, branch: &Branch) -> Result<(), RepositoryError>;
    async fn find_branch(&self, id: &BranchId) -> Result<Option<Branch>, RepositoryError>;
}

/// Principals, the phone→tenant binding, and the signup sessions that hold
/// onboarding dialog state before any tenant row exists.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_binding(&self, phone: &Msisdn) -> Result<Option<TenantId>, RepositoryError>;
    async fn upsert_binding(
        &self,
        phone: &Msisdn,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// The non-pending principal for this phone at this tenant, if any. A
    /// pending invite never resolves here.
    async fn find_active_principal(
        &self,
        tenant_id: &TenantId,
        phone: &Msisdn,
    ) -> Result<Option<Principal>, RepositoryError>;

    async fn find_pending_by_code(
        &self,
        invite_code: &str,
    ) -> Result<Option<Principal>, RepositoryError>;

    async fn save_principal(&self, principal: &Principal) -> Result<(), RepositoryError>;

    async fn load_signup(&self, phone: &Msisdn) -> Result<Option<DialogSession>, RepositoryError>;
    async fn save_signup(
        &self,
        phone: &Msisdn,
        session: &DialogSession,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn delete_signup(&self, phone: &Msisdn) -> Result<(), RepositoryError>;
}

/// Tenant-scoped clients and the saved product catalogue.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError>;
    async fn find(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn create(&self, client: &Client) -> Result<(), RepositoryError>;

    async fn list_products(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Product>, RepositoryError>;
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn create_product(&self, product: &Product) -> Result<(), RepositoryError>;
}

/// Committed documents, their lines, and payments against invoices.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert the document and its lines as one transaction.
    async fn insert(
        &self,
        document: &Document,
        lines: &[DocumentLine],
    ) -> Result<(), RepositoryError>;

    async fn find(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// The document committed under this draft generation, if the confirm
    /// already ran. This is the idempotency check for redelivered confirms.
    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Document>, RepositoryError>;

    async fn list_lines(&self, id: &DocumentId) -> Result<Vec<DocumentLine>, RepositoryError>;

    /// Invoices with outstanding balance, most recent first.
    async fn list_open_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<OpenInvoice>, RepositoryError>;

    async fn paid_total(&self, id: &DocumentId) -> Result<Decimal, RepositoryError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError>;
    async fn find_payment_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
    ) -> Result<(), RepositoryError>;

    async fn update_artifact(
        &self,
        id: &DocumentId,
        artifact_url: &str,
    ) -> Result<(), RepositoryError>;

    async fn sales_summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<SalesSummary, RepositoryError>;
}

/// Recorded expenses and their period aggregates.
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError>;
    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Expense>, RepositoryError>;
    async fn summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<ExpenseSummary, RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

pub(crate) fn parse_uuid(column: &str, value: String) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid uuid in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_uuid(
    column: &str,
    value: Option<String>,
) -> Result<Option<Uuid>, RepositoryError> {
    value.map(|raw| parse_uuid(column, raw)).transpose()
}
