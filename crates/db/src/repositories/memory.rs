use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use karani_core::dialog::session::DialogSession;
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::client::{Client, ClientId, Product, ProductId};
use karani_core::domain::document::{
    Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus,
};
use karani_core::domain::money::{Expense, Payment};
use karani_core::domain::principal::Principal;
use karani_core::domain::tenant::{Tenant, TenantId};
use karani_core::msisdn::Msisdn;

use super::{
    ClientRepository, DocumentRepository, ExpenseRepository, ExpenseSummary,
    MembershipRepository, OpenInvoice, RepositoryError, SalesSummary, TenantRepository,
};

fn duplicate(entity: &str) -> RepositoryError {
    RepositoryError::Decode(format!("duplicate {entity}"))
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
    branches: RwLock<HashMap<Uuid, Branch>>,
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        Ok(self.tenants.read().await.get(&id.0).cloned())
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), RepositoryError> {
        self.tenants.write().await.insert(tenant.id.0, tenant.clone());
        Ok(())
    }

    async fn save_session(
        &self,
        id: &TenantId,
        session: &DialogSession,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown tenant {id}")))?;
        if tenant.state_version != expected_version {
            return Err(RepositoryError::StaleVersion { tenant_id: *id });
        }
        tenant.session = session.clone();
        tenant.state_version += 1;
        Ok(tenant.state_version)
    }

    async fn allocate_seq(
        &self,
        id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown tenant {id}")))?;
        let seq = match kind {
            DocumentKind::Invoice => {
                tenant.invoice_seq += 1;
                tenant.invoice_seq
            }
            DocumentKind::Quote => {
                tenant.quote_seq += 1;
                tenant.quote_seq
            }
            DocumentKind::Receipt => {
                tenant.receipt_seq += 1;
                tenant.receipt_seq
            }
        };
        Ok(seq)
    }

    async fn update_profile(&self, tenant: &Tenant) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().await;
        let stored = tenants
            .get_mut(&tenant.id.0)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown tenant {}", tenant.id)))?;
        stored.name = tenant.name.clone();
        stored.currency = tenant.currency.clone();
        stored.vat_rate = tenant.vat_rate;
        stored.logo_url = tenant.logo_url.clone();
        stored.package = tenant.package;
        stored.trial_ends_at = tenant.trial_ends_at;
        Ok(())
    }

    async fn list_branches(&self, id: &TenantId) -> Result<Vec<Branch>, RepositoryError> {
        let branches = self.branches.read().await;
        let mut list: Vec<Branch> =
            branches.values().filter(|branch| branch.tenant_id == *id).cloned().collect();
        list.sort_by(|a, b| {
            b.is_default.cmp(&a.is_default).then(a.created_at.cmp(&b.created_at))
        });
        Ok(list)
    }

    async fn create_branch(&self, branch: &Branch) -> Result<(), RepositoryError> {
        self.branches.write().await.insert(branch.id.0, branch.clone());
        Ok(())
    }

    async fn find_branch(&self, id: &BranchId) -> Result<Option<Branch>, RepositoryError> {
        Ok(self.branches.read().await.get(&id.0).cloned())
    }
}

#[derive(Default)]
struct MembershipState {
    bindings: HashMap<String, TenantId>,
    principals: HashMap<Uuid, Principal>,
    signups: HashMap<String, DialogSession>,
}

#[derive(Default)]
pub struct InMemoryMembershipRepository {
    state: RwLock<MembershipState>,
}

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepository {
    async fn find_binding(&self, phone: &Msisdn) -> Result<Option<TenantId>, RepositoryError> {
        Ok(self.state.read().await.bindings.get(phone.as_str()).copied())
    }

    async fn upsert_binding(
        &self,
        phone: &Msisdn,
        tenant_id: &TenantId,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.state.write().await.bindings.insert(phone.as_str().to_owned(), *tenant_id);
        Ok(())
    }

    async fn find_active_principal(
        &self,
        tenant_id: &TenantId,
        phone: &Msisdn,
    ) -> Result<Option<Principal>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .values()
            .find(|principal| {
                principal.tenant_id == *tenant_id
                    && principal.phone == *phone
                    && !principal.pending
            })
            .cloned())
    }

    async fn find_pending_by_code(
        &self,
        invite_code: &str,
    ) -> Result<Option<Principal>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .values()
            .find(|principal| {
                principal.pending && principal.invite_code.as_deref() == Some(invite_code)
            })
            .cloned())
    }

    async fn save_principal(&self, principal: &Principal) -> Result<(), RepositoryError> {
        self.state.write().await.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn load_signup(&self, phone: &Msisdn) -> Result<Option<DialogSession>, RepositoryError> {
        Ok(self.state.read().await.signups.get(phone.as_str()).cloned())
    }

    async fn save_signup(
        &self,
        phone: &Msisdn,
        session: &DialogSession,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.state.write().await.signups.insert(phone.as_str().to_owned(), session.clone());
        Ok(())
    }

    async fn delete_signup(&self, phone: &Msisdn) -> Result<(), RepositoryError> {
        self.state.write().await.signups.remove(phone.as_str());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<Uuid, Client>>,
    products: RwLock<HashMap<Uuid, Product>>,
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        let mut list: Vec<Client> =
            clients.values().filter(|client| client.tenant_id == *tenant_id).cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn find(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.clients.read().await.get(&id.0).cloned())
    }

    async fn create(&self, client: &Client) -> Result<(), RepositoryError> {
        self.clients.write().await.insert(client.id.0, client.clone());
        Ok(())
    }

    async fn list_products(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        let mut list: Vec<Product> =
            products.values().filter(|product| product.tenant_id == *tenant_id).cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id.0).cloned())
    }

    async fn create_product(&self, product: &Product) -> Result<(), RepositoryError> {
        self.products.write().await.insert(product.id.0, product.clone());
        Ok(())
    }
}

#[derive(Default)]
struct DocumentState {
    documents: HashMap<Uuid, Document>,
    lines: HashMap<Uuid, Vec<DocumentLine>>,
    payments: HashMap<Uuid, Payment>,
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    state: RwLock<DocumentState>,
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(
        &self,
        document: &Document,
        lines: &[DocumentLine],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conflict = state.documents.values().any(|existing| {
            existing.draft_generation == document.draft_generation
                && existing.tenant_id == document.tenant_id
        });
        if conflict {
            return Err(duplicate("draft generation"));
        }
        state.documents.insert(document.id.0, document.clone());
        state.lines.insert(document.id.0, lines.to_vec());
        Ok(())
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.state.read().await.documents.get(&id.0).cloned())
    }

    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Document>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .find(|document| {
                document.tenant_id == *tenant_id && document.draft_generation == generation
            })
            .cloned())
    }

    async fn list_lines(&self, id: &DocumentId) -> Result<Vec<DocumentLine>, RepositoryError> {
        Ok(self.state.read().await.lines.get(&id.0).cloned().unwrap_or_default())
    }

    async fn list_open_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<OpenInvoice>, RepositoryError> {
        let state = self.state.read().await;
        let mut invoices: Vec<&Document> = state
            .documents
            .values()
            .filter(|document| {
                document.tenant_id == *tenant_id
                    && document.kind == DocumentKind::Invoice
                    && document.status != DocumentStatus::Paid
            })
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut open = Vec::new();
        for document in invoices.into_iter().take(limit.max(0) as usize) {
            let paid: Decimal = state
                .payments
                .values()
                .filter(|payment| payment.document_id == document.id)
                .map(|payment| payment.amount)
                .sum();
            let outstanding = document.totals.total - paid;
            if outstanding > Decimal::ZERO {
                open.push(OpenInvoice { document: document.clone(), outstanding });
            }
        }
        Ok(open)
    }

    async fn paid_total(&self, id: &DocumentId) -> Result<Decimal, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .filter(|payment| payment.document_id == *id)
            .map(|payment| payment.amount)
            .sum())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conflict = state.payments.values().any(|existing| {
            existing.draft_generation == payment.draft_generation
                && existing.tenant_id == payment.tenant_id
        });
        if conflict {
            return Err(duplicate("payment generation"));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|payment| {
                payment.tenant_id == *tenant_id && payment.draft_generation == generation
            })
            .cloned())
    }

    async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(document) = state.documents.get_mut(&id.0) {
            document.status = status;
        }
        Ok(())
    }

    async fn update_artifact(
        &self,
        id: &DocumentId,
        artifact_url: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(document) = state.documents.get_mut(&id.0) {
            document.artifact_url = Some(artifact_url.to_owned());
        }
        Ok(())
    }

    async fn sales_summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<SalesSummary, RepositoryError> {
        let state = self.state.read().await;
        let (start, end) = range;
        let mut summary = SalesSummary::default();

        for document in state.documents.values() {
            if document.tenant_id != *tenant_id
                || document.kind == DocumentKind::Quote
                || document.created_at < start
                || document.created_at >= end
            {
                continue;
            }
            if let Some(branch_id) = branch_id {
                if document.branch_id != Some(*branch_id) {
                    continue;
                }
            }
            summary.document_count += 1;
            summary.total += document.totals.total;
        }

        for payment in state.payments.values() {
            if payment.tenant_id == *tenant_id
                && payment.created_at >= start
                && payment.created_at < end
            {
                summary.paid += payment.amount;
            }
        }

        Ok(summary)
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<Uuid, Expense>>,
}

#[async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let conflict = expenses.values().any(|existing| {
            existing.draft_generation == expense.draft_generation
                && existing.tenant_id == expense.tenant_id
        });
        if conflict {
            return Err(duplicate("expense generation"));
        }
        expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .find(|expense| {
                expense.tenant_id == *tenant_id && expense.draft_generation == generation
            })
            .cloned())
    }

    async fn summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<ExpenseSummary, RepositoryError> {
        let expenses = self.expenses.read().await;
        let (start, end) = range;
        let mut summary = ExpenseSummary::default();

        for expense in expenses.values() {
            if expense.tenant_id != *tenant_id
                || expense.created_at < start
                || expense.created_at >= end
            {
                continue;
            }
            if let Some(branch_id) = branch_id {
                if expense.branch_id != Some(*branch_id) {
                    continue;
                }
            }
            summary.expense_count += 1;
            summary.total += expense.amount;
            match summary
                .by_category
                .iter_mut()
                .find(|(category, _)| *category == expense.category)
            {
                Some((_, bucket)) => *bucket += expense.amount,
                None => summary.by_category.push((expense.category, expense.amount)),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use karani_core::dialog::session::{DialogSession, DialogState, FlowData, PaymentFlow};
    use karani_core::domain::document::DocumentKind;
    use karani_core::domain::tenant::{Package, Tenant, TenantId};

    use super::InMemoryTenantRepository;
    use crate::repositories::{RepositoryError, TenantRepository};

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId(Uuid::new_v4()),
            name: "Pambo Decor".to_owned(),
            currency: "KES".to_owned(),
            package: Package::Starter,
            trial_ends_at: None,
            vat_rate: Decimal::ZERO,
            logo_url: None,
            invoice_seq: 0,
            quote_seq: 0,
            receipt_seq: 0,
            session: DialogSession::ready(),
            state_version: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_version_check_matches_sql_semantics() {
        let repo = InMemoryTenantRepository::default();
        let tenant = tenant();
        repo.create(&tenant).await.expect("create");

        let session = DialogSession::new(
            DialogState::PaymentInvoice,
            FlowData::Payment(PaymentFlow::start()),
        );
        assert_eq!(repo.save_session(&tenant.id, &session, 0).await.expect("save"), 1);
        assert!(matches!(
            repo.save_session(&tenant.id, &DialogSession::ready(), 0).await,
            Err(RepositoryError::StaleVersion { .. })
        ));
    }

    #[tokio::test]
    async fn in_memory_counters_are_independent_per_kind() {
        let repo = InMemoryTenantRepository::default();
        let tenant = tenant();
        repo.create(&tenant).await.expect("create");

        assert_eq!(repo.allocate_seq(&tenant.id, DocumentKind::Invoice).await.expect("seq"), 1);
        assert_eq!(repo.allocate_seq(&tenant.id, DocumentKind::Receipt).await.expect("seq"), 1);
        assert_eq!(repo.allocate_seq(&tenant.id, DocumentKind::Invoice).await.expect("seq"), 2);

        let stored = repo.find(&tenant.id).await.expect("find").expect("exists");
        assert_eq!(stored.invoice_seq, 2);
        assert_eq!(stored.receipt_seq, 1);
    }
}
