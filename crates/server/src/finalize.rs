//! Terminal-state commits. Everything here is idempotent under webhook
//! redelivery: the draft generation minted at flow start is checked before
//! any counter moves or row lands, and a replayed confirm returns the
//! original record untouched.

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use karani_core::dialog::session::{DocumentFlow, ExpenseFlow, PaymentFlow};
use karani_core::domain::branch::BranchId;
use karani_core::domain::client::{Product, ProductId};
use karani_core::domain::document::{
    compute_totals, Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus,
};
use karani_core::domain::money::{Expense, Payment, PaymentMethod};
use karani_db::repositories::RepositoryError;

use crate::flows::FlowCtx;

pub struct DocumentCommit {
    pub document: Document,
    pub replayed: bool,
}

pub struct PaymentCommit {
    pub payment: Payment,
    pub settled: bool,
    pub replayed: bool,
}

pub struct ExpenseCommit {
    pub expense: Expense,
    pub replayed: bool,
}

/// The branch a record lands under: the principal's own branch, falling
/// back to the tenant's default.
pub async fn resolve_branch(ctx: &FlowCtx<'_>) -> Result<Option<BranchId>, RepositoryError> {
    if let Some(branch_id) = ctx.principal.branch_id {
        return Ok(Some(branch_id));
    }
    let branches = ctx.deps.tenants.list_branches(&ctx.tenant.id).await?;
    Ok(branches.into_iter().find(|branch| branch.is_default).map(|branch| branch.id))
}

pub async fn commit_document(
    ctx: &FlowCtx<'_>,
    flow: &DocumentFlow,
) -> Result<DocumentCommit, RepositoryError> {
    if let Some(existing) =
        ctx.deps.documents.find_by_generation(&ctx.tenant.id, flow.generation).await?
    {
        info!(
            tenant_id = %ctx.tenant.id,
            number = %existing.number,
            "confirm replayed; returning the already committed document"
        );
        return Ok(DocumentCommit { document: existing, replayed: true });
    }

    let totals = compute_totals(&flow.items, flow.discount_pct, ctx.tenant.vat_rate, flow.kind);
    let seq = ctx.deps.tenants.allocate_seq(&ctx.tenant.id, flow.kind).await?;
    let branch_id = resolve_branch(ctx).await?;

    // A receipt records money already taken; it is born settled.
    let status = match flow.kind {
        DocumentKind::Receipt => DocumentStatus::Paid,
        DocumentKind::Invoice | DocumentKind::Quote => DocumentStatus::Issued,
    };

    let document = Document {
        id: DocumentId(Uuid::new_v4()),
        tenant_id: ctx.tenant.id,
        branch_id,
        kind: flow.kind,
        seq,
        number: flow.kind.format_number(seq),
        client_id: flow.client_id,
        client_name: flow.client_name.clone().unwrap_or_else(|| "Walk-in client".to_owned()),
        totals,
        status,
        draft_generation: flow.generation,
        issued_by: ctx.principal.phone.as_str().to_owned(),
        artifact_url: None,
        created_at: ctx.now,
    };

    let lines: Vec<DocumentLine> = flow
        .items
        .iter()
        .enumerate()
        .map(|(position, item)| DocumentLine {
            id: Uuid::new_v4(),
            document_id: document.id,
            position: position as i64,
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount_pct: item.discount_pct,
            line_total: item.line_total(),
        })
        .collect();

    ctx.deps.documents.insert(&document, &lines).await?;
    save_new_items_to_catalogue(ctx, flow).await?;

    info!(
        tenant_id = %ctx.tenant.id,
        number = %document.number,
        total = %document.totals.total,
        "document committed"
    );
    Ok(DocumentCommit { document, replayed: false })
}

/// Custom items quietly become catalogue products so the next document can
/// pick them instead of retyping.
async fn save_new_items_to_catalogue(
    ctx: &FlowCtx<'_>,
    flow: &DocumentFlow,
) -> Result<(), RepositoryError> {
    let known = ctx.deps.clients.list_products(&ctx.tenant.id, 200).await?;
    for item in &flow.items {
        let name = item.description.trim();
        if name.is_empty() {
            continue;
        }
        let already_saved =
            known.iter().any(|product| product.name.eq_ignore_ascii_case(name));
        if already_saved {
            continue;
        }
        ctx.deps
            .clients
            .create_product(&Product {
                id: ProductId(Uuid::new_v4()),
                tenant_id: ctx.tenant.id,
                name: name.to_owned(),
                unit_price: item.unit_price,
                discount_pct: None,
                created_at: ctx.now,
            })
            .await?;
    }
    Ok(())
}

pub async fn commit_payment(
    ctx: &FlowCtx<'_>,
    flow: &PaymentFlow,
    method: PaymentMethod,
) -> Result<Option<PaymentCommit>, RepositoryError> {
    if let Some(existing) =
        ctx.deps.documents.find_payment_by_generation(&ctx.tenant.id, flow.generation).await?
    {
        let paid = ctx.deps.documents.paid_total(&existing.document_id).await?;
        let settled = match ctx.deps.documents.find(&existing.document_id).await? {
            Some(document) => paid >= document.totals.total,
            None => false,
        };
        return Ok(Some(PaymentCommit { payment: existing, settled, replayed: true }));
    }

    let (Some(document_id), Some(amount)) = (flow.document_id, flow.amount) else {
        return Ok(None);
    };
    let Some(document) = ctx.deps.documents.find(&document_id).await? else {
        return Ok(None);
    };

    let payment = Payment {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant.id,
        document_id,
        amount,
        method,
        draft_generation: flow.generation,
        recorded_by: ctx.principal.phone.as_str().to_owned(),
        created_at: ctx.now,
    };
    ctx.deps.documents.insert_payment(&payment).await?;

    let paid = ctx.deps.documents.paid_total(&document_id).await?;
    let settled = paid >= document.totals.total;
    let status = if settled { DocumentStatus::Paid } else { DocumentStatus::PartiallyPaid };
    ctx.deps.documents.update_status(&document_id, status).await?;

    info!(
        tenant_id = %ctx.tenant.id,
        number = %document.number,
        amount = %amount,
        settled,
        "payment recorded"
    );
    Ok(Some(PaymentCommit { payment, settled, replayed: false }))
}

pub async fn commit_expense(
    ctx: &FlowCtx<'_>,
    flow: &ExpenseFlow,
    method: PaymentMethod,
) -> Result<Option<ExpenseCommit>, RepositoryError> {
    if let Some(existing) =
        ctx.deps.expenses.find_by_generation(&ctx.tenant.id, flow.generation).await?
    {
        return Ok(Some(ExpenseCommit { expense: existing, replayed: true }));
    }

    let (Some(category), Some(amount)) = (flow.category, flow.amount) else {
        return Ok(None);
    };
    if amount <= Decimal::ZERO {
        return Ok(None);
    }

    let expense = Expense {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant.id,
        branch_id: resolve_branch(ctx).await?,
        category,
        description: flow.description.clone().unwrap_or_default(),
        amount,
        method,
        draft_generation: flow.generation,
        recorded_by: ctx.principal.phone.as_str().to_owned(),
        created_at: ctx.now,
    };
    ctx.deps.expenses.insert(&expense).await?;

    info!(
        tenant_id = %ctx.tenant.id,
        category = expense.category.as_str(),
        amount = %amount,
        "expense recorded"
    );
    Ok(Some(ExpenseCommit { expense, replayed: false }))
}
