use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use karani_core::domain::branch::BranchId;
use karani_core::domain::client::ClientId;
use karani_core::domain::document::{
    Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus, Totals,
};
use karani_core::domain::money::{Payment, PaymentMethod};
use karani_core::domain::tenant::TenantId;

use super::{
    parse_decimal, parse_optional_decimal, parse_optional_uuid, parse_timestamp, parse_uuid,
    DocumentRepository, OpenInvoice, RepositoryError, SalesSummary,
};
use crate::DbPool;

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn insert(
        &self,
        document: &Document,
        lines: &[DocumentLine],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (
                id,
                tenant_id,
                branch_id,
                kind,
                seq,
                number,
                client_id,
                client_name,
                subtotal,
                discount,
                vat,
                total,
                status,
                draft_generation,
                issued_by,
                artifact_url,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.0.to_string())
        .bind(document.tenant_id.0.to_string())
        .bind(document.branch_id.map(|id| id.0.to_string()))
        .bind(document.kind.as_str())
        .bind(document.seq)
        .bind(&document.number)
        .bind(document.client_id.map(|id| id.0.to_string()))
        .bind(&document.client_name)
        .bind(document.totals.subtotal.to_string())
        .bind(document.totals.discount.to_string())
        .bind(document.totals.vat.to_string())
        .bind(document.totals.total.to_string())
        .bind(document.status.as_str())
        .bind(document.draft_generation.to_string())
        .bind(&document.issued_by)
        .bind(document.artifact_url.as_deref())
        .bind(document.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                "INSERT INTO document_lines (
                    id, document_id, position, description, quantity, unit_price,
                    discount_pct, line_total
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(line.id.to_string())
            .bind(line.document_id.0.to_string())
            .bind(line.position)
            .bind(&line.description)
            .bind(line.quantity.to_string())
            .bind(line.unit_price.to_string())
            .bind(line.discount_pct.map(|value| value.to_string()))
            .bind(line.line_total.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(&format!("{DOCUMENT_SELECT} WHERE id = ?"))
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(document_from_row).transpose()
    }

    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{DOCUMENT_SELECT} WHERE tenant_id = ? AND draft_generation = ?"
        ))
        .bind(tenant_id.0.to_string())
        .bind(generation.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(document_from_row).transpose()
    }

    async fn list_lines(&self, id: &DocumentId) -> Result<Vec<DocumentLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, document_id, position, description, quantity, unit_price,
                    discount_pct, line_total
             FROM document_lines
             WHERE document_id = ?
             ORDER BY position ASC",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    async fn list_open_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<OpenInvoice>, RepositoryError> {
        // Amounts are stored as decimal text, so the balance arithmetic
        // happens here rather than in SQL.
        let rows = sqlx::query(&format!(
            "{DOCUMENT_SELECT}
             WHERE tenant_id = ? AND kind = 'invoice' AND status != 'paid'
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(tenant_id.0.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut open = Vec::with_capacity(rows.len());
        for row in rows {
            let document = document_from_row(row)?;
            let paid = self.paid_total(&document.id).await?;
            let outstanding = document.totals.total - paid;
            if outstanding > Decimal::ZERO {
                open.push(OpenInvoice { document, outstanding });
            }
        }
        Ok(open)
    }

    async fn paid_total(&self, id: &DocumentId) -> Result<Decimal, RepositoryError> {
        let amounts: Vec<String> =
            sqlx::query_scalar("SELECT amount FROM payments WHERE document_id = ?")
                .bind(id.0.to_string())
                .fetch_all(&self.pool)
                .await?;

        let mut total = Decimal::ZERO;
        for raw in amounts {
            total += parse_decimal("amount", raw)?;
        }
        Ok(total)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payments (
                id, tenant_id, document_id, amount, method, draft_generation,
                recorded_by, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.id.to_string())
        .bind(payment.tenant_id.0.to_string())
        .bind(payment.document_id.0.to_string())
        .bind(payment.amount.to_string())
        .bind(payment.method.as_str())
        .bind(payment.draft_generation.to_string())
        .bind(&payment.recorded_by)
        .bind(payment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_payment_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, document_id, amount, method, draft_generation,
                    recorded_by, created_at
             FROM payments
             WHERE tenant_id = ? AND draft_generation = ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(generation.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(payment_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_artifact(
        &self,
        id: &DocumentId,
        artifact_url: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE documents SET artifact_url = ? WHERE id = ?")
            .bind(artifact_url)
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sales_summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<SalesSummary, RepositoryError> {
        let (start, end) = range;
        let rows = if let Some(branch_id) = branch_id {
            sqlx::query(
                "SELECT total FROM documents
                 WHERE tenant_id = ? AND branch_id = ? AND kind != 'quote'
                   AND created_at >= ? AND created_at < ?",
            )
            .bind(tenant_id.0.to_string())
            .bind(branch_id.0.to_string())
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT total FROM documents
                 WHERE tenant_id = ? AND kind != 'quote'
                   AND created_at >= ? AND created_at < ?",
            )
            .bind(tenant_id.0.to_string())
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(&self.pool)
            .await?
        };

        let mut summary = SalesSummary::default();
        for row in rows {
            summary.document_count += 1;
            summary.total += parse_decimal("total", row.try_get("total")?)?;
        }

        let paid_rows: Vec<String> = sqlx::query_scalar(
            "SELECT amount FROM payments
             WHERE tenant_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        for raw in paid_rows {
            summary.paid += parse_decimal("amount", raw)?;
        }

        Ok(summary)
    }
}

const DOCUMENT_SELECT: &str = "SELECT
    id,
    tenant_id,
    branch_id,
    kind,
    seq,
    number,
    client_id,
    client_name,
    subtotal,
    discount,
    vat,
    total,
    status,
    draft_generation,
    issued_by,
    artifact_url,
    created_at
 FROM documents";

fn document_from_row(row: SqliteRow) -> Result<Document, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = DocumentKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown document kind `{kind_raw}`")))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DocumentStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown document status `{status_raw}`"))
    })?;

    Ok(Document {
        id: DocumentId(parse_uuid("id", row.try_get("id")?)?),
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        branch_id: parse_optional_uuid("branch_id", row.try_get("branch_id")?)?.map(BranchId),
        kind,
        seq: row.try_get("seq")?,
        number: row.try_get("number")?,
        client_id: parse_optional_uuid("client_id", row.try_get("client_id")?)?.map(ClientId),
        client_name: row.try_get("client_name")?,
        totals: Totals {
            subtotal: parse_decimal("subtotal", row.try_get("subtotal")?)?,
            discount: parse_decimal("discount", row.try_get("discount")?)?,
            vat: parse_decimal("vat", row.try_get("vat")?)?,
            total: parse_decimal("total", row.try_get("total")?)?,
        },
        status,
        draft_generation: parse_uuid("draft_generation", row.try_get("draft_generation")?)?,
        issued_by: row.try_get("issued_by")?,
        artifact_url: row.try_get("artifact_url")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn line_from_row(row: SqliteRow) -> Result<DocumentLine, RepositoryError> {
    Ok(DocumentLine {
        id: parse_uuid("id", row.try_get("id")?)?,
        document_id: DocumentId(parse_uuid("document_id", row.try_get("document_id")?)?),
        position: row.try_get("position")?,
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        discount_pct: parse_optional_decimal("discount_pct", row.try_get("discount_pct")?)?,
        line_total: parse_decimal("line_total", row.try_get("line_total")?)?,
    })
}

fn payment_from_row(row: SqliteRow) -> Result<Payment, RepositoryError> {
    let method_raw = row.try_get::<String, _>("method")?;
    let method = PaymentMethod::parse(&method_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment method `{method_raw}`")))?;

    Ok(Payment {
        id: parse_uuid("id", row.try_get("id")?)?,
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        document_id: DocumentId(parse_uuid("document_id", row.try_get("document_id")?)?),
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        method,
        draft_generation: parse_uuid("draft_generation", row.try_get("draft_generation")?)?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use karani_core::dialog::session::DialogSession;
    use karani_core::domain::document::{
        Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus, Totals,
    };
    use karani_core::domain::money::{Payment, PaymentMethod};
    use karani_core::domain::tenant::{Package, Tenant, TenantId};

    use super::SqlDocumentRepository;
    use crate::migrations;
    use crate::repositories::{DocumentRepository, SqlTenantRepository, TenantRepository};
    use crate::{connect_with_settings, DbPool};

    async fn setup() -> (DbPool, TenantId) {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let tenant = Tenant {
            id: TenantId(Uuid::new_v4()),
            name: "Jua Kali Metalworks".to_owned(),
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
        };
        SqlTenantRepository::new(pool.clone()).create(&tenant).await.expect("create tenant");
        (pool, tenant.id)
    }

    fn invoice(tenant_id: TenantId, seq: i64, total: i64) -> Document {
        Document {
            id: DocumentId(Uuid::new_v4()),
            tenant_id,
            branch_id: None,
            kind: DocumentKind::Invoice,
            seq,
            number: DocumentKind::Invoice.format_number(seq),
            client_id: None,
            client_name: "Wanjiku".to_owned(),
            totals: Totals {
                subtotal: Decimal::from(total),
                discount: Decimal::ZERO,
                vat: Decimal::ZERO,
                total: Decimal::from(total),
            },
            status: DocumentStatus::Issued,
            draft_generation: Uuid::new_v4(),
            issued_by: "254722000001".to_owned(),
            artifact_url: None,
            created_at: Utc::now(),
        }
    }

    fn line(document: &Document) -> DocumentLine {
        DocumentLine {
            id: Uuid::new_v4(),
            document_id: document.id,
            position: 0,
            description: "Welded gate".to_owned(),
            quantity: Decimal::ONE,
            unit_price: document.totals.subtotal,
            discount_pct: None,
            line_total: document.totals.subtotal,
        }
    }

    #[tokio::test]
    async fn document_with_lines_round_trips() {
        let (pool, tenant_id) = setup().await;
        let repo = SqlDocumentRepository::new(pool.clone());

        let document = invoice(tenant_id, 1, 4500);
        repo.insert(&document, &[line(&document)]).await.expect("insert document");

        let found = repo.find(&document.id).await.expect("find").expect("exists");
        assert_eq!(found, document);

        let lines = repo.list_lines(&document.id).await.expect("lines");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].description, "Welded gate");

        let by_generation = repo
            .find_by_generation(&tenant_id, document.draft_generation)
            .await
            .expect("lookup")
            .expect("committed");
        assert_eq!(by_generation.id, document.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_generation_is_rejected_by_the_schema() {
        let (pool, tenant_id) = setup().await;
        let repo = SqlDocumentRepository::new(pool.clone());

        let first = invoice(tenant_id, 1, 1000);
        repo.insert(&first, &[line(&first)]).await.expect("insert first");

        let mut replay = invoice(tenant_id, 2, 1000);
        replay.draft_generation = first.draft_generation;
        let result = repo.insert(&replay, &[line(&replay)]).await;
        assert!(result.is_err(), "same draft generation must not commit twice");

        pool.close().await;
    }

    #[tokio::test]
    async fn open_invoices_track_outstanding_balance() {
        let (pool, tenant_id) = setup().await;
        let repo = SqlDocumentRepository::new(pool.clone());

        let unpaid = invoice(tenant_id, 1, 3000);
        let partly = invoice(tenant_id, 2, 2000);
        repo.insert(&unpaid, &[line(&unpaid)]).await.expect("insert");
        repo.insert(&partly, &[line(&partly)]).await.expect("insert");

        repo.insert_payment(&Payment {
            id: Uuid::new_v4(),
            tenant_id,
            document_id: partly.id,
            amount: Decimal::from(500),
            method: PaymentMethod::MobileMoney,
            draft_generation: Uuid::new_v4(),
            recorded_by: "254722000001".to_owned(),
            created_at: Utc::now(),
        })
        .await
        .expect("record payment");

        let open = repo.list_open_invoices(&tenant_id, 10).await.expect("open invoices");
        assert_eq!(open.len(), 2);
        let partly_open =
            open.iter().find(|entry| entry.document.id == partly.id).expect("still open");
        assert_eq!(partly_open.outstanding, Decimal::from(1500));

        repo.update_status(&unpaid.id, DocumentStatus::Paid).await.expect("mark paid");
        let open = repo.list_open_invoices(&tenant_id, 10).await.expect("open invoices");
        assert_eq!(open.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn payment_generation_lookup_supports_idempotent_commits() {
        let (pool, tenant_id) = setup().await;
        let repo = SqlDocumentRepository::new(pool.clone());

        let document = invoice(tenant_id, 1, 1000);
        repo.insert(&document, &[line(&document)]).await.expect("insert");

        let payment = Payment {
            id: Uuid::new_v4(),
            tenant_id,
            document_id: document.id,
            amount: Decimal::from(1000),
            method: PaymentMethod::Cash,
            draft_generation: Uuid::new_v4(),
            recorded_by: "254722000001".to_owned(),
            created_at: Utc::now(),
        };
        repo.insert_payment(&payment).await.expect("record payment");

        let found = repo
            .find_payment_by_generation(&tenant_id, payment.draft_generation)
            .await
            .expect("lookup")
            .expect("recorded");
        assert_eq!(found, payment);
        assert_eq!(repo.paid_total(&document.id).await.expect("paid"), Decimal::from(1000));

        pool.close().await;
    }

    #[tokio::test]
    async fn sales_summary_scopes_by_period() {
        let (pool, tenant_id) = setup().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        let now = Utc::now();

        let mut recent = invoice(tenant_id, 1, 2500);
        recent.created_at = now;
        let mut old = invoice(tenant_id, 2, 9000);
        old.created_at = now - Duration::days(40);
        repo.insert(&recent, &[line(&recent)]).await.expect("insert");
        repo.insert(&old, &[line(&old)]).await.expect("insert");

        let summary = repo
            .sales_summary(&tenant_id, None, (now - Duration::days(1), now + Duration::days(1)))
            .await
            .expect("summary");
        assert_eq!(summary.document_count, 1);
        assert_eq!(summary.total, Decimal::from(2500));

        pool.close().await;
    }
}
