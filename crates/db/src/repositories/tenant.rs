use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use karani_core::dialog::session::DialogSession;
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::document::DocumentKind;
use karani_core::domain::tenant::{Package, Tenant, TenantId};

use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, parse_uuid, RepositoryError,
    TenantRepository,
};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                currency,
                package,
                trial_ends_at,
                vat_rate,
                logo_url,
                invoice_seq,
                quote_seq,
                receipt_seq,
                dialog_state,
                session_json,
                state_version,
                created_at
             FROM tenants
             WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(tenant_from_row).transpose()
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), RepositoryError> {
        let (dialog_state, session_json) = encode_session(&tenant.session)?;
        sqlx::query(
            "INSERT INTO tenants (
                id,
                name,
                currency,
                package,
                trial_ends_at,
                vat_rate,
                logo_url,
                invoice_seq,
                quote_seq,
                receipt_seq,
                dialog_state,
                session_json,
                state_version,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant.id.0.to_string())
        .bind(&tenant.name)
        .bind(&tenant.currency)
        .bind(tenant.package.as_str())
        .bind(tenant.trial_ends_at.map(|value| value.to_rfc3339()))
        .bind(tenant.vat_rate.to_string())
        .bind(tenant.logo_url.as_deref())
        .bind(tenant.invoice_seq)
        .bind(tenant.quote_seq)
        .bind(tenant.receipt_seq)
        .bind(dialog_state)
        .bind(session_json)
        .bind(tenant.state_version)
        .bind(tenant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_session(
        &self,
        id: &TenantId,
        session: &DialogSession,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        let (dialog_state, session_json) = encode_session(session)?;
        let result = sqlx::query(
            "UPDATE tenants
             SET dialog_state = ?, session_json = ?, state_version = state_version + 1
             WHERE id = ? AND state_version = ?",
        )
        .bind(dialog_state)
        .bind(session_json)
        .bind(id.0.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StaleVersion { tenant_id: *id });
        }
        Ok(expected_version + 1)
    }

    async fn allocate_seq(
        &self,
        id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError> {
        let statement = match kind {
            DocumentKind::Invoice => {
                "UPDATE tenants SET invoice_seq = invoice_seq + 1 WHERE id = ? RETURNING invoice_seq"
            }
            DocumentKind::Quote => {
                "UPDATE tenants SET quote_seq = quote_seq + 1 WHERE id = ? RETURNING quote_seq"
            }
            DocumentKind::Receipt => {
                "UPDATE tenants SET receipt_seq = receipt_seq + 1 WHERE id = ? RETURNING receipt_seq"
            }
        };

        let seq: i64 = sqlx::query_scalar(statement)
            .bind(id.0.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(seq)
    }

    async fn update_profile(&self, tenant: &Tenant) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE tenants
             SET name = ?, currency = ?, vat_rate = ?, logo_url = ?, package = ?, trial_ends_at = ?
             WHERE id = ?",
        )
        .bind(&tenant.name)
        .bind(&tenant.currency)
        .bind(tenant.vat_rate.to_string())
        .bind(tenant.logo_url.as_deref())
        .bind(tenant.package.as_str())
        .bind(tenant.trial_ends_at.map(|value| value.to_rfc3339()))
        .bind(tenant.id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_branches(&self, id: &TenantId) -> Result<Vec<Branch>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, is_default, created_at
             FROM branches
             WHERE tenant_id = ?
             ORDER BY is_default DESC, created_at ASC",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(branch_from_row).collect()
    }

    async fn create_branch(&self, branch: &Branch) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO branches (id, tenant_id, name, is_default, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(branch.id.0.to_string())
        .bind(branch.tenant_id.0.to_string())
        .bind(&branch.name)
        .bind(i64::from(branch.is_default))
        .bind(branch.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_branch(&self, id: &BranchId) -> Result<Option<Branch>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, is_default, created_at FROM branches WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(branch_from_row).transpose()
    }
}

fn encode_session(session: &DialogSession) -> Result<(String, String), RepositoryError> {
    session
        .encode()
        .map_err(|error| RepositoryError::Decode(format!("session does not serialize: {error}")))
}

fn tenant_from_row(row: SqliteRow) -> Result<Tenant, RepositoryError> {
    let package_raw = row.try_get::<String, _>("package")?;
    let package = Package::parse(&package_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown package `{package_raw}`")))?;

    let dialog_state = row.try_get::<String, _>("dialog_state")?;
    let session_json = row.try_get::<String, _>("session_json")?;
    let session = DialogSession::decode(&dialog_state, &session_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Tenant {
        id: TenantId(parse_uuid("id", row.try_get("id")?)?),
        name: row.try_get("name")?,
        currency: row.try_get("currency")?,
        package,
        trial_ends_at: parse_optional_timestamp("trial_ends_at", row.try_get("trial_ends_at")?)?,
        vat_rate: parse_decimal("vat_rate", row.try_get("vat_rate")?)?,
        logo_url: row.try_get("logo_url")?,
        invoice_seq: row.try_get("invoice_seq")?,
        quote_seq: row.try_get("quote_seq")?,
        receipt_seq: row.try_get("receipt_seq")?,
        session,
        state_version: row.try_get("state_version")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn branch_from_row(row: SqliteRow) -> Result<Branch, RepositoryError> {
    Ok(Branch {
        id: BranchId(parse_uuid("id", row.try_get("id")?)?),
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        name: row.try_get("name")?,
        is_default: row.try_get::<i64, _>("is_default")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
