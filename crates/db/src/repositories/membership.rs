use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use karani_core::dialog::session::DialogSession;
use karani_core::domain::branch::BranchId;
use karani_core::domain::principal::{Principal, Role};
use karani_core::domain::tenant::TenantId;
use karani_core::msisdn::Msisdn;

use super::{parse_optional_uuid, parse_uuid, MembershipRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMembershipRepository {
    pool: DbPool,
}

impl SqlMembershipRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for SqlMembershipRepository {
    async fn find_binding(&self, phone: &Msisdn) -> Result<Option<TenantId>, RepositoryError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM phone_bindings WHERE phone = ?")
                .bind(phone.as_str())
                .fetch_optional(&self.pool)
                .await?;

        raw.map(|value| parse_uuid("tenant_id", value).map(TenantId)).transpose()
    }

    async fn upsert_binding(
        &self,
        phone: &Msisdn,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO phone_bindings (phone, tenant_id, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                updated_at = excluded.updated_at",
        )
        .bind(phone.as_str())
        .bind(tenant_id.0.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active_principal(
        &self,
        tenant_id: &TenantId,
        phone: &Msisdn,
    ) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, phone, role, branch_id, pending, invite_code
             FROM principals
             WHERE tenant_id = ? AND phone = ? AND pending = 0",
        )
        .bind(tenant_id.0.to_string())
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(principal_from_row).transpose()
    }

    async fn find_pending_by_code(
        &self,
        invite_code: &str,
    ) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, phone, role, branch_id, pending, invite_code
             FROM principals
             WHERE invite_code = ? AND pending = 1",
        )
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(principal_from_row).transpose()
    }

    async fn save_principal(&self, principal: &Principal) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO principals (
                id, tenant_id, phone, role, branch_id, pending, invite_code, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                phone = excluded.phone,
                role = excluded.role,
                branch_id = excluded.branch_id,
                pending = excluded.pending,
                invite_code = excluded.invite_code",
        )
        .bind(principal.id.to_string())
        .bind(principal.tenant_id.0.to_string())
        .bind(principal.phone.as_str())
        .bind(principal.role.as_str())
        .bind(principal.branch_id.map(|id| id.0.to_string()))
        .bind(i64::from(principal.pending))
        .bind(principal.invite_code.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_signup(&self, phone: &Msisdn) -> Result<Option<DialogSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT dialog_state, session_json FROM signup_sessions WHERE phone = ?",
        )
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let state = row.try_get::<String, _>("dialog_state")?;
            let json = row.try_get::<String, _>("session_json")?;
            DialogSession::decode(&state, &json)
                .map_err(|error| RepositoryError::Decode(error.to_string()))
        })
        .transpose()
    }

    async fn save_signup(
        &self,
        phone: &Msisdn,
        session: &DialogSession,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let (state, json) = session.encode().map_err(|error| {
            RepositoryError::Decode(format!("signup session does not serialize: {error}"))
        })?;
        sqlx::query(
            "INSERT INTO signup_sessions (phone, dialog_state, session_json, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                dialog_state = excluded.dialog_state,
                session_json = excluded.session_json,
                updated_at = excluded.updated_at",
        )
        .bind(phone.as_str())
        .bind(state)
        .bind(json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_signup(&self, phone: &Msisdn) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM signup_sessions WHERE phone = ?")
            .bind(phone.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn principal_from_row(row: SqliteRow) -> Result<Principal, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;
    let phone_raw = row.try_get::<String, _>("phone")?;
    let phone = Msisdn::from_canonical(&phone_raw)
        .map_err(|error| RepositoryError::Decode(format!("stored phone rejected: {error}")))?;

    Ok(Principal {
        id: parse_uuid("id", row.try_get("id")?)?,
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        phone,
        role,
        branch_id: parse_optional_uuid("branch_id", row.try_get("branch_id")?)?.map(BranchId),
        pending: row.try_get::<i64, _>("pending")? != 0,
        invite_code: row.try_get("invite_code")?,
    })
}
