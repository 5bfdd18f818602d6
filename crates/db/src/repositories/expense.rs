use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use karani_core::domain::branch::BranchId;
use karani_core::domain::money::{Expense, ExpenseCategory, PaymentMethod};
use karani_core::domain::tenant::TenantId;

use super::{
    parse_decimal, parse_optional_uuid, parse_timestamp, parse_uuid, ExpenseRepository,
    ExpenseSummary, RepositoryError,
};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expenses (
                id, tenant_id, branch_id, category, description, amount, method,
                draft_generation, recorded_by, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(expense.id.to_string())
        .bind(expense.tenant_id.0.to_string())
        .bind(expense.branch_id.map(|id| id.0.to_string()))
        .bind(expense.category.as_str())
        .bind(&expense.description)
        .bind(expense.amount.to_string())
        .bind(expense.method.as_str())
        .bind(expense.draft_generation.to_string())
        .bind(&expense.recorded_by)
        .bind(expense.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_generation(
        &self,
        tenant_id: &TenantId,
        generation: Uuid,
    ) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, branch_id, category, description, amount, method,
                    draft_generation, recorded_by, created_at
             FROM expenses
             WHERE tenant_id = ? AND draft_generation = ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(generation.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(expense_from_row).transpose()
    }

    async fn summary(
        &self,
        tenant_id: &TenantId,
        branch_id: Option<&BranchId>,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<ExpenseSummary, RepositoryError> {
        let (start, end) = range;
        let rows = if let Some(branch_id) = branch_id {
            sqlx::query(
                "SELECT category, amount FROM expenses
                 WHERE tenant_id = ? AND branch_id = ?
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
                "SELECT category, amount FROM expenses
                 WHERE tenant_id = ? AND created_at >= ? AND created_at < ?",
            )
            .bind(tenant_id.0.to_string())
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(&self.pool)
            .await?
        };

        let mut summary = ExpenseSummary::default();
        for row in rows {
            let category_raw = row.try_get::<String, _>("category")?;
            let category = ExpenseCategory::parse(&category_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown expense category `{category_raw}`"))
            })?;
            let amount = parse_decimal("amount", row.try_get("amount")?)?;

            summary.expense_count += 1;
            summary.total += amount;
            match summary.by_category.iter_mut().find(|(existing, _)| *existing == category) {
                Some((_, bucket)) => *bucket += amount,
                None => summary.by_category.push((category, amount)),
            }
        }

        Ok(summary)
    }
}

fn expense_from_row(row: SqliteRow) -> Result<Expense, RepositoryError> {
    let category_raw = row.try_get::<String, _>("category")?;
    let category = ExpenseCategory::parse(&category_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown expense category `{category_raw}`"))
    })?;
    let method_raw = row.try_get::<String, _>("method")?;
    let method = PaymentMethod::parse(&method_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment method `{method_raw}`")))?;

    Ok(Expense {
        id: parse_uuid("id", row.try_get("id")?)?,
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        branch_id: parse_optional_uuid("branch_id", row.try_get("branch_id")?)?.map(BranchId),
        category,
        description: row.try_get("description")?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        method,
        draft_generation: parse_uuid("draft_generation", row.try_get("draft_generation")?)?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
