use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use karani_core::domain::client::{Client, ClientId, Product, ProductId};
use karani_core::domain::tenant::TenantId;

use super::{
    parse_decimal, parse_optional_decimal, parse_timestamp, parse_uuid, ClientRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for SqlClientRepository {
    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, phone, created_at
             FROM clients
             WHERE tenant_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(client_from_row).collect()
    }

    async fn find(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, phone, created_at FROM clients WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }

    async fn create(&self, client: &Client) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO clients (id, tenant_id, name, phone, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(client.id.0.to_string())
        .bind(client.tenant_id.0.to_string())
        .bind(&client.name)
        .bind(client.phone.as_deref())
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_products(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, unit_price, discount_pct, created_at
             FROM products
             WHERE tenant_id = ?
             ORDER BY name ASC
             LIMIT ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, unit_price, discount_pct, created_at
             FROM products
             WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(product_from_row).transpose()
    }

    async fn create_product(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, unit_price, discount_pct, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id.0.to_string())
        .bind(product.tenant_id.0.to_string())
        .bind(&product.name)
        .bind(product.unit_price.to_string())
        .bind(product.discount_pct.map(|value| value.to_string()))
        .bind(product.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn client_from_row(row: SqliteRow) -> Result<Client, RepositoryError> {
    Ok(Client {
        id: ClientId(parse_uuid("id", row.try_get("id")?)?),
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(parse_uuid("id", row.try_get("id")?)?),
        tenant_id: TenantId(parse_uuid("tenant_id", row.try_get("tenant_id")?)?),
        name: row.try_get("name")?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        discount_pct: parse_optional_decimal("discount_pct", row.try_get("discount_pct")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
