//! Document numbering under concurrent allocation: values must be strictly
//! increasing and never reused, whatever the interleaving.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use karani_core::dialog::session::DialogSession;
use karani_core::domain::document::DocumentKind;
use karani_core::domain::tenant::{Package, Tenant, TenantId};
use karani_db::repositories::{SqlTenantRepository, TenantRepository};
use karani_db::{connect_with_settings, migrations};

#[tokio::test]
async fn concurrent_invoice_numbers_never_collide() {
    let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
        .await
        .expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");

    let tenant = Tenant {
        id: TenantId(Uuid::new_v4()),
        name: "Bidii Traders".to_owned(),
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
    let repo = Arc::new(SqlTenantRepository::new(pool.clone()));
    repo.create(&tenant).await.expect("create tenant");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let repo = Arc::clone(&repo);
        let tenant_id = tenant.id;
        handles.push(tokio::spawn(async move {
            repo.allocate_seq(&tenant_id, DocumentKind::Invoice).await.expect("allocate")
        }));
    }

    let mut allocated = HashSet::new();
    for handle in handles {
        let seq = handle.await.expect("task");
        assert!(allocated.insert(seq), "sequence value {seq} was handed out twice");
    }

    assert_eq!(allocated.len(), 20);
    assert_eq!(allocated.iter().max(), Some(&20));
    assert_eq!(allocated.iter().min(), Some(&1));

    pool.close().await;
}
