//! End-to-end dialog properties, run against the in-memory repositories:
//! dual-channel equivalence, idempotent commits, gap-free numbering,
//! role-gate resets, balance-bounded payments and onboarding.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use karani_core::dialog::action::RawInput;
use karani_core::dialog::session::{DialogSession, DialogState, DocumentFlow, FlowData};
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::client::{Client, ClientId};
use karani_core::domain::document::{DocumentKind, DocumentStatus, DraftItem};
use karani_core::domain::principal::{Principal, Role};
use karani_core::domain::tenant::{Package, Tenant, TenantId};
use karani_core::msisdn::Msisdn;
use karani_db::repositories::{
    ClientRepository, DocumentRepository, InMemoryClientRepository, InMemoryDocumentRepository,
    InMemoryExpenseRepository, InMemoryMembershipRepository, InMemoryTenantRepository,
    MembershipRepository, TenantRepository,
};
use karani_server::engine::{Deps, Engine, TurnReply};
use karani_server::finalize;
use karani_server::flows::FlowCtx;
use karani_transport::inbound::{InboundEvent, Transport};

fn deps() -> Deps {
    Deps {
        tenants: Arc::new(InMemoryTenantRepository::default()),
        memberships: Arc::new(InMemoryMembershipRepository::default()),
        clients: Arc::new(InMemoryClientRepository::default()),
        documents: Arc::new(InMemoryDocumentRepository::default()),
        expenses: Arc::new(InMemoryExpenseRepository::default()),
        country_code: "254".to_owned(),
        trial_days: 14,
    }
}

struct Harness {
    engine: Engine,
    tenant_id: TenantId,
    owner: Msisdn,
    clerk: Msisdn,
}

async fn seed(deps: &Deps, package: Package) -> Harness {
    let tenant = Tenant {
        id: TenantId(Uuid::new_v4()),
        name: "Mama Njeri Tailors".to_owned(),
        currency: "KES".to_owned(),
        package,
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
    deps.tenants.create(&tenant).await.expect("create tenant");

    let branch = Branch {
        id: BranchId(Uuid::new_v4()),
        tenant_id: tenant.id,
        name: "Main".to_owned(),
        is_default: true,
        created_at: Utc::now(),
    };
    deps.tenants.create_branch(&branch).await.expect("create branch");

    let owner = Msisdn::normalize("0722000001", "254").expect("owner phone");
    let clerk = Msisdn::normalize("0722000002", "254").expect("clerk phone");

    for (phone, role) in [(&owner, Role::Owner), (&clerk, Role::Clerk)] {
        deps.memberships
            .save_principal(&Principal {
                id: Uuid::new_v4(),
                tenant_id: tenant.id,
                phone: phone.clone(),
                role,
                branch_id: (role != Role::Owner).then_some(branch.id),
                pending: false,
                invite_code: None,
            })
            .await
            .expect("save principal");
        deps.memberships
            .upsert_binding(phone, &tenant.id, Utc::now())
            .await
            .expect("bind phone");
    }

    Harness { engine: Engine::new(deps.clone()), tenant_id: tenant.id, owner, clerk }
}

async fn send_text(harness: &Harness, from: &Msisdn, body: &str) -> TurnReply {
    harness
        .engine
        .handle(&InboundEvent {
            transport: Transport::Twilio,
            from: from.to_e164(),
            input: RawInput::Text(body.to_owned()),
        })
        .await
        .expect("turn succeeds")
}

async fn send_button(harness: &Harness, from: &Msisdn, id: &str) -> TurnReply {
    harness
        .engine
        .handle(&InboundEvent {
            transport: Transport::Whatsapp,
            from: from.as_str().to_owned(),
            input: RawInput::Interactive { id: id.to_owned() },
        })
        .await
        .expect("turn succeeds")
}

async fn current_state(deps: &Deps, tenant_id: &TenantId) -> DialogState {
    deps.tenants.find(tenant_id).await.expect("find tenant").expect("tenant").session.state
}

fn first_body(reply: &TurnReply) -> &str {
    reply.plans.first().expect("at least one plan").body()
}

#[tokio::test]
async fn numbered_reply_and_structured_token_land_in_the_same_state() {
    let deps_a = deps();
    let harness_a = seed(&deps_a, Package::Starter).await;
    let deps_b = deps();
    let harness_b = seed(&deps_b, Package::Starter).await;

    // Owner menu position 1 is "New invoice" on the numbered transport.
    let numbered = send_text(&harness_a, &harness_a.owner, "1").await;
    let structured = send_button(&harness_b, &harness_b.owner, "new_invoice").await;

    assert_eq!(
        current_state(&deps_a, &harness_a.tenant_id).await,
        current_state(&deps_b, &harness_b.tenant_id).await,
    );
    assert_eq!(first_body(&numbered), first_body(&structured));
}

#[tokio::test]
async fn owner_builds_a_two_item_invoice_numbered_000001() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    // No saved clients, so "1" goes straight to capturing a name.
    send_text(&harness, &owner, "1").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ClientName);

    send_text(&harness, &owner, "Wanjiku").await;
    send_text(&harness, &owner, "skip").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ItemDescription);

    send_text(&harness, &owner, "Website design").await;
    send_text(&harness, &owner, "2").await;
    let summary = send_text(&harness, &owner, "1500").await;
    assert!(first_body(&summary).contains("Total: KES 3000"), "{}", first_body(&summary));

    send_button(&harness, &owner, "add_item").await;
    send_text(&harness, &owner, "Logo refresh").await;
    send_text(&harness, &owner, "1").await;
    send_text(&harness, &owner, "500").await;

    send_button(&harness, &owner, "confirm").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::DocumentConfirm);

    let committed = send_button(&harness, &owner, "confirm").await;
    assert!(first_body(&committed).contains("INV-000001"), "{}", first_body(&committed));
    assert!(first_body(&committed).contains("3500"));
    assert!(committed.render.is_some(), "a committed document must be rendered");

    // Reset-on-exit: terminal confirm lands back on ready with empty data.
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert!(tenant.session.is_ready());
    assert_eq!(tenant.session.data, FlowData::Ready);
    assert_eq!(tenant.invoice_seq, 1);
}

#[tokio::test]
async fn saved_client_pick_feeds_the_item_flow() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    let client = Client {
        id: ClientId(Uuid::new_v4()),
        tenant_id: harness.tenant_id,
        name: "Wanjiku".to_owned(),
        phone: Some("254722000009".to_owned()),
        created_at: Utc::now(),
    };
    deps.clients.create(&client).await.expect("seed client");

    // With a saved client on file, "1" offers saved-vs-new first.
    send_text(&harness, &owner, "1").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ClientChoice);

    send_button(&harness, &owner, "client_saved").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ClientPick);
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.session.presented, vec![format!("client:{}", client.id)]);

    // "1" picks the first presented client by position, same as tapping it.
    send_text(&harness, &owner, "1").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ItemDescription);
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    match &tenant.session.data {
        FlowData::Document(flow) => {
            assert_eq!(flow.client_id, Some(client.id));
            assert_eq!(flow.client_name.as_deref(), Some("Wanjiku"));
        }
        other => panic!("expected a document flow, got {other:?}"),
    }
}

#[tokio::test]
async fn expense_reports_dead_end_into_an_upgrade_until_the_tier_allows() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    send_button(&harness, &owner, "reports").await;
    let denied = send_button(&harness, &owner, "report_expenses").await;
    assert!(first_body(&denied).contains("Business plan"), "{}", first_body(&denied));
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::Ready);

    // Sales reports stay available on every tier.
    send_button(&harness, &owner, "reports").await;
    send_button(&harness, &owner, "report_sales").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ReportPeriodPick);
    send_text(&harness, &owner, "cancel").await;

    // After upgrading, the same request goes through.
    let mut tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    tenant.package = Package::Business;
    deps.tenants.update_profile(&tenant).await.expect("upgrade");

    send_button(&harness, &owner, "reports").await;
    send_button(&harness, &owner, "report_expenses").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::ReportPeriodPick);
}

#[tokio::test]
async fn replaying_a_confirm_commits_exactly_once() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;

    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    let principal = deps
        .memberships
        .find_active_principal(&harness.tenant_id, &harness.owner)
        .await
        .unwrap()
        .unwrap();

    let mut flow = DocumentFlow::start(DocumentKind::Invoice);
    flow.client_name = Some("Wanjiku".to_owned());
    flow.items.push(DraftItem {
        description: "Website design".to_owned(),
        quantity: Decimal::from(2),
        unit_price: Decimal::from(1500),
        discount_pct: None,
    });

    let ctx = FlowCtx { deps: &deps, tenant: &tenant, principal: &principal, now: Utc::now() };
    let first = finalize::commit_document(&ctx, &flow).await.expect("first commit");
    let replay = finalize::commit_document(&ctx, &flow).await.expect("replayed commit");

    assert!(!first.replayed);
    assert!(replay.replayed);
    assert_eq!(first.document.id, replay.document.id);
    assert_eq!(first.document.number, "INV-000001");

    // Exactly one counter increment.
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.invoice_seq, 1);

    // A later, different draft gets the next number, never a reused one.
    let next = finalize::commit_document(
        &ctx,
        &DocumentFlow { generation: Uuid::new_v4(), ..flow.clone() },
    )
    .await
    .expect("second draft");
    assert_eq!(next.document.number, "INV-000002");
}

#[tokio::test]
async fn clerk_is_bounced_from_settings_back_to_their_own_menu() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;

    let reply = send_button(&harness, &harness.clerk, "settings").await;

    assert!(first_body(&reply).contains("Access denied"), "{}", first_body(&reply));
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::Ready);

    // The re-shown menu is the clerk's, not the owner's.
    let menu = reply.plans.last().expect("menu plan");
    let ids = menu.option_ids();
    assert_eq!(ids.len(), karani_core::dialog::menu::main_menu(Role::Clerk).len());
    assert!(!ids.contains(&"settings".to_owned()));
}

#[tokio::test]
async fn demotion_mid_flow_resets_on_the_next_turn() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    // Owner starts the expense flow legitimately.
    send_button(&harness, &owner, "record_expense").await;
    assert_eq!(
        current_state(&deps, &harness.tenant_id).await,
        DialogState::ExpenseCategoryPick
    );

    // Between turns the owner is demoted to clerk (no expenses access).
    let mut principal = deps
        .memberships
        .find_active_principal(&harness.tenant_id, &owner)
        .await
        .unwrap()
        .unwrap();
    principal.role = Role::Clerk;
    deps.memberships.save_principal(&principal).await.unwrap();

    let reply = send_text(&harness, &owner, "1").await;
    assert!(first_body(&reply).contains("Access denied"), "{}", first_body(&reply));
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert!(tenant.session.is_ready());
    assert_eq!(tenant.session.data, FlowData::Ready);
}

#[tokio::test]
async fn payment_above_the_outstanding_balance_reprompts_in_place() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    // Seed one committed invoice for 1000.
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    let principal = deps
        .memberships
        .find_active_principal(&harness.tenant_id, &owner)
        .await
        .unwrap()
        .unwrap();
    let mut flow = DocumentFlow::start(DocumentKind::Invoice);
    flow.client_name = Some("Barasa".to_owned());
    flow.items.push(DraftItem {
        description: "Repairs".to_owned(),
        quantity: Decimal::ONE,
        unit_price: Decimal::from(1000),
        discount_pct: None,
    });
    let ctx = FlowCtx { deps: &deps, tenant: &tenant, principal: &principal, now: Utc::now() };
    let invoice = finalize::commit_document(&ctx, &flow).await.unwrap().document;

    send_button(&harness, &owner, "record_payment").await;
    // The open-invoice list was presented; "1" picks the only entry.
    send_text(&harness, &owner, "1").await;
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::PaymentAmount);

    let rejected = send_text(&harness, &owner, "5000").await;
    assert!(first_body(&rejected).contains("more than"), "{}", first_body(&rejected));
    assert_eq!(current_state(&deps, &harness.tenant_id).await, DialogState::PaymentAmount);

    // The invoice itself is untouched by the failed attempt.
    let stored = deps.documents.find(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Issued);
    assert_eq!(deps.documents.paid_total(&invoice.id).await.unwrap(), Decimal::ZERO);

    send_text(&harness, &owner, "400").await;
    send_button(&harness, &owner, "pay_cash").await;

    let stored = deps.documents.find(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::PartiallyPaid);
    assert_eq!(deps.documents.paid_total(&invoice.id).await.unwrap(), Decimal::from(400));
}

#[tokio::test]
async fn cancel_resets_to_ready_with_empty_session() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    send_text(&harness, &owner, "1").await;
    send_text(&harness, &owner, "Wanjiku").await;

    let reply = send_text(&harness, &owner, "cancel").await;
    assert!(first_body(&reply).contains("Cancelled"));

    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert!(tenant.session.is_ready());
    assert_eq!(tenant.session.data, FlowData::Ready);
    // The re-shown menu is recorded so the next numbered reply resolves.
    assert!(!tenant.session.presented.is_empty());
}

#[tokio::test]
async fn fresh_phone_onboards_into_a_working_tenant() {
    let deps = deps();
    // Seed an unrelated tenant so ids cannot collide by accident.
    let _existing = seed(&deps, Package::Starter).await;
    let engine = Engine::new(deps.clone());
    let newcomer = Msisdn::normalize("0733999888", "254").expect("phone");

    let event = |body: &str| InboundEvent {
        transport: Transport::Whatsapp,
        from: newcomer.as_str().to_owned(),
        input: RawInput::Text(body.to_owned()),
    };

    let welcome = engine.handle(&event("hi")).await.expect("welcome turn");
    assert!(welcome.plans[0].body().contains("Welcome"));

    // "1" resolves by position against the presented signup options.
    engine.handle(&event("1")).await.expect("start business");
    engine.handle(&event("Mama Oliech Fish")).await.expect("name turn");
    let done = engine.handle(&event("kes")).await.expect("currency turn");
    assert!(done.plans[0].body().contains("ready"), "{}", done.plans[0].body());

    let tenant_id =
        deps.memberships.find_binding(&newcomer).await.unwrap().expect("binding exists");
    let tenant = deps.tenants.find(&tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.name, "Mama Oliech Fish");
    assert_eq!(tenant.currency, "KES");
    assert!(tenant.trial_ends_at.is_some(), "trial window set at onboarding");
    assert!(tenant.session.is_ready());

    // And the new owner can start working immediately.
    let first = engine.handle(&event("1")).await.expect("first action");
    assert!(first.plans[0].body().contains("invoice"), "{}", first.plans[0].body());
}

#[tokio::test]
async fn join_with_a_wrong_code_is_rejected() {
    let deps = deps();
    let _existing = seed(&deps, Package::Starter).await;
    let engine = Engine::new(deps.clone());
    let invitee = Msisdn::normalize("0744555666", "254").expect("phone");

    let reply = engine
        .handle(&InboundEvent {
            transport: Transport::Twilio,
            from: invitee.to_e164(),
            input: RawInput::Text("join NOPE99".to_owned()),
        })
        .await
        .expect("turn");

    assert!(reply.plans[0].body().contains("doesn't match"));
    assert_eq!(deps.memberships.find_binding(&invitee).await.unwrap(), None);
}

#[tokio::test]
async fn unnormalizable_sender_is_rejected_at_the_edge() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;

    let result = harness
        .engine
        .handle(&InboundEvent {
            transport: Transport::Twilio,
            from: "not-a-phone".to_owned(),
            input: RawInput::Text("1".to_owned()),
        })
        .await;

    assert!(result.is_err(), "identity failures reject before any tenant lookup");
}

#[tokio::test]
async fn every_reply_records_presented_options_for_numbered_replies() {
    let deps = deps();
    let harness = seed(&deps, Package::Starter).await;
    let owner = harness.owner.clone();

    send_button(&harness, &owner, "record_expense").await;
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.session.state, DialogState::ExpenseCategoryPick);
    assert_eq!(tenant.session.presented.len(), 6, "six expense categories presented");
    assert!(tenant.session.presented[0].starts_with("category:"));

    // And the numbered reply picks by position.
    send_text(&harness, &owner, "2").await;
    let tenant = deps.tenants.find(&harness.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.session.state, DialogState::ExpenseDescription);
}
