//! Onboarding for phones with no tenant binding: create a business, or
//! accept a pending invite with `join <code>`. Dialog state lives in the
//! signup-session table until a tenant exists to carry it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use karani_core::dialog::action::{normalize, Action, RawInput};
use karani_core::dialog::menu;
use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
use karani_core::dialog::session::{
    DialogSession, DialogState, FlowData, OnboardingFlow,
};
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::principal::{Principal, Role};
use karani_core::domain::tenant::{Package, Tenant, TenantId};
use karani_core::msisdn::Msisdn;
use karani_db::repositories::RepositoryError;

use crate::engine::Deps;

pub enum SignupTurn {
    /// Still mid-signup; persist the session against the phone.
    Continue { session: DialogSession, plans: Vec<OutboundPlan> },
    /// A tenant now exists (created or joined); the signup session is gone.
    Finished { plans: Vec<OutboundPlan> },
}

/// Result of a `join <code>` attempt.
pub struct JoinAttempt {
    pub joined: bool,
    pub plans: Vec<OutboundPlan>,
}

/// One turn of the onboarding dialog. Bypasses every gate: there is no
/// tenant or principal to gate on yet.
pub async fn turn(
    deps: &Deps,
    phone: &Msisdn,
    raw: &RawInput,
    now: DateTime<Utc>,
) -> Result<SignupTurn, RepositoryError> {
    if let RawInput::Text(body) = raw {
        if let Some(attempt) = try_join(deps, phone, body, now).await? {
            if attempt.joined {
                deps.memberships.delete_signup(phone).await?;
                return Ok(SignupTurn::Finished { plans: attempt.plans });
            }
            // A failed join keeps whatever signup progress exists.
            let session = deps.memberships.load_signup(phone).await?;
            return match session {
                Some(session) => Ok(SignupTurn::Continue { session, plans: attempt.plans }),
                None => Ok(SignupTurn::Finished { plans: attempt.plans }),
            };
        }
    }

    let session = deps.memberships.load_signup(phone).await?;
    let Some(session) = session else {
        return Ok(welcome());
    };

    let input = normalize(raw, None, &session);
    let flow = match &session.data {
        FlowData::Onboarding(flow) => flow.clone(),
        _ => OnboardingFlow::default(),
    };

    match session.state {
        DialogState::OnboardWelcome => match input.action() {
            Some(Action::StartBusiness | Action::Confirm) => Ok(ask_name()),
            _ => Ok(welcome()),
        },

        DialogState::OnboardName => {
            let name = input.text.trim();
            if name.is_empty() || input.action().is_some() {
                return Ok(SignupTurn::Continue {
                    session,
                    plans: vec![OutboundPlan::text("Send your business name to continue.")],
                });
            }
            let mut flow = flow;
            flow.business_name = Some(name.to_owned());
            Ok(SignupTurn::Continue {
                session: DialogSession::new(
                    DialogState::OnboardCurrency,
                    FlowData::Onboarding(flow),
                ),
                plans: vec![OutboundPlan::text(
                    "Which currency do you trade in? Send a 3-letter code like KES.",
                )],
            })
        }

        DialogState::OnboardCurrency => {
            let code = input.text.trim().to_ascii_uppercase();
            if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Ok(SignupTurn::Continue {
                    session,
                    plans: vec![OutboundPlan::text(
                        "Currency codes are 3 letters, like KES. Try again.",
                    )],
                });
            }
            let business_name =
                flow.business_name.clone().unwrap_or_else(|| "My business".to_owned());
            let plans = create_tenant(deps, phone, &business_name, &code, now).await?;
            deps.memberships.delete_signup(phone).await?;
            Ok(SignupTurn::Finished { plans })
        }

        _ => Ok(welcome()),
    }
}

/// Handle a `join <code>` message. Returns `Some(replies)` when the text
/// was a join attempt (successful or not), `None` otherwise. Also used for
/// senders whose phone is bound to a tenant where they hold no active role.
pub async fn try_join(
    deps: &Deps,
    phone: &Msisdn,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Option<JoinAttempt>, RepositoryError> {
    let trimmed = body.trim();
    let Some(code) = trimmed
        .strip_prefix("join ")
        .or_else(|| trimmed.strip_prefix("JOIN "))
        .or_else(|| trimmed.strip_prefix("Join "))
    else {
        return Ok(None);
    };
    let code = code.trim().to_ascii_uppercase();

    let Some(mut principal) = deps.memberships.find_pending_by_code(&code).await? else {
        return Ok(Some(JoinAttempt {
            joined: false,
            plans: vec![OutboundPlan::text(
                "That invite code doesn't match anything. Check it with whoever invited you.",
            )],
        }));
    };
    if principal.phone != *phone {
        return Ok(Some(JoinAttempt {
            joined: false,
            plans: vec![OutboundPlan::text(
                "That invite was sent to a different phone number.",
            )],
        }));
    }

    principal.pending = false;
    principal.invite_code = None;
    deps.memberships.save_principal(&principal).await?;
    deps.memberships.upsert_binding(phone, &principal.tenant_id, now).await?;

    let business = deps
        .tenants
        .find(&principal.tenant_id)
        .await?
        .map(|tenant| tenant.name)
        .unwrap_or_else(|| "the business".to_owned());

    info!(
        tenant_id = %principal.tenant_id,
        role = principal.role.as_str(),
        "invite accepted"
    );

    Ok(Some(JoinAttempt {
        joined: true,
        plans: vec![
            OutboundPlan::text(format!(
                "Welcome to {business}! You're set up as {}.",
                principal.role.label().to_lowercase()
            )),
            OutboundPlan::menu(
                "What would you like to do?",
                menu::main_menu_options(principal.role),
            ),
        ],
    }))
}

async fn create_tenant(
    deps: &Deps,
    phone: &Msisdn,
    business_name: &str,
    currency: &str,
    now: DateTime<Utc>,
) -> Result<Vec<OutboundPlan>, RepositoryError> {
    let tenant = Tenant {
        id: TenantId(Uuid::new_v4()),
        name: business_name.to_owned(),
        currency: currency.to_owned(),
        package: Package::Starter,
        trial_ends_at: Some(now + Duration::days(i64::from(deps.trial_days))),
        vat_rate: Decimal::ZERO,
        logo_url: None,
        invoice_seq: 0,
        quote_seq: 0,
        receipt_seq: 0,
        session: DialogSession::ready(),
        state_version: 0,
        created_at: now,
    };
    deps.tenants.create(&tenant).await?;

    deps.tenants
        .create_branch(&Branch {
            id: BranchId(Uuid::new_v4()),
            tenant_id: tenant.id,
            name: "Main".to_owned(),
            is_default: true,
            created_at: now,
        })
        .await?;

    deps.memberships
        .save_principal(&Principal {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            phone: phone.clone(),
            role: Role::Owner,
            branch_id: None,
            pending: false,
            invite_code: None,
        })
        .await?;

    deps.memberships.upsert_binding(phone, &tenant.id, now).await?;

    info!(tenant_id = %tenant.id, "tenant created via onboarding");

    Ok(vec![
        OutboundPlan::text(format!(
            "{business_name} is ready! You have a {}-day trial of every feature. Documents will use {currency}.",
            deps.trial_days
        )),
        OutboundPlan::menu("What would you like to do?", menu::main_menu_options(Role::Owner)),
    ])
}

fn welcome() -> SignupTurn {
    let session = DialogSession::new(
        DialogState::OnboardWelcome,
        FlowData::Onboarding(OnboardingFlow::default()),
    );
    let plans = vec![OutboundPlan::menu(
        "Welcome to Karani! I help small businesses send invoices, record payments and track expenses, all from chat.\n\nIf someone invited you, reply with their code like `join AB12CD`. Otherwise:",
        vec![MenuOption::new(Action::StartBusiness.as_str(), Action::StartBusiness.label())],
    )];
    SignupTurn::Continue { session, plans }
}

fn ask_name() -> SignupTurn {
    SignupTurn::Continue {
        session: DialogSession::new(
            DialogState::OnboardName,
            FlowData::Onboarding(OnboardingFlow::default()),
        ),
        plans: vec![OutboundPlan::text("Great. What's your business called?")],
    }
}
