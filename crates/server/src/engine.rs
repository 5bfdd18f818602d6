//! The per-turn pipeline: resolve the sender to a tenant and principal,
//! serialize on the tenant, gate, route into the flow handlers, persist the
//! dialog position with a version check, and hand back the replies. All of
//! this happens before the webhook is acknowledged; everything after the
//! acknowledgement (sends, rendering) is best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use karani_core::dialog::action::{normalize, Action, NormalizedInput, RawInput};
use karani_core::dialog::outbound::OutboundPlan;
use karani_core::dialog::session::{DialogSession, FlowData};
use karani_core::domain::document::DocumentId;
use karani_core::domain::tenant::Tenant;
use karani_core::errors::{EdgeError, TurnError};
use karani_core::gates;
use karani_core::msisdn::Msisdn;
use karani_db::repositories::{
    ClientRepository, DocumentRepository, ExpenseRepository, MembershipRepository,
    RepositoryError, TenantRepository,
};
use karani_transport::inbound::{InboundEvent, Transport};

use crate::flows::{self, onboarding, FlowCtx, TurnOutcome};

/// Everything the dialog needs to touch the outside world. Repositories
/// are trait objects so the whole engine runs against the in-memory
/// implementations in tests.
#[derive(Clone)]
pub struct Deps {
    pub tenants: Arc<dyn TenantRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
    pub country_code: String,
    pub trial_days: u32,
}

/// The fully-processed result of one webhook turn, ready for the
/// dispatcher: where to reply, what to say, and which freshly committed
/// document still needs rendering and delivery.
#[derive(Debug)]
pub struct TurnReply {
    pub transport: Transport,
    pub to: Msisdn,
    pub plans: Vec<OutboundPlan>,
    pub render: Option<DocumentId>,
}

/// In-process serialization of turns. Keys are tenant ids (or, during
/// onboarding, the phone itself); the optimistic `state_version` check in
/// the repository covers multi-process deployments.
#[derive(Default)]
struct LockMap {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockMap {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.to_owned()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct Engine {
    deps: Deps,
    locks: LockMap,
}

impl Engine {
    pub fn new(deps: Deps) -> Self {
        Self { deps, locks: LockMap::default() }
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    /// Process one inbound message. `Err` only for edge rejections (an
    /// unnormalizable sender identity); everything downstream degrades to
    /// a reply so the webhook can always acknowledge.
    pub async fn handle(&self, event: &InboundEvent) -> Result<TurnReply, EdgeError> {
        let phone = Msisdn::normalize(&event.from, &self.deps.country_code)?;

        match self.turn(&phone, event).await {
            Ok(reply) => Ok(reply),
            Err(repo_error) => {
                error!(
                    phone = %phone,
                    transport = event.transport.as_str(),
                    error = %repo_error,
                    "turn failed; replying with a generic failure"
                );
                let turn_error = TurnError::Persistence(repo_error.to_string());
                Ok(TurnReply {
                    transport: event.transport,
                    to: phone,
                    plans: vec![OutboundPlan::text(turn_error.user_message())],
                    render: None,
                })
            }
        }
    }

    async fn turn(
        &self,
        phone: &Msisdn,
        event: &InboundEvent,
    ) -> Result<TurnReply, RepositoryError> {
        let Some(tenant_id) = self.deps.memberships.find_binding(phone).await? else {
            return self.onboarding_turn(phone, event).await;
        };

        let _guard = self.locks.acquire(&tenant_id.to_string()).await;

        // Re-read under the lock so this turn sees the previous turn's
        // fully-applied state.
        let Some(tenant) = self.deps.tenants.find(&tenant_id).await? else {
            warn!(tenant_id = %tenant_id, "binding points at a missing tenant");
            return self.onboarding_turn(phone, event).await;
        };

        let principal =
            self.deps.memberships.find_active_principal(&tenant_id, phone).await?;
        let Some(principal) = principal else {
            return self.inactive_turn(phone, event, &tenant).await;
        };

        let now = Utc::now();
        let session = tenant.session.clone();

        // The access gate runs on every turn, not just at flow entry; a
        // principal can be demoted mid-conversation.
        if let Some(section) = session.state.section() {
            if !gates::section_allowed(principal.role, section) {
                info!(
                    tenant_id = %tenant.id,
                    state = session.state.as_str(),
                    role = principal.role.as_str(),
                    "access revoked mid-flow; resetting dialog"
                );
                let outcome = flows::reset_to_menu(
                    &principal,
                    format!("Access denied. Your role no longer covers {}.", section.label()),
                );
                return self.persist(event, phone, &tenant, outcome).await;
            }
        }

        let input = normalize(&event.input, Some(principal.role), &session);

        // Cancel is a plain transition available from anywhere mid-flow.
        if !session.is_ready()
            && matches!(input.action(), Some(Action::Cancel | Action::Menu))
        {
            let lead = if input.action() == Some(Action::Cancel) {
                "Cancelled. Nothing was saved."
            } else {
                "Back to the main menu."
            };
            let outcome = flows::reset_to_menu(&principal, lead);
            return self.persist(event, phone, &tenant, outcome).await;
        }

        let ctx = FlowCtx { deps: &self.deps, tenant: &tenant, principal: &principal, now };
        let outcome = if session.is_ready() {
            self.ready_turn(&ctx, &input).await?
        } else {
            self.flow_turn(&ctx, session, &input).await?
        };

        self.persist(event, phone, &tenant, outcome).await
    }

    async fn ready_turn(
        &self,
        ctx: &FlowCtx<'_>,
        input: &NormalizedInput,
    ) -> Result<TurnOutcome, RepositoryError> {
        let Some(action) = input.action() else {
            return Ok(flows::reset_to_menu(
                ctx.principal,
                "Sorry, I didn't catch that. Pick an option below or send its number.",
            ));
        };

        if let Some(section) = action.target_section() {
            if !gates::section_allowed(ctx.principal.role, section) {
                info!(
                    tenant_id = %ctx.tenant.id,
                    role = ctx.principal.role.as_str(),
                    section = section.as_str(),
                    "section denied at entry"
                );
                return Ok(flows::reset_to_menu(
                    ctx.principal,
                    format!("Access denied. Your role doesn't cover {}.", section.label()),
                ));
            }
        }

        match flows::start_action(ctx, action).await? {
            Some(outcome) => Ok(outcome),
            None => Ok(flows::reset_to_menu(ctx.principal, "Here's what I can do.")),
        }
    }

    async fn flow_turn(
        &self,
        ctx: &FlowCtx<'_>,
        session: DialogSession,
        input: &NormalizedInput,
    ) -> Result<TurnOutcome, RepositoryError> {
        let state = session.state;
        match session.data {
            FlowData::Document(flow) => flows::document::advance(ctx, state, flow, input).await,
            FlowData::Payment(flow) => flows::payment::advance(ctx, state, flow, input).await,
            FlowData::Expense(flow) => flows::expense::advance(ctx, state, flow, input).await,
            FlowData::Report(flow) => flows::report::advance(ctx, state, flow, input).await,
            FlowData::ClientBook(flow) => flows::clients::advance(ctx, state, flow, input).await,
            FlowData::Settings => flows::settings::advance(ctx, state, input).await,
            FlowData::Team(flow) => flows::team::advance(ctx, state, flow, input).await,
            // A tenant session never holds onboarding data; recover by
            // resetting rather than guessing.
            FlowData::Ready | FlowData::Onboarding(_) => {
                Ok(flows::reset_to_menu(ctx.principal, "Let's start over."))
            }
        }
    }

    /// Persist the outcome's dialog position (version-checked) and shape
    /// the reply. A concurrent writer having won the race is reported to
    /// the sender, not applied over.
    async fn persist(
        &self,
        event: &InboundEvent,
        phone: &Msisdn,
        tenant: &Tenant,
        mut outcome: TurnOutcome,
    ) -> Result<TurnReply, RepositoryError> {
        outcome.session.presented = outcome
            .plans
            .iter()
            .map(OutboundPlan::option_ids)
            .find(|ids| !ids.is_empty())
            .unwrap_or_default();

        match self
            .deps
            .tenants
            .save_session(&tenant.id, &outcome.session, tenant.state_version)
            .await
        {
            Ok(_) => Ok(TurnReply {
                transport: event.transport,
                to: phone.clone(),
                plans: outcome.plans,
                render: outcome.render,
            }),
            Err(RepositoryError::StaleVersion { .. }) => {
                warn!(tenant_id = %tenant.id, "stale session write rejected");
                Ok(TurnReply {
                    transport: event.transport,
                    to: phone.clone(),
                    plans: vec![OutboundPlan::text(TurnError::StaleSession.user_message())],
                    render: None,
                })
            }
            Err(other) => Err(other),
        }
    }

    async fn onboarding_turn(
        &self,
        phone: &Msisdn,
        event: &InboundEvent,
    ) -> Result<TurnReply, RepositoryError> {
        let _guard = self.locks.acquire(phone.as_str()).await;
        let now = Utc::now();

        match onboarding::turn(&self.deps, phone, &event.input, now).await? {
            onboarding::SignupTurn::Continue { mut session, plans } => {
                session.presented = plans
                    .iter()
                    .map(OutboundPlan::option_ids)
                    .find(|ids| !ids.is_empty())
                    .unwrap_or_default();
                self.deps.memberships.save_signup(phone, &session, now).await?;
                Ok(TurnReply { transport: event.transport, to: phone.clone(), plans, render: None })
            }
            onboarding::SignupTurn::Finished { plans } => {
                Ok(TurnReply { transport: event.transport, to: phone.clone(), plans, render: None })
            }
        }
    }

    /// The phone is bound to a tenant but holds no active role there: only
    /// a join action gets through.
    async fn inactive_turn(
        &self,
        phone: &Msisdn,
        event: &InboundEvent,
        tenant: &Tenant,
    ) -> Result<TurnReply, RepositoryError> {
        if let RawInput::Text(body) = &event.input {
            if let Some(attempt) =
                onboarding::try_join(&self.deps, phone, body, Utc::now()).await?
            {
                return Ok(TurnReply {
                    transport: event.transport,
                    to: phone.clone(),
                    plans: attempt.plans,
                    render: None,
                });
            }
        }

        let message = format!(
            "This number isn't active at {} yet. If you were invited, reply with `join <code>`.",
            tenant.name
        );
        Ok(TurnReply {
            transport: event.transport,
            to: phone.clone(),
            plans: vec![OutboundPlan::text(message)],
            render: None,
        })
    }
}
