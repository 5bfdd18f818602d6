//! Per-flow dialog handlers. Each module owns one flow family: given the
//! current state, its typed session payload and the normalized input, it
//! returns the next dialog position plus the replies for this turn. Side
//! effects with external consequences only ever happen in the terminal
//! confirm states, through the finalizer.

pub mod clients;
pub mod document;
pub mod expense;
pub mod onboarding;
pub mod payment;
pub mod report;
pub mod settings;
pub mod team;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::menu;
use karani_core::dialog::outbound::OutboundPlan;
use karani_core::dialog::session::DialogSession;
use karani_core::domain::document::DocumentId;
use karani_core::domain::principal::Principal;
use karani_core::domain::tenant::{Feature, Tenant};
use karani_db::repositories::RepositoryError;

use crate::engine::Deps;

/// Everything a handler may read during one turn. Handlers never touch the
/// tenant's session through this; the session travels through the outcome.
pub struct FlowCtx<'a> {
    pub deps: &'a Deps,
    pub tenant: &'a Tenant,
    pub principal: &'a Principal,
    pub now: DateTime<Utc>,
}

/// The result of one turn: where the dialog now stands, what to say, and
/// (after a document commit) which document to render and deliver once the
/// tenant lock is released.
#[derive(Debug)]
pub struct TurnOutcome {
    pub session: DialogSession,
    pub plans: Vec<OutboundPlan>,
    pub render: Option<DocumentId>,
}

impl TurnOutcome {
    pub fn new(session: DialogSession, plan: OutboundPlan) -> Self {
        Self { session, plans: vec![plan], render: None }
    }

    pub fn with_plans(session: DialogSession, plans: Vec<OutboundPlan>) -> Self {
        Self { session, plans, render: None }
    }

    pub fn and_render(mut self, document_id: DocumentId) -> Self {
        self.render = Some(document_id);
        self
    }
}

pub fn menu_plan(principal: &Principal) -> OutboundPlan {
    OutboundPlan::menu(
        "What would you like to do?",
        menu::main_menu_options(principal.role),
    )
}

/// Terminal exit shared by cancel, completion and denial: back to ready
/// with empty session data, lead message first, then the role menu.
pub fn reset_to_menu(principal: &Principal, lead: impl Into<String>) -> TurnOutcome {
    TurnOutcome::with_plans(
        DialogSession::ready(),
        vec![OutboundPlan::text(lead), menu_plan(principal)],
    )
}

/// Feature denial is a dead end, not a reset: the upgrade message replaces
/// the gated flow and the sender re-enters from the menu after upgrading.
pub fn upgrade_outcome(principal: &Principal, feature: Feature) -> TurnOutcome {
    let message = format!(
        "{} are part of the {} plan. Upgrade from the web dashboard, then come back and try again.",
        capitalize(feature.label()),
        feature.minimum_package().label()
    );
    reset_to_menu(principal, message)
}

pub fn feature_allowed(ctx: &FlowCtx<'_>, feature: Feature) -> bool {
    karani_core::gates::feature_allowed(ctx.tenant.effective_package(ctx.now), feature)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Amounts arrive as chat text: allow thousands separators and a currency
/// word before or after, reject everything else.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

pub fn parse_percent(text: &str) -> Option<Decimal> {
    let value = parse_amount(text.trim_end_matches('%'))?;
    ((Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&value)).then_some(value)
}

/// Data ids presented in lists carry a `kind:` prefix so a reply can be
/// told apart from a plain action token.
pub fn id_suffix<'a>(input: &'a NormalizedInput, prefix: &str) -> Option<&'a str> {
    input.action.as_deref()?.strip_prefix(prefix)
}

/// Route a main-menu action into its flow's first state. `None` means the
/// action opens no flow (free text, help, menu) and the caller falls back
/// to re-showing the menu. Access gating happened before this; feature
/// gates live inside the individual starters.
pub async fn start_action(
    ctx: &FlowCtx<'_>,
    action: Action,
) -> Result<Option<TurnOutcome>, RepositoryError> {
    use karani_core::domain::document::DocumentKind;

    let outcome = match action {
        Action::NewInvoice => Some(document::start(ctx, DocumentKind::Invoice).await?),
        Action::NewQuote => Some(document::start(ctx, DocumentKind::Quote).await?),
        Action::NewReceipt => Some(document::start(ctx, DocumentKind::Receipt).await?),
        Action::RecordPayment => Some(payment::start(ctx).await?),
        Action::RecordExpense => Some(expense::start(ctx)),
        Action::Reports => Some(report::start(ctx)),
        Action::Clients => Some(clients::start(ctx)),
        Action::Settings => Some(settings::start(ctx)),
        Action::Team => Some(team::start(ctx)),
        _ => None,
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{parse_amount, parse_percent};

    #[test]
    fn amounts_tolerate_chat_formatting() {
        assert_eq!(parse_amount("1500"), Some(Decimal::from(1500)));
        assert_eq!(parse_amount(" 1,500.50 "), Some(Decimal::new(150050, 2)));
        assert_eq!(parse_amount("KES 2000"), Some(Decimal::from(2000)));
        assert_eq!(parse_amount("two hundred"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn percentages_are_bounded() {
        assert_eq!(parse_percent("10"), Some(Decimal::from(10)));
        assert_eq!(parse_percent("12.5%"), Some(Decimal::new(125, 1)));
        assert_eq!(parse_percent("150"), None);
    }
}
