//! Reporting: sales or expenses over today / this week / this month.
//! Managers are pinned to their own branch; owners on a multi-branch plan
//! choose a branch or all of them.

use uuid::Uuid;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
use karani_core::dialog::session::{
    DialogSession, DialogState, FlowData, ReportFlow, ReportKind,
};
use karani_core::domain::branch::BranchId;
use karani_core::domain::money::ReportPeriod;
use karani_core::domain::principal::Role;
use karani_core::domain::tenant::Feature;
use karani_db::repositories::RepositoryError;

use super::{feature_allowed, id_suffix, reset_to_menu, upgrade_outcome, FlowCtx, TurnOutcome};

pub fn start(_ctx: &FlowCtx<'_>) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(DialogState::ReportType, FlowData::Report(ReportFlow::default())),
        type_menu(),
    )
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: ReportFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::ReportType => {
            let kind = match input.action() {
                Some(Action::ReportSales) => Some(ReportKind::Sales),
                Some(Action::ReportExpenses) => Some(ReportKind::Expenses),
                _ => None,
            };
            let Some(kind) = kind else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Report(flow)),
                    type_menu(),
                ));
            };
            if kind == ReportKind::Expenses && !feature_allowed(ctx, Feature::ExpenseReports) {
                return Ok(upgrade_outcome(ctx.principal, Feature::ExpenseReports));
            }

            flow.kind = Some(kind);
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ReportPeriodPick, FlowData::Report(flow)),
                period_menu(),
            ))
        }

        DialogState::ReportPeriodPick => {
            let period = match input.action() {
                Some(Action::ReportToday) => Some(ReportPeriod::Today),
                Some(Action::ReportWeek) => Some(ReportPeriod::ThisWeek),
                Some(Action::ReportMonth) => Some(ReportPeriod::ThisMonth),
                _ => None,
            };
            let Some(period) = period else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Report(flow)),
                    period_menu(),
                ));
            };
            flow.period = Some(period);

            // Managers only ever see their own branch.
            if ctx.principal.role == Role::Manager {
                flow.branch_id = ctx.principal.branch_id;
                return produce(ctx, &flow).await;
            }

            if feature_allowed(ctx, Feature::MultiBranch) {
                let branches = ctx.deps.tenants.list_branches(&ctx.tenant.id).await?;
                if branches.len() > 1 {
                    let mut options = vec![MenuOption::new(
                        Action::AllBranches.as_str(),
                        Action::AllBranches.label(),
                    )];
                    options.extend(branches.iter().map(|branch| {
                        MenuOption::new(format!("branch:{}", branch.id), branch.name.clone())
                    }));
                    return Ok(TurnOutcome::new(
                        DialogSession::new(DialogState::ReportBranchPick, FlowData::Report(flow)),
                        OutboundPlan::menu("Which branch?", options),
                    ));
                }
            }

            produce(ctx, &flow).await
        }

        DialogState::ReportBranchPick => {
            if input.action() == Some(Action::AllBranches) {
                flow.branch_id = None;
                return produce(ctx, &flow).await;
            }
            if let Some(raw_id) = id_suffix(input, "branch:") {
                if let Ok(id) = Uuid::parse_str(raw_id) {
                    flow.branch_id = Some(BranchId(id));
                    return produce(ctx, &flow).await;
                }
            }
            Ok(TurnOutcome::new(
                DialogSession::new(state, FlowData::Report(flow)),
                OutboundPlan::text("Pick a branch from the list, or `1` for all branches."),
            ))
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start that report again.")),
    }
}

async fn produce(ctx: &FlowCtx<'_>, flow: &ReportFlow) -> Result<TurnOutcome, RepositoryError> {
    let period = flow.period.unwrap_or(ReportPeriod::Today);
    let range = period.range(ctx.now);
    let branch_ref = flow.branch_id.as_ref();

    let scope = match branch_ref {
        Some(branch_id) => match ctx.deps.tenants.find_branch(branch_id).await? {
            Some(branch) => branch.name,
            None => "Unknown branch".to_owned(),
        },
        None => "All branches".to_owned(),
    };

    let body = match flow.kind.unwrap_or(ReportKind::Sales) {
        ReportKind::Sales => {
            let summary = ctx.deps.documents.sales_summary(&ctx.tenant.id, branch_ref, range).await?;
            format!(
                "Sales - {} ({scope})\nDocuments issued: {}\nTotal billed: {} {}\nPayments received: {} {}",
                period.label(),
                summary.document_count,
                ctx.tenant.currency,
                summary.total.round_dp(2),
                ctx.tenant.currency,
                summary.paid.round_dp(2),
            )
        }
        ReportKind::Expenses => {
            let summary = ctx.deps.expenses.summary(&ctx.tenant.id, branch_ref, range).await?;
            let mut lines = vec![format!(
                "Expenses - {} ({scope})\nRecorded: {}\nTotal: {} {}",
                period.label(),
                summary.expense_count,
                ctx.tenant.currency,
                summary.total.round_dp(2),
            )];
            for (category, amount) in &summary.by_category {
                lines.push(format!("• {}: {} {}", category.label(), ctx.tenant.currency, amount.round_dp(2)));
            }
            lines.join("\n")
        }
    };

    Ok(reset_to_menu(ctx.principal, body))
}

fn type_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "Which report would you like?",
        vec![
            MenuOption::new(Action::ReportSales.as_str(), Action::ReportSales.label()),
            MenuOption::new(Action::ReportExpenses.as_str(), Action::ReportExpenses.label()),
        ],
    )
}

fn period_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "For which period?",
        vec![
            MenuOption::new(Action::ReportToday.as_str(), Action::ReportToday.label()),
            MenuOption::new(Action::ReportWeek.as_str(), Action::ReportWeek.label()),
            MenuOption::new(Action::ReportMonth.as_str(), Action::ReportMonth.label()),
        ],
    )
}
