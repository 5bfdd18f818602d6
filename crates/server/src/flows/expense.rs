//! Expense recording: category, free-text description, amount, method,
//! commit.

use rust_decimal::Decimal;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
use karani_core::dialog::session::{DialogSession, DialogState, ExpenseFlow, FlowData};
use karani_core::domain::money::{ExpenseCategory, PaymentMethod};
use karani_db::repositories::RepositoryError;

use super::{id_suffix, parse_amount, reset_to_menu, FlowCtx, TurnOutcome};
use crate::finalize;

pub fn start(_ctx: &FlowCtx<'_>) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(
            DialogState::ExpenseCategoryPick,
            FlowData::Expense(ExpenseFlow::start()),
        ),
        category_menu(),
    )
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: ExpenseFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::ExpenseCategoryPick => {
            let category = id_suffix(input, "category:").and_then(ExpenseCategory::parse);
            let Some(category) = category else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Expense(flow)),
                    category_menu(),
                ));
            };
            flow.category = Some(category);
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ExpenseDescription, FlowData::Expense(flow)),
                OutboundPlan::text("What was this expense for? A few words will do."),
            ))
        }

        DialogState::ExpenseDescription => {
            let description = input.text.trim();
            if description.is_empty() || input.action().is_some() {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Expense(flow)),
                    OutboundPlan::text("Describe the expense to continue."),
                ));
            }
            flow.description = Some(description.to_owned());
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ExpenseAmount, FlowData::Expense(flow)),
                OutboundPlan::text("How much was it?"),
            ))
        }

        DialogState::ExpenseAmount => {
            let Some(amount) = parse_amount(&input.text).filter(|value| *value > Decimal::ZERO)
            else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Expense(flow)),
                    OutboundPlan::text("Send the amount as a number above zero."),
                ));
            };
            flow.amount = Some(amount);
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ExpenseMethodPick, FlowData::Expense(flow)),
                method_menu(),
            ))
        }

        DialogState::ExpenseMethodPick => {
            let method = match input.action() {
                Some(Action::PayCash) => Some(PaymentMethod::Cash),
                Some(Action::PayMobile) => Some(PaymentMethod::MobileMoney),
                Some(Action::PayBank) => Some(PaymentMethod::Bank),
                _ => None,
            };
            let Some(method) = method else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Expense(flow)),
                    method_menu(),
                ));
            };

            match finalize::commit_expense(ctx, &flow, method).await? {
                Some(commit) => {
                    let lead = if commit.replayed {
                        "That expense was already recorded.".to_owned()
                    } else {
                        format!(
                            "Recorded {} {} under {}.",
                            ctx.tenant.currency,
                            commit.expense.amount.round_dp(2),
                            commit.expense.category.label(),
                        )
                    };
                    Ok(reset_to_menu(ctx.principal, lead))
                }
                None => Ok(reset_to_menu(
                    ctx.principal,
                    "Something was missing from that expense. Start it again from the menu.",
                )),
            }
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start that expense again.")),
    }
}

fn category_menu() -> OutboundPlan {
    let options: Vec<MenuOption> = ExpenseCategory::ALL
        .into_iter()
        .map(|category| {
            MenuOption::new(format!("category:{}", category.as_str()), category.label())
        })
        .collect();
    OutboundPlan::menu("What kind of expense is this?", options)
}

fn method_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "How was it paid?",
        vec![
            MenuOption::new(Action::PayCash.as_str(), Action::PayCash.label()),
            MenuOption::new(Action::PayMobile.as_str(), Action::PayMobile.label()),
            MenuOption::new(Action::PayBank.as_str(), Action::PayBank.label()),
        ],
    )
}
