//! Payment recording: pick an open invoice, take an amount bounded by the
//! outstanding balance, pick a method, commit.

use rust_decimal::Decimal;
use uuid::Uuid;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan, MAX_LIST_ROWS};
use karani_core::dialog::session::{DialogSession, DialogState, FlowData, PaymentFlow};
use karani_core::domain::document::DocumentId;
use karani_core::domain::money::PaymentMethod;
use karani_db::repositories::RepositoryError;

use super::{id_suffix, parse_amount, reset_to_menu, FlowCtx, TurnOutcome};
use crate::finalize;

pub async fn start(ctx: &FlowCtx<'_>) -> Result<TurnOutcome, RepositoryError> {
    let open = ctx.deps.documents.list_open_invoices(&ctx.tenant.id, MAX_LIST_ROWS as i64).await?;
    if open.is_empty() {
        return Ok(reset_to_menu(ctx.principal, "There are no open invoices right now."));
    }

    let flow = PaymentFlow::start();
    Ok(invoice_list(flow, open))
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: PaymentFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::PaymentInvoice => {
            if let Some(raw_id) = id_suffix(input, "invoice:") {
                if let Ok(id) = Uuid::parse_str(raw_id) {
                    let document_id = DocumentId(id);
                    if let Some(document) = ctx.deps.documents.find(&document_id).await? {
                        let paid = ctx.deps.documents.paid_total(&document_id).await?;
                        let outstanding = document.totals.total - paid;
                        if outstanding > Decimal::ZERO {
                            flow.document_id = Some(document_id);
                            flow.invoice_number = Some(document.number.clone());
                            flow.outstanding = Some(outstanding);
                            let prompt = format!(
                                "How much was paid against {}? Outstanding: {} {}.",
                                document.number,
                                ctx.tenant.currency,
                                outstanding.round_dp(2),
                            );
                            return Ok(TurnOutcome::new(
                                DialogSession::new(
                                    DialogState::PaymentAmount,
                                    FlowData::Payment(flow),
                                ),
                                OutboundPlan::text(prompt),
                            ));
                        }
                    }
                }
            }

            let open =
                ctx.deps.documents.list_open_invoices(&ctx.tenant.id, MAX_LIST_ROWS as i64).await?;
            if open.is_empty() {
                return Ok(reset_to_menu(ctx.principal, "There are no open invoices right now."));
            }
            Ok(invoice_list(flow, open))
        }

        DialogState::PaymentAmount => {
            let outstanding = flow.outstanding.unwrap_or(Decimal::ZERO);
            let Some(amount) = parse_amount(&input.text).filter(|value| *value > Decimal::ZERO)
            else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Payment(flow)),
                    OutboundPlan::text("Send the amount as a number above zero."),
                ));
            };
            if amount > outstanding {
                let message = format!(
                    "That is more than the {} {} outstanding on {}. Send an amount up to the balance.",
                    ctx.tenant.currency,
                    outstanding.round_dp(2),
                    flow.invoice_number.as_deref().unwrap_or("this invoice"),
                );
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Payment(flow)),
                    OutboundPlan::text(message),
                ));
            }

            flow.amount = Some(amount);
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::PaymentMethodPick, FlowData::Payment(flow)),
                method_menu("How was it paid?"),
            ))
        }

        DialogState::PaymentMethodPick => {
            let method = match input.action() {
                Some(Action::PayCash) => Some(PaymentMethod::Cash),
                Some(Action::PayMobile) => Some(PaymentMethod::MobileMoney),
                Some(Action::PayBank) => Some(PaymentMethod::Bank),
                _ => None,
            };
            let Some(method) = method else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Payment(flow)),
                    method_menu("Please pick how it was paid."),
                ));
            };

            match finalize::commit_payment(ctx, &flow, method).await? {
                Some(commit) => {
                    let number = flow.invoice_number.as_deref().unwrap_or("the invoice");
                    let lead = if commit.replayed {
                        format!("That payment against {number} was already recorded.")
                    } else if commit.settled {
                        format!(
                            "Recorded {} {} against {number}. The invoice is now fully paid.",
                            ctx.tenant.currency,
                            commit.payment.amount.round_dp(2),
                        )
                    } else {
                        format!(
                            "Recorded {} {} against {number}.",
                            ctx.tenant.currency,
                            commit.payment.amount.round_dp(2),
                        )
                    };
                    Ok(reset_to_menu(ctx.principal, lead))
                }
                None => Ok(reset_to_menu(
                    ctx.principal,
                    "I lost track of that invoice. Start the payment again from the menu.",
                )),
            }
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start that payment again.")),
    }
}

fn invoice_list(
    flow: PaymentFlow,
    open: Vec<karani_db::repositories::OpenInvoice>,
) -> TurnOutcome {
    let options: Vec<MenuOption> = open
        .iter()
        .map(|entry| {
            MenuOption::new(
                format!("invoice:{}", entry.document.id),
                format!(
                    "{} · {} ({} due)",
                    entry.document.number,
                    entry.document.client_name,
                    entry.outstanding.round_dp(2),
                ),
            )
        })
        .collect();
    TurnOutcome::new(
        DialogSession::new(DialogState::PaymentInvoice, FlowData::Payment(flow)),
        OutboundPlan::menu("Which invoice was paid?", options),
    )
}

fn method_menu(body: &str) -> OutboundPlan {
    OutboundPlan::menu(
        body,
        vec![
            MenuOption::new(Action::PayCash.as_str(), Action::PayCash.label()),
            MenuOption::new(Action::PayMobile.as_str(), Action::PayMobile.label()),
            MenuOption::new(Action::PayBank.as_str(), Action::PayBank.label()),
        ],
    )
}
