//! The clients section: add a contact or list the saved ones.

use uuid::Uuid;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan, MAX_LIST_ROWS};
use karani_core::dialog::session::{ClientBookFlow, DialogSession, DialogState, FlowData};
use karani_core::domain::client::{Client, ClientId};
use karani_core::msisdn::Msisdn;
use karani_db::repositories::RepositoryError;

use super::{reset_to_menu, FlowCtx, TurnOutcome};

pub fn start(_ctx: &FlowCtx<'_>) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(
            DialogState::ClientBookMenu,
            FlowData::ClientBook(ClientBookFlow::default()),
        ),
        section_menu(),
    )
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: ClientBookFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::ClientBookMenu => match input.action() {
            Some(Action::AddClient) => Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ClientBookName, FlowData::ClientBook(flow)),
                OutboundPlan::text("What's the client's name?"),
            )),
            Some(Action::ListClients) => {
                let clients =
                    ctx.deps.clients.list_recent(&ctx.tenant.id, MAX_LIST_ROWS as i64).await?;
                if clients.is_empty() {
                    return Ok(reset_to_menu(ctx.principal, "No clients saved yet."));
                }
                let mut lines = vec!["Your clients:".to_owned()];
                for client in &clients {
                    match &client.phone {
                        Some(phone) => lines.push(format!("• {} ({phone})", client.name)),
                        None => lines.push(format!("• {}", client.name)),
                    }
                }
                if clients.len() == MAX_LIST_ROWS {
                    lines.push("Showing the most recent. There may be more.".to_owned());
                }
                Ok(reset_to_menu(ctx.principal, lines.join("\n")))
            }
            _ => Ok(TurnOutcome::new(
                DialogSession::new(state, FlowData::ClientBook(flow)),
                section_menu(),
            )),
        },

        DialogState::ClientBookName => {
            let name = input.text.trim();
            if name.is_empty() || input.action().is_some() {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::ClientBook(flow)),
                    OutboundPlan::text("Send the client's name to continue."),
                ));
            }
            flow.name = Some(name.to_owned());
            let prompt =
                format!("What is {name}'s phone number? Send `skip` if you don't have it.");
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ClientBookPhone, FlowData::ClientBook(flow)),
                OutboundPlan::text(prompt),
            ))
        }

        DialogState::ClientBookPhone => {
            let raw = input.text.trim();
            let phone = if raw.eq_ignore_ascii_case("skip") {
                None
            } else {
                match Msisdn::normalize(raw, &ctx.deps.country_code) {
                    Ok(msisdn) => Some(msisdn.as_str().to_owned()),
                    Err(_) => {
                        return Ok(TurnOutcome::new(
                            DialogSession::new(state, FlowData::ClientBook(flow)),
                            OutboundPlan::text(
                                "That doesn't look like a phone number. Send it again, or `skip`.",
                            ),
                        ));
                    }
                }
            };

            let name = flow.name.clone().unwrap_or_default();
            ctx.deps
                .clients
                .create(&Client {
                    id: ClientId(Uuid::new_v4()),
                    tenant_id: ctx.tenant.id,
                    name: name.clone(),
                    phone,
                    created_at: ctx.now,
                })
                .await?;
            Ok(reset_to_menu(ctx.principal, format!("Saved {name}.")))
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start again from the menu.")),
    }
}

fn section_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "Clients - what would you like to do?",
        vec![
            MenuOption::new(Action::AddClient.as_str(), Action::AddClient.label()),
            MenuOption::new(Action::ListClients.as_str(), Action::ListClients.label()),
        ],
    )
}
