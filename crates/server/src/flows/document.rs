//! Invoice / quote / receipt creation: pick or capture a client, collect
//! line items from the catalogue or free text, optional document discount,
//! then a running summary awaiting confirm.

use rust_decimal::Decimal;
use uuid::Uuid;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan, MAX_LIST_ROWS};
use karani_core::dialog::session::{DialogSession, DialogState, DocumentFlow, FlowData};
use karani_core::domain::client::{Client, ClientId, ProductId};
use karani_core::domain::document::{compute_totals, DocumentKind, DraftItem};
use karani_core::msisdn::Msisdn;
use karani_db::repositories::RepositoryError;

use super::{id_suffix, parse_amount, parse_percent, reset_to_menu, FlowCtx, TurnOutcome};
use crate::finalize;

pub async fn start(ctx: &FlowCtx<'_>, kind: DocumentKind) -> Result<TurnOutcome, RepositoryError> {
    let flow = DocumentFlow::start(kind);
    let saved_clients = ctx.deps.clients.list_recent(&ctx.tenant.id, 1).await?;

    if saved_clients.is_empty() {
        return Ok(ask_client_name(ctx, flow));
    }

    let session =
        DialogSession::new(DialogState::ClientChoice, FlowData::Document(flow));
    let plan = OutboundPlan::menu(
        format!("Starting a new {}. Who is it for?", kind.label().to_lowercase()),
        vec![
            MenuOption::new(Action::ClientSaved.as_str(), Action::ClientSaved.label()),
            MenuOption::new(Action::ClientNew.as_str(), Action::ClientNew.label()),
        ],
    );
    Ok(TurnOutcome::new(session, plan))
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: DocumentFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::ClientChoice => match input.action() {
            Some(Action::ClientSaved) => pick_client(ctx, flow).await,
            Some(Action::ClientNew) => Ok(ask_client_name(ctx, flow)),
            _ => {
                let plan = OutboundPlan::menu(
                    "Please choose how to pick the client.",
                    vec![
                        MenuOption::new(Action::ClientSaved.as_str(), Action::ClientSaved.label()),
                        MenuOption::new(Action::ClientNew.as_str(), Action::ClientNew.label()),
                    ],
                );
                Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    plan,
                ))
            }
        },

        DialogState::ClientPick => {
            if let Some(raw_id) = id_suffix(input, "client:") {
                if let Some(client) = find_client(ctx, raw_id).await? {
                    flow.client_id = Some(client.id);
                    flow.client_name = Some(client.name);
                    return ask_item_source(ctx, flow).await;
                }
            }
            pick_client(ctx, flow).await
        }

        DialogState::ClientName => {
            let name = input.text.trim();
            if name.is_empty() || input.action().is_some() {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    OutboundPlan::text("Send the client's name to continue."),
                ));
            }
            flow.client_name = Some(name.to_owned());
            let prompt = format!(
                "What is {name}'s phone number? Send `skip` if you don't have it."
            );
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ClientPhone, FlowData::Document(flow)),
                OutboundPlan::text(prompt),
            ))
        }

        DialogState::ClientPhone => {
            let raw = input.text.trim();
            let phone = if raw.eq_ignore_ascii_case("skip") {
                None
            } else {
                match Msisdn::normalize(raw, &ctx.deps.country_code) {
                    Ok(msisdn) => Some(msisdn.as_str().to_owned()),
                    Err(_) => {
                        return Ok(TurnOutcome::new(
                            DialogSession::new(state, FlowData::Document(flow)),
                            OutboundPlan::text(
                                "That doesn't look like a phone number. Send it again, or `skip`.",
                            ),
                        ));
                    }
                }
            };

            let client = Client {
                id: ClientId(Uuid::new_v4()),
                tenant_id: ctx.tenant.id,
                name: flow.client_name.clone().unwrap_or_default(),
                phone,
                created_at: ctx.now,
            };
            ctx.deps.clients.create(&client).await?;
            flow.client_id = Some(client.id);
            ask_item_source(ctx, flow).await
        }

        DialogState::ItemSource => match input.action() {
            Some(Action::ItemCatalogue) => pick_product(ctx, flow).await,
            Some(Action::ItemCustom) => Ok(ask_description(flow)),
            _ => ask_item_source(ctx, flow).await,
        },

        DialogState::ItemPick => {
            if let Some(raw_id) = id_suffix(input, "product:") {
                if let Some(product) = find_product(ctx, raw_id).await? {
                    flow.pending_description = Some(product.name.clone());
                    flow.pending_unit_price = Some(product.unit_price);
                    flow.pending_line_discount = product.discount_pct;
                    let prompt = format!("How many × {}? Send a number.", product.name);
                    return Ok(TurnOutcome::new(
                        DialogSession::new(DialogState::ItemQuantity, FlowData::Document(flow)),
                        OutboundPlan::text(prompt),
                    ));
                }
            }
            pick_product(ctx, flow).await
        }

        DialogState::ItemDescription => {
            let description = input.text.trim();
            if description.is_empty() || input.action().is_some() {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    OutboundPlan::text("Describe the item in a few words."),
                ));
            }
            flow.pending_description = Some(description.to_owned());
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ItemQuantity, FlowData::Document(flow)),
                OutboundPlan::text("How many? Send a number."),
            ))
        }

        DialogState::ItemQuantity => {
            let Some(quantity) = parse_amount(&input.text).filter(|value| *value > Decimal::ZERO)
            else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    OutboundPlan::text("The quantity must be a number above zero. Try again."),
                ));
            };
            flow.pending_quantity = Some(quantity);

            if flow.pending_unit_price.is_some() {
                push_pending_item(&mut flow);
                return Ok(item_more(ctx, flow));
            }
            let prompt = match &flow.pending_description {
                Some(description) => format!("Unit price for {description}?"),
                None => "Unit price?".to_owned(),
            };
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::ItemPrice, FlowData::Document(flow)),
                OutboundPlan::text(prompt),
            ))
        }

        DialogState::ItemPrice => {
            let Some(price) = parse_amount(&input.text).filter(|value| *value >= Decimal::ZERO)
            else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    OutboundPlan::text("The price must be a number, 0 or more. Try again."),
                ));
            };
            flow.pending_unit_price = Some(price);
            push_pending_item(&mut flow);
            Ok(item_more(ctx, flow))
        }

        DialogState::ItemMore => match input.action() {
            Some(Action::AddItem) => {
                flow.clear_pending_item();
                ask_item_source(ctx, flow).await
            }
            Some(Action::SetDiscount) => Ok(TurnOutcome::new(
                DialogSession::new(DialogState::DocumentDiscount, FlowData::Document(flow)),
                OutboundPlan::text("What discount, as a percentage of the whole document? (0-100)"),
            )),
            Some(Action::Confirm) => Ok(confirm_summary(ctx, flow)),
            _ => Ok(item_more(ctx, flow)),
        },

        DialogState::DocumentDiscount => {
            let Some(discount) = parse_percent(&input.text) else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Document(flow)),
                    OutboundPlan::text("Send the discount as a percentage between 0 and 100."),
                ));
            };
            flow.discount_pct = discount;
            Ok(confirm_summary(ctx, flow))
        }

        DialogState::DocumentConfirm => match input.action() {
            Some(Action::Confirm) => {
                let commit = finalize::commit_document(ctx, &flow).await?;
                let lead = if commit.replayed {
                    format!(
                        "{} {} was already created. Total {}.",
                        commit.document.kind.label(),
                        commit.document.number,
                        money(ctx, commit.document.totals.total),
                    )
                } else {
                    format!(
                        "{} {} created for {}. Total {}. Sending the document now.",
                        commit.document.kind.label(),
                        commit.document.number,
                        commit.document.client_name,
                        money(ctx, commit.document.totals.total),
                    )
                };
                Ok(reset_to_menu(ctx.principal, lead).and_render(commit.document.id))
            }
            _ => Ok(confirm_summary(ctx, flow)),
        },

        _ => Ok(confirm_summary(ctx, flow)),
    }
}

fn ask_client_name(_ctx: &FlowCtx<'_>, flow: DocumentFlow) -> TurnOutcome {
    let prompt = format!(
        "Starting a new {}. Who is it for? Send the client's name.",
        flow.kind.label().to_lowercase()
    );
    TurnOutcome::new(
        DialogSession::new(DialogState::ClientName, FlowData::Document(flow)),
        OutboundPlan::text(prompt),
    )
}

async fn pick_client(
    ctx: &FlowCtx<'_>,
    flow: DocumentFlow,
) -> Result<TurnOutcome, RepositoryError> {
    let clients = ctx.deps.clients.list_recent(&ctx.tenant.id, MAX_LIST_ROWS as i64).await?;
    if clients.is_empty() {
        return Ok(ask_client_name(ctx, flow));
    }

    let options: Vec<MenuOption> = clients
        .iter()
        .map(|client| MenuOption::new(format!("client:{}", client.id), client.name.clone()))
        .collect();
    let plan = OutboundPlan::menu("Which client is this for?", options);
    Ok(TurnOutcome::new(
        DialogSession::new(DialogState::ClientPick, FlowData::Document(flow)),
        plan,
    ))
}

async fn ask_item_source(
    ctx: &FlowCtx<'_>,
    flow: DocumentFlow,
) -> Result<TurnOutcome, RepositoryError> {
    let products = ctx.deps.clients.list_products(&ctx.tenant.id, 1).await?;
    if products.is_empty() {
        return Ok(ask_description(flow));
    }

    let plan = OutboundPlan::menu(
        "Add an item: pick from your catalogue or type it in.",
        vec![
            MenuOption::new(Action::ItemCatalogue.as_str(), Action::ItemCatalogue.label()),
            MenuOption::new(Action::ItemCustom.as_str(), Action::ItemCustom.label()),
        ],
    );
    Ok(TurnOutcome::new(
        DialogSession::new(DialogState::ItemSource, FlowData::Document(flow)),
        plan,
    ))
}

fn ask_description(flow: DocumentFlow) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(DialogState::ItemDescription, FlowData::Document(flow)),
        OutboundPlan::text("Describe the item (e.g. `Website design`)."),
    )
}

async fn pick_product(
    ctx: &FlowCtx<'_>,
    flow: DocumentFlow,
) -> Result<TurnOutcome, RepositoryError> {
    let products = ctx.deps.clients.list_products(&ctx.tenant.id, MAX_LIST_ROWS as i64).await?;
    if products.is_empty() {
        return Ok(ask_description(flow));
    }

    let options: Vec<MenuOption> = products
        .iter()
        .map(|product| {
            MenuOption::new(
                format!("product:{}", product.id),
                format!("{} ({})", product.name, money_raw(product.unit_price)),
            )
        })
        .collect();
    Ok(TurnOutcome::new(
        DialogSession::new(DialogState::ItemPick, FlowData::Document(flow)),
        OutboundPlan::menu("Pick an item from your catalogue.", options),
    ))
}

fn push_pending_item(flow: &mut DocumentFlow) {
    let item = DraftItem {
        description: flow.pending_description.clone().unwrap_or_default(),
        quantity: flow.pending_quantity.unwrap_or(Decimal::ONE),
        unit_price: flow.pending_unit_price.unwrap_or(Decimal::ZERO),
        discount_pct: flow.pending_line_discount,
    };
    if item.is_committable() {
        flow.items.push(item);
    }
    flow.clear_pending_item();
}

fn item_more(ctx: &FlowCtx<'_>, flow: DocumentFlow) -> TurnOutcome {
    let body = format!("{}\n\nAnything else?", summary_text(ctx, &flow));
    let plan = OutboundPlan::menu(
        body,
        vec![
            MenuOption::new(Action::AddItem.as_str(), Action::AddItem.label()),
            MenuOption::new(Action::SetDiscount.as_str(), Action::SetDiscount.label()),
            MenuOption::new(Action::Confirm.as_str(), Action::Confirm.label()),
        ],
    );
    TurnOutcome::new(DialogSession::new(DialogState::ItemMore, FlowData::Document(flow)), plan)
}

fn confirm_summary(ctx: &FlowCtx<'_>, flow: DocumentFlow) -> TurnOutcome {
    let body = format!("{}\n\nShall I create it?", summary_text(ctx, &flow));
    let plan = OutboundPlan::menu(
        body,
        vec![
            MenuOption::new(Action::Confirm.as_str(), Action::Confirm.label()),
            MenuOption::new(Action::Cancel.as_str(), Action::Cancel.label()),
        ],
    );
    TurnOutcome::new(
        DialogSession::new(DialogState::DocumentConfirm, FlowData::Document(flow)),
        plan,
    )
}

fn summary_text(ctx: &FlowCtx<'_>, flow: &DocumentFlow) -> String {
    let mut lines = vec![format!(
        "{} for {}:",
        flow.kind.label(),
        flow.client_name.as_deref().unwrap_or("Walk-in client")
    )];
    for item in &flow.items {
        lines.push(format!(
            "• {} × {} @ {} = {}",
            item.quantity.normalize(),
            item.description,
            money_raw(item.unit_price),
            money_raw(item.line_total()),
        ));
    }

    let totals = compute_totals(&flow.items, flow.discount_pct, ctx.tenant.vat_rate, flow.kind);
    if !totals.discount.is_zero() {
        lines.push(format!(
            "Discount {}%: -{}",
            flow.discount_pct.normalize(),
            money_raw(totals.discount)
        ));
    }
    if !totals.vat.is_zero() {
        lines.push(format!(
            "VAT {}%: {}",
            ctx.tenant.vat_rate.normalize(),
            money_raw(totals.vat)
        ));
    }
    lines.push(format!("Total: {}", money(ctx, totals.total)));
    lines.join("\n")
}

fn money(ctx: &FlowCtx<'_>, amount: Decimal) -> String {
    format!("{} {}", ctx.tenant.currency, amount.round_dp(2))
}

fn money_raw(amount: Decimal) -> String {
    amount.round_dp(2).normalize().to_string()
}

async fn find_client(
    ctx: &FlowCtx<'_>,
    raw_id: &str,
) -> Result<Option<Client>, RepositoryError> {
    let Ok(id) = Uuid::parse_str(raw_id) else {
        return Ok(None);
    };
    ctx.deps.clients.find(&ClientId(id)).await
}

async fn find_product(
    ctx: &FlowCtx<'_>,
    raw_id: &str,
) -> Result<Option<karani_core::domain::client::Product>, RepositoryError> {
    let Ok(id) = Uuid::parse_str(raw_id) else {
        return Ok(None);
    };
    ctx.deps.clients.find_product(&ProductId(id)).await
}
