//! Business settings: one state per mutable field, each with its own input
//! grammar. Logo upload is the one state that accepts an image attachment.

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
use karani_core::dialog::session::{DialogSession, DialogState, FlowData};
use karani_core::domain::tenant::Feature;
use karani_db::repositories::RepositoryError;

use super::{feature_allowed, parse_percent, reset_to_menu, upgrade_outcome, FlowCtx, TurnOutcome};

pub fn start(_ctx: &FlowCtx<'_>) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(DialogState::SettingsMenu, FlowData::Settings),
        section_menu(),
    )
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::SettingsMenu => match input.action() {
            Some(Action::SettingsName) => Ok(prompt(DialogState::SettingsName,
                "Send the new business name.")),
            Some(Action::SettingsCurrency) => Ok(prompt(
                DialogState::SettingsCurrency,
                "Which currency should documents use? Send a 3-letter code like KES or USD.",
            )),
            Some(Action::SettingsVat) => Ok(prompt(
                DialogState::SettingsVat,
                "What VAT rate should invoices and quotes carry? Send a percentage (0 for none).",
            )),
            Some(Action::SettingsLogo) => {
                if !feature_allowed(ctx, Feature::LogoUpload) {
                    return Ok(upgrade_outcome(ctx.principal, Feature::LogoUpload));
                }
                Ok(prompt(DialogState::SettingsLogo, "Send your logo as an image attachment."))
            }
            _ => Ok(TurnOutcome::new(
                DialogSession::new(state, FlowData::Settings),
                section_menu(),
            )),
        },

        DialogState::SettingsName => {
            let name = input.text.trim();
            if name.is_empty() || input.action().is_some() {
                return Ok(prompt(state, "Send the new business name as plain text."));
            }
            let mut tenant = ctx.tenant.clone();
            tenant.name = name.to_owned();
            ctx.deps.tenants.update_profile(&tenant).await?;
            Ok(reset_to_menu(ctx.principal, format!("Business name updated to {name}.")))
        }

        DialogState::SettingsCurrency => {
            let code = input.text.trim().to_ascii_uppercase();
            if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Ok(prompt(state, "Currency codes are 3 letters, like KES. Try again."));
            }
            let mut tenant = ctx.tenant.clone();
            tenant.currency = code.clone();
            ctx.deps.tenants.update_profile(&tenant).await?;
            Ok(reset_to_menu(ctx.principal, format!("Currency updated to {code}.")))
        }

        DialogState::SettingsVat => {
            let Some(rate) = parse_percent(&input.text) else {
                return Ok(prompt(state, "Send the VAT rate as a percentage between 0 and 100."));
            };
            let mut tenant = ctx.tenant.clone();
            tenant.vat_rate = rate;
            ctx.deps.tenants.update_profile(&tenant).await?;
            let lead = if rate.is_zero() {
                "VAT disabled. Documents will carry no VAT line.".to_owned()
            } else {
                format!("VAT set to {}%.", rate.normalize())
            };
            Ok(reset_to_menu(ctx.principal, lead))
        }

        DialogState::SettingsLogo => {
            let Some(reference) = input.media.as_deref() else {
                return Ok(prompt(
                    state,
                    "I need the logo as an image attachment. Send the picture itself.",
                ));
            };
            let mut tenant = ctx.tenant.clone();
            tenant.logo_url = Some(reference.to_owned());
            ctx.deps.tenants.update_profile(&tenant).await?;
            Ok(reset_to_menu(ctx.principal, "Logo updated. It will appear on new documents."))
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start again from the menu.")),
    }
}

fn prompt(state: DialogState, body: &str) -> TurnOutcome {
    TurnOutcome::new(DialogSession::new(state, FlowData::Settings), OutboundPlan::text(body))
}

fn section_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "Business settings - what would you like to change?",
        vec![
            MenuOption::new(Action::SettingsName.as_str(), Action::SettingsName.label()),
            MenuOption::new(Action::SettingsCurrency.as_str(), Action::SettingsCurrency.label()),
            MenuOption::new(Action::SettingsVat.as_str(), Action::SettingsVat.label()),
            MenuOption::new(Action::SettingsLogo.as_str(), Action::SettingsLogo.label()),
        ],
    )
}
