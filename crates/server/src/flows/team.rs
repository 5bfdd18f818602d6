//! Team & branches: invite a user (pending principal + shareable join
//! code) and create branches.

use uuid::Uuid;

use karani_core::dialog::action::{Action, NormalizedInput};
use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
use karani_core::dialog::session::{DialogSession, DialogState, FlowData, TeamFlow};
use karani_core::domain::branch::{Branch, BranchId};
use karani_core::domain::principal::{Principal, Role};
use karani_core::domain::tenant::Feature;
use karani_core::msisdn::Msisdn;
use karani_db::repositories::RepositoryError;

use super::{feature_allowed, id_suffix, reset_to_menu, upgrade_outcome, FlowCtx, TurnOutcome};

pub fn start(_ctx: &FlowCtx<'_>) -> TurnOutcome {
    TurnOutcome::new(
        DialogSession::new(DialogState::TeamMenu, FlowData::Team(TeamFlow::default())),
        section_menu(),
    )
}

pub async fn advance(
    ctx: &FlowCtx<'_>,
    state: DialogState,
    mut flow: TeamFlow,
    input: &NormalizedInput,
) -> Result<TurnOutcome, RepositoryError> {
    match state {
        DialogState::TeamMenu => match input.action() {
            Some(Action::InviteUser) => {
                if !feature_allowed(ctx, Feature::UserInvites) {
                    return Ok(upgrade_outcome(ctx.principal, Feature::UserInvites));
                }
                Ok(TurnOutcome::new(
                    DialogSession::new(DialogState::InvitePhone, FlowData::Team(flow)),
                    OutboundPlan::text("What's the team member's phone number?"),
                ))
            }
            Some(Action::AddBranch) => {
                if !feature_allowed(ctx, Feature::MultiBranch) {
                    return Ok(upgrade_outcome(ctx.principal, Feature::MultiBranch));
                }
                Ok(TurnOutcome::new(
                    DialogSession::new(DialogState::BranchName, FlowData::Team(flow)),
                    OutboundPlan::text("What should the branch be called?"),
                ))
            }
            _ => Ok(TurnOutcome::new(
                DialogSession::new(state, FlowData::Team(flow)),
                section_menu(),
            )),
        },

        DialogState::InvitePhone => {
            let Ok(phone) = Msisdn::normalize(input.text.trim(), &ctx.deps.country_code) else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Team(flow)),
                    OutboundPlan::text(
                        "That doesn't look like a phone number. Send it like 0712 345 678.",
                    ),
                ));
            };
            flow.invite_phone = Some(phone.as_str().to_owned());
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::InviteRole, FlowData::Team(flow)),
                role_menu(),
            ))
        }

        DialogState::InviteRole => {
            let role = match input.action() {
                Some(Action::RoleManager) => Some(Role::Manager),
                Some(Action::RoleClerk) => Some(Role::Clerk),
                _ => None,
            };
            let Some(role) = role else {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Team(flow)),
                    role_menu(),
                ));
            };
            flow.invite_role = Some(role);

            let branches = ctx.deps.tenants.list_branches(&ctx.tenant.id).await?;
            if branches.len() <= 1 {
                let branch_id = branches.first().map(|branch| branch.id);
                return create_invite(ctx, &flow, branch_id).await;
            }

            let options: Vec<MenuOption> = branches
                .iter()
                .map(|branch| {
                    MenuOption::new(format!("branch:{}", branch.id), branch.name.clone())
                })
                .collect();
            Ok(TurnOutcome::new(
                DialogSession::new(DialogState::InviteBranch, FlowData::Team(flow)),
                OutboundPlan::menu("Which branch will they work at?", options),
            ))
        }

        DialogState::InviteBranch => {
            if let Some(raw_id) = id_suffix(input, "branch:") {
                if let Ok(id) = Uuid::parse_str(raw_id) {
                    return create_invite(ctx, &flow, Some(BranchId(id))).await;
                }
            }
            Ok(TurnOutcome::new(
                DialogSession::new(state, FlowData::Team(flow)),
                OutboundPlan::text("Pick the branch from the list."),
            ))
        }

        DialogState::BranchName => {
            let name = input.text.trim();
            if name.is_empty() || input.action().is_some() {
                return Ok(TurnOutcome::new(
                    DialogSession::new(state, FlowData::Team(flow)),
                    OutboundPlan::text("Send the branch name to continue."),
                ));
            }
            ctx.deps
                .tenants
                .create_branch(&Branch {
                    id: BranchId(Uuid::new_v4()),
                    tenant_id: ctx.tenant.id,
                    name: name.to_owned(),
                    is_default: false,
                    created_at: ctx.now,
                })
                .await?;
            Ok(reset_to_menu(ctx.principal, format!("Branch {name} created.")))
        }

        _ => Ok(reset_to_menu(ctx.principal, "Let's start again from the menu.")),
    }
}

async fn create_invite(
    ctx: &FlowCtx<'_>,
    flow: &TeamFlow,
    branch_id: Option<BranchId>,
) -> Result<TurnOutcome, RepositoryError> {
    let (Some(phone_raw), Some(role)) = (flow.invite_phone.as_deref(), flow.invite_role) else {
        return Ok(reset_to_menu(ctx.principal, "Let's start that invite again from the menu."));
    };
    let Ok(phone) = Msisdn::from_canonical(phone_raw) else {
        return Ok(reset_to_menu(ctx.principal, "Let's start that invite again from the menu."));
    };

    let code = invite_code();
    let principal = Principal {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant.id,
        phone,
        role,
        branch_id,
        pending: true,
        invite_code: Some(code.clone()),
    };
    ctx.deps.memberships.save_principal(&principal).await?;

    let lead = format!(
        "Invite created. Ask them to message this number with:\n\njoin {code}\n\nThey join as {} once they do.",
        role.label().to_lowercase(),
    );
    Ok(reset_to_menu(ctx.principal, lead))
}

fn invite_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..6].to_ascii_uppercase()
}

fn section_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "Team & branches - what would you like to do?",
        vec![
            MenuOption::new(Action::InviteUser.as_str(), Action::InviteUser.label()),
            MenuOption::new(Action::AddBranch.as_str(), Action::AddBranch.label()),
        ],
    )
}

fn role_menu() -> OutboundPlan {
    OutboundPlan::menu(
        "What role should they have?",
        vec![
            MenuOption::new(Action::RoleManager.as_str(), Action::RoleManager.label()),
            MenuOption::new(Action::RoleClerk.as_str(), Action::RoleClerk.label()),
        ],
    )
}
