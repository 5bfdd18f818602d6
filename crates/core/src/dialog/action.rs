use serde::{Deserialize, Serialize};

use crate::dialog::menu;
use crate::dialog::session::{DialogSession, DialogState};
use crate::domain::principal::{Role, Section};

/// Canonical, transport-independent user intents. Interactive button and
/// list ids carry these tokens verbatim; numbered replies resolve to them
/// through the per-role menu tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // main menu
    NewInvoice,
    NewQuote,
    NewReceipt,
    RecordPayment,
    RecordExpense,
    Reports,
    Clients,
    Settings,
    Team,
    Help,
    // shared flow controls
    Confirm,
    Cancel,
    Menu,
    // client selection sub-flow
    ClientSaved,
    ClientNew,
    // item flow
    ItemCatalogue,
    ItemCustom,
    AddItem,
    SetDiscount,
    // payment methods
    PayCash,
    PayMobile,
    PayBank,
    // reporting
    ReportSales,
    ReportExpenses,
    ReportToday,
    ReportWeek,
    ReportMonth,
    AllBranches,
    // clients section
    AddClient,
    ListClients,
    // settings fields
    SettingsName,
    SettingsCurrency,
    SettingsVat,
    SettingsLogo,
    // team & branches
    InviteUser,
    AddBranch,
    RoleManager,
    RoleClerk,
    // onboarding
    StartBusiness,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewInvoice => "new_invoice",
            Self::NewQuote => "new_quote",
            Self::NewReceipt => "new_receipt",
            Self::RecordPayment => "record_payment",
            Self::RecordExpense => "record_expense",
            Self::Reports => "reports",
            Self::Clients => "clients",
            Self::Settings => "settings",
            Self::Team => "team",
            Self::Help => "help",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Menu => "menu",
            Self::ClientSaved => "client_saved",
            Self::ClientNew => "client_new",
            Self::ItemCatalogue => "item_catalogue",
            Self::ItemCustom => "item_custom",
            Self::AddItem => "add_item",
            Self::SetDiscount => "set_discount",
            Self::PayCash => "pay_cash",
            Self::PayMobile => "pay_mobile",
            Self::PayBank => "pay_bank",
            Self::ReportSales => "report_sales",
            Self::ReportExpenses => "report_expenses",
            Self::ReportToday => "report_today",
            Self::ReportWeek => "report_week",
            Self::ReportMonth => "report_month",
            Self::AllBranches => "all_branches",
            Self::AddClient => "add_client",
            Self::ListClients => "list_clients",
            Self::SettingsName => "settings_name",
            Self::SettingsCurrency => "settings_currency",
            Self::SettingsVat => "settings_vat",
            Self::SettingsLogo => "settings_logo",
            Self::InviteUser => "invite_user",
            Self::AddBranch => "add_branch",
            Self::RoleManager => "role_manager",
            Self::RoleClerk => "role_clerk",
            Self::StartBusiness => "start_business",
        }
    }

    pub const ALL: [Self; 39] = [
        Self::NewInvoice,
        Self::NewQuote,
        Self::NewReceipt,
        Self::RecordPayment,
        Self::RecordExpense,
        Self::Reports,
        Self::Clients,
        Self::Settings,
        Self::Team,
        Self::Help,
        Self::Confirm,
        Self::Cancel,
        Self::Menu,
        Self::ClientSaved,
        Self::ClientNew,
        Self::ItemCatalogue,
        Self::ItemCustom,
        Self::AddItem,
        Self::SetDiscount,
        Self::PayCash,
        Self::PayMobile,
        Self::PayBank,
        Self::ReportSales,
        Self::ReportExpenses,
        Self::ReportToday,
        Self::ReportWeek,
        Self::ReportMonth,
        Self::AllBranches,
        Self::AddClient,
        Self::ListClients,
        Self::SettingsName,
        Self::SettingsCurrency,
        Self::SettingsVat,
        Self::SettingsLogo,
        Self::InviteUser,
        Self::AddBranch,
        Self::RoleManager,
        Self::RoleClerk,
        Self::StartBusiness,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NewInvoice => "New invoice",
            Self::NewQuote => "New quote",
            Self::NewReceipt => "New receipt",
            Self::RecordPayment => "Record payment",
            Self::RecordExpense => "Record expense",
            Self::Reports => "Reports",
            Self::Clients => "Clients",
            Self::Settings => "Settings",
            Self::Team => "Team & branches",
            Self::Help => "Help",
            Self::Confirm => "Confirm",
            Self::Cancel => "Cancel",
            Self::Menu => "Main menu",
            Self::ClientSaved => "Saved client",
            Self::ClientNew => "New client",
            Self::ItemCatalogue => "From catalogue",
            Self::ItemCustom => "Type it in",
            Self::AddItem => "Add another item",
            Self::SetDiscount => "Set discount",
            Self::PayCash => "Cash",
            Self::PayMobile => "Mobile money",
            Self::PayBank => "Bank transfer",
            Self::ReportSales => "Sales report",
            Self::ReportExpenses => "Expense report",
            Self::ReportToday => "Today",
            Self::ReportWeek => "This week",
            Self::ReportMonth => "This month",
            Self::AllBranches => "All branches",
            Self::AddClient => "Add a client",
            Self::ListClients => "List clients",
            Self::SettingsName => "Business name",
            Self::SettingsCurrency => "Currency",
            Self::SettingsVat => "VAT rate",
            Self::SettingsLogo => "Logo",
            Self::InviteUser => "Invite a user",
            Self::AddBranch => "Add a branch",
            Self::RoleManager => "Manager",
            Self::RoleClerk => "Clerk",
            Self::StartBusiness => "Start a business",
        }
    }

    /// The section a main-menu action opens. Used by the access gate at the
    /// ready state, before any flow data exists.
    pub fn target_section(self) -> Option<Section> {
        match self {
            Self::NewInvoice | Self::NewQuote | Self::NewReceipt => Some(Section::Documents),
            Self::RecordPayment => Some(Section::Payments),
            Self::RecordExpense => Some(Section::Expenses),
            Self::Reports => Some(Section::Reports),
            Self::Clients => Some(Section::Clients),
            Self::Settings => Some(Section::Settings),
            Self::Team => Some(Section::Team),
            _ => None,
        }
    }
}

/// The shape of one inbound message after transport parsing, before
/// normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawInput {
    Text(String),
    Interactive { id: String },
    Media { reference: String },
}

/// Normalizer output: a canonical action token (or a data id such as
/// `client:<uuid>` passed through from a list reply), plus the raw text for
/// states that consume free-form field input, plus a media reference for
/// the one state that accepts an attachment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedInput {
    pub action: Option<String>,
    pub text: String,
    pub media: Option<String>,
}

impl NormalizedInput {
    pub fn action(&self) -> Option<Action> {
        self.action.as_deref().and_then(Action::parse)
    }
}

/// Map a raw inbound message onto the action vocabulary.
///
/// Interactive ids pass through verbatim (lower-cased, trimmed). Plain text
/// is checked against a short alias table, then against digits: at the
/// ready state a digit indexes the role's main menu, elsewhere it indexes
/// the options most recently presented to this session. Unrecognized
/// digits and everything else stay free-form field input.
pub fn normalize(raw: &RawInput, role: Option<Role>, session: &DialogSession) -> NormalizedInput {
    match raw {
        RawInput::Interactive { id } => NormalizedInput {
            action: Some(id.trim().to_ascii_lowercase()),
            text: String::new(),
            media: None,
        },
        RawInput::Media { reference } => NormalizedInput {
            action: None,
            text: String::new(),
            media: Some(reference.clone()),
        },
        RawInput::Text(body) => {
            let text = body.trim().to_owned();
            let action = text_action(&text, role, session);
            NormalizedInput { action, text, media: None }
        }
    }
}

fn text_action(text: &str, role: Option<Role>, session: &DialogSession) -> Option<String> {
    let lowered = text.to_ascii_lowercase();
    if let Some(alias) = keyword_alias(&lowered) {
        return Some(alias.as_str().to_owned());
    }

    let index = lowered.parse::<usize>().ok()?.checked_sub(1)?;
    if session.state == DialogState::Ready {
        let menu = menu::main_menu(role?);
        menu.get(index).map(|action| action.as_str().to_owned())
    } else {
        session.presented.get(index).cloned()
    }
}

fn keyword_alias(lowered: &str) -> Option<Action> {
    match lowered {
        "cancel" | "stop" | "no" => Some(Action::Cancel),
        "confirm" | "yes" | "ok" => Some(Action::Confirm),
        "menu" => Some(Action::Menu),
        "help" => Some(Action::Help),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::dialog::session::{DialogSession, DialogState, FlowData, PaymentFlow};
    use crate::domain::principal::Role;

    use super::{normalize, Action, NormalizedInput, RawInput};

    fn ready() -> DialogSession {
        DialogSession::ready()
    }

    #[test]
    fn action_ids_round_trip_for_every_action() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action), "{action:?}");
        }
        assert_eq!(Action::parse("launch_rocket"), None);
    }

    #[test]
    fn interactive_ids_pass_through_lowercased_and_trimmed() {
        let input =
            normalize(&RawInput::Interactive { id: " New_Invoice ".to_owned() }, None, &ready());
        assert_eq!(input.action.as_deref(), Some("new_invoice"));
        assert_eq!(input.action(), Some(Action::NewInvoice));
    }

    #[test]
    fn ready_digit_resolves_against_the_role_menu() {
        let owner = normalize(&RawInput::Text("1".to_owned()), Some(Role::Owner), &ready());
        assert_eq!(owner.action(), Some(Action::NewInvoice));

        // The same digit means different things for different roles.
        let owner_two = normalize(&RawInput::Text("2".to_owned()), Some(Role::Owner), &ready());
        let clerk_two = normalize(&RawInput::Text("2".to_owned()), Some(Role::Clerk), &ready());
        assert_eq!(owner_two.action(), Some(Action::NewQuote));
        assert_eq!(clerk_two.action(), Some(Action::NewReceipt));
    }

    #[test]
    fn out_of_range_digit_stays_free_form() {
        let input = normalize(&RawInput::Text("47".to_owned()), Some(Role::Owner), &ready());
        assert_eq!(input.action, None);
        assert_eq!(input.text, "47");
    }

    #[test]
    fn digit_without_a_role_stays_free_form_at_ready() {
        let input = normalize(&RawInput::Text("1".to_owned()), None, &ready());
        assert_eq!(input, NormalizedInput { action: None, text: "1".to_owned(), media: None });
    }

    #[test]
    fn mid_flow_digit_resolves_against_presented_options() {
        let mut session =
            DialogSession::new(DialogState::PaymentInvoice, FlowData::Payment(PaymentFlow::start()));
        session.presented =
            vec!["invoice:11111111-1111-1111-1111-111111111111".to_owned(), "cancel".to_owned()];

        let first = normalize(&RawInput::Text("1".to_owned()), Some(Role::Clerk), &session);
        assert_eq!(first.action.as_deref(), Some("invoice:11111111-1111-1111-1111-111111111111"));

        let beyond = normalize(&RawInput::Text("3".to_owned()), Some(Role::Clerk), &session);
        assert_eq!(beyond.action, None);
    }

    #[test]
    fn keyword_aliases_map_to_flow_controls() {
        for (word, expected) in [
            ("cancel", Action::Cancel),
            ("STOP", Action::Cancel),
            ("yes", Action::Confirm),
            ("menu", Action::Menu),
            ("help", Action::Help),
        ] {
            let input = normalize(&RawInput::Text(word.to_owned()), Some(Role::Owner), &ready());
            assert_eq!(input.action(), Some(expected), "{word}");
        }
    }

    #[test]
    fn media_input_carries_the_reference_only() {
        let input = normalize(&RawInput::Media { reference: "media-93".to_owned() }, None, &ready());
        assert_eq!(input.media.as_deref(), Some("media-93"));
        assert_eq!(input.action, None);
    }
}
