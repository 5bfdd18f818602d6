use crate::dialog::action::Action;
use crate::dialog::outbound::MenuOption;
use crate::domain::principal::Role;

/// The numbered main menu per role. Position is meaning: "1" from an owner
/// and "1" from a clerk resolve through these tables, so the same digit can
/// open different sections for different roles. Keep each table within the
/// selectable-list row limit.
pub fn main_menu(role: Role) -> &'static [Action] {
    match role {
        Role::Owner => &[
            Action::NewInvoice,
            Action::NewQuote,
            Action::NewReceipt,
            Action::RecordPayment,
            Action::RecordExpense,
            Action::Reports,
            Action::Clients,
            Action::Settings,
            Action::Team,
        ],
        Role::Manager => &[
            Action::NewInvoice,
            Action::NewQuote,
            Action::NewReceipt,
            Action::RecordPayment,
            Action::RecordExpense,
            Action::Reports,
            Action::Clients,
        ],
        Role::Clerk => &[
            Action::NewInvoice,
            Action::NewReceipt,
            Action::RecordPayment,
            Action::Clients,
        ],
    }
}

pub fn main_menu_options(role: Role) -> Vec<MenuOption> {
    main_menu(role)
        .iter()
        .map(|action| MenuOption::new(action.as_str(), action.label()))
        .collect()
}
