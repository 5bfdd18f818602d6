use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::branch::BranchId;
use crate::domain::client::ClientId;
use crate::domain::document::{DocumentId, DocumentKind, DraftItem};
use crate::domain::money::{ExpenseCategory, ReportPeriod};
use crate::domain::principal::{Role, Section};

/// The dialog's program counter: where a tenant's conversation currently
/// stands. A closed enumeration; every webhook turn is a transition
/// between these states and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    Ready,
    // document flow
    ClientChoice,
    ClientPick,
    ClientName,
    ClientPhone,
    ItemSource,
    ItemPick,
    ItemDescription,
    ItemQuantity,
    ItemPrice,
    ItemMore,
    DocumentDiscount,
    DocumentConfirm,
    // payment flow
    PaymentInvoice,
    PaymentAmount,
    PaymentMethodPick,
    // expense flow
    ExpenseCategoryPick,
    ExpenseDescription,
    ExpenseAmount,
    ExpenseMethodPick,
    // reporting flow
    ReportType,
    ReportPeriodPick,
    ReportBranchPick,
    // clients section
    ClientBookMenu,
    ClientBookName,
    ClientBookPhone,
    // settings flows
    SettingsMenu,
    SettingsName,
    SettingsCurrency,
    SettingsVat,
    SettingsLogo,
    // team & branches
    TeamMenu,
    InvitePhone,
    InviteRole,
    InviteBranch,
    BranchName,
    // onboarding (signup sessions, no tenant yet)
    OnboardWelcome,
    OnboardName,
    OnboardCurrency,
}

/// Which flow family a state (or session payload) belongs to. The state and
/// the payload variant must always agree; `DialogSession::is_consistent`
/// enforces it on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowFamily {
    Ready,
    Document,
    Payment,
    Expense,
    Report,
    ClientBook,
    Settings,
    Team,
    Onboarding,
}

impl DialogState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::ClientChoice => "client_choice",
            Self::ClientPick => "client_pick",
            Self::ClientName => "client_name",
            Self::ClientPhone => "client_phone",
            Self::ItemSource => "item_source",
            Self::ItemPick => "item_pick",
            Self::ItemDescription => "item_description",
            Self::ItemQuantity => "item_quantity",
            Self::ItemPrice => "item_price",
            Self::ItemMore => "item_more",
            Self::DocumentDiscount => "document_discount",
            Self::DocumentConfirm => "document_confirm",
            Self::PaymentInvoice => "payment_invoice",
            Self::PaymentAmount => "payment_amount",
            Self::PaymentMethodPick => "payment_method",
            Self::ExpenseCategoryPick => "expense_category",
            Self::ExpenseDescription => "expense_description",
            Self::ExpenseAmount => "expense_amount",
            Self::ExpenseMethodPick => "expense_method",
            Self::ReportType => "report_type",
            Self::ReportPeriodPick => "report_period",
            Self::ReportBranchPick => "report_branch",
            Self::ClientBookMenu => "client_book_menu",
            Self::ClientBookName => "client_book_name",
            Self::ClientBookPhone => "client_book_phone",
            Self::SettingsMenu => "settings_menu",
            Self::SettingsName => "settings_name",
            Self::SettingsCurrency => "settings_currency",
            Self::SettingsVat => "settings_vat",
            Self::SettingsLogo => "settings_logo",
            Self::TeamMenu => "team_menu",
            Self::InvitePhone => "invite_phone",
            Self::InviteRole => "invite_role",
            Self::InviteBranch => "invite_branch",
            Self::BranchName => "branch_name",
            Self::OnboardWelcome => "onboard_welcome",
            Self::OnboardName => "onboard_name",
            Self::OnboardCurrency => "onboard_currency",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == raw)
    }

    pub const ALL: [Self; 39] = [
        Self::Ready,
        Self::ClientChoice,
        Self::ClientPick,
        Self::ClientName,
        Self::ClientPhone,
        Self::ItemSource,
        Self::ItemPick,
        Self::ItemDescription,
        Self::ItemQuantity,
        Self::ItemPrice,
        Self::ItemMore,
        Self::DocumentDiscount,
        Self::DocumentConfirm,
        Self::PaymentInvoice,
        Self::PaymentAmount,
        Self::PaymentMethodPick,
        Self::ExpenseCategoryPick,
        Self::ExpenseDescription,
        Self::ExpenseAmount,
        Self::ExpenseMethodPick,
        Self::ReportType,
        Self::ReportPeriodPick,
        Self::ReportBranchPick,
        Self::ClientBookMenu,
        Self::ClientBookName,
        Self::ClientBookPhone,
        Self::SettingsMenu,
        Self::SettingsName,
        Self::SettingsCurrency,
        Self::SettingsVat,
        Self::SettingsLogo,
        Self::TeamMenu,
        Self::InvitePhone,
        Self::InviteRole,
        Self::InviteBranch,
        Self::BranchName,
        Self::OnboardWelcome,
        Self::OnboardName,
        Self::OnboardCurrency,
    ];

    pub fn family(self) -> FlowFamily {
        match self {
            Self::Ready => FlowFamily::Ready,
            Self::ClientChoice
            | Self::ClientPick
            | Self::ClientName
            | Self::ClientPhone
            | Self::ItemSource
            | Self::ItemPick
            | Self::ItemDescription
            | Self::ItemQuantity
            | Self::ItemPrice
            | Self::ItemMore
            | Self::DocumentDiscount
            | Self::DocumentConfirm => FlowFamily::Document,
            Self::PaymentInvoice | Self::PaymentAmount | Self::PaymentMethodPick => {
                FlowFamily::Payment
            }
            Self::ExpenseCategoryPick
            | Self::ExpenseDescription
            | Self::ExpenseAmount
            | Self::ExpenseMethodPick => FlowFamily::Expense,
            Self::ReportType | Self::ReportPeriodPick | Self::ReportBranchPick => {
                FlowFamily::Report
            }
            Self::ClientBookMenu | Self::ClientBookName | Self::ClientBookPhone => {
                FlowFamily::ClientBook
            }
            Self::SettingsMenu
            | Self::SettingsName
            | Self::SettingsCurrency
            | Self::SettingsVat
            | Self::SettingsLogo => FlowFamily::Settings,
            Self::TeamMenu
            | Self::InvitePhone
            | Self::InviteRole
            | Self::InviteBranch
            | Self::BranchName => FlowFamily::Team,
            Self::OnboardWelcome | Self::OnboardName | Self::OnboardCurrency => {
                FlowFamily::Onboarding
            }
        }
    }

    /// The gated section this state belongs to. `Ready` and onboarding are
    /// ungated.
    pub fn section(self) -> Option<Section> {
        match self.family() {
            FlowFamily::Ready | FlowFamily::Onboarding => None,
            FlowFamily::Document => Some(Section::Documents),
            FlowFamily::Payment => Some(Section::Payments),
            FlowFamily::Expense => Some(Section::Expenses),
            FlowFamily::Report => Some(Section::Reports),
            FlowFamily::ClientBook => Some(Section::Clients),
            FlowFamily::Settings => Some(Section::Settings),
            FlowFamily::Team => Some(Section::Team),
        }
    }
}

/// Working memory for an in-flight document draft. `generation` is minted
/// when the flow starts and keys the idempotent commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentFlow {
    pub kind: DocumentKind,
    pub generation: Uuid,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub new_client_phone: Option<String>,
    pub pending_description: Option<String>,
    pub pending_quantity: Option<Decimal>,
    pub pending_unit_price: Option<Decimal>,
    pub pending_line_discount: Option<Decimal>,
    pub items: Vec<DraftItem>,
    pub discount_pct: Decimal,
}

impl DocumentFlow {
    pub fn start(kind: DocumentKind) -> Self {
        Self {
            kind,
            generation: Uuid::new_v4(),
            client_id: None,
            client_name: None,
            new_client_phone: None,
            pending_description: None,
            pending_quantity: None,
            pending_unit_price: None,
            pending_line_discount: None,
            items: Vec::new(),
            discount_pct: Decimal::ZERO,
        }
    }

    pub fn clear_pending_item(&mut self) {
        self.pending_description = None;
        self.pending_quantity = None;
        self.pending_unit_price = None;
        self.pending_line_discount = None;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentFlow {
    pub generation: Uuid,
    pub document_id: Option<DocumentId>,
    pub invoice_number: Option<String>,
    pub outstanding: Option<Decimal>,
    pub amount: Option<Decimal>,
}

impl PaymentFlow {
    pub fn start() -> Self {
        Self {
            generation: Uuid::new_v4(),
            document_id: None,
            invoice_number: None,
            outstanding: None,
            amount: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseFlow {
    pub generation: Uuid,
    pub category: Option<ExpenseCategory>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
}

impl ExpenseFlow {
    pub fn start() -> Self {
        Self { generation: Uuid::new_v4(), category: None, description: None, amount: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Sales,
    Expenses,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFlow {
    pub kind: Option<ReportKind>,
    pub period: Option<ReportPeriod>,
    pub branch_id: Option<BranchId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientBookFlow {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamFlow {
    pub invite_phone: Option<String>,
    pub invite_role: Option<Role>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardingFlow {
    pub business_name: Option<String>,
}

/// Session payload: a tagged union per flow family, so a handler can only
/// read the fields valid for its own states and nothing left over from an
/// earlier, unrelated flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowData {
    Ready,
    Document(DocumentFlow),
    Payment(PaymentFlow),
    Expense(ExpenseFlow),
    Report(ReportFlow),
    ClientBook(ClientBookFlow),
    Settings,
    Team(TeamFlow),
    Onboarding(OnboardingFlow),
}

impl FlowData {
    pub fn family(&self) -> FlowFamily {
        match self {
            Self::Ready => FlowFamily::Ready,
            Self::Document(_) => FlowFamily::Document,
            Self::Payment(_) => FlowFamily::Payment,
            Self::Expense(_) => FlowFamily::Expense,
            Self::Report(_) => FlowFamily::Report,
            Self::ClientBook(_) => FlowFamily::ClientBook,
            Self::Settings => FlowFamily::Settings,
            Self::Team(_) => FlowFamily::Team,
            Self::Onboarding(_) => FlowFamily::Onboarding,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionDecodeError {
    #[error("unknown dialog state `{0}`")]
    UnknownState(String),
    #[error("session payload does not parse: {0}")]
    Payload(String),
    #[error("state `{state}` does not match session payload family")]
    Mismatch { state: &'static str },
}

/// The durable dialog position of one tenant (or one signing-up phone):
/// state id, flow payload, and the ids of the options last presented as a
/// menu so a plain numeric reply can be resolved by position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogSession {
    pub state: DialogState,
    pub data: FlowData,
    #[serde(default)]
    pub presented: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct SessionBody {
    data: FlowData,
    #[serde(default)]
    presented: Vec<String>,
}

impl DialogSession {
    pub fn ready() -> Self {
        Self { state: DialogState::Ready, data: FlowData::Ready, presented: Vec::new() }
    }

    pub fn new(state: DialogState, data: FlowData) -> Self {
        Self { state, data, presented: Vec::new() }
    }

    pub fn is_ready(&self) -> bool {
        self.state == DialogState::Ready
    }

    pub fn is_consistent(&self) -> bool {
        self.state.family() == self.data.family()
    }

    /// Serialize for the `dialog_state` / `session_json` columns.
    pub fn encode(&self) -> Result<(String, String), serde_json::Error> {
        let body = SessionBody { data: self.data.clone(), presented: self.presented.clone() };
        Ok((self.state.as_str().to_owned(), serde_json::to_string(&body)?))
    }

    pub fn decode(state: &str, json: &str) -> Result<Self, SessionDecodeError> {
        let state = DialogState::parse(state)
            .ok_or_else(|| SessionDecodeError::UnknownState(state.to_owned()))?;
        let body: SessionBody = serde_json::from_str(json)
            .map_err(|error| SessionDecodeError::Payload(error.to_string()))?;
        let session = Self { state, data: body.data, presented: body.presented };
        if !session.is_consistent() {
            return Err(SessionDecodeError::Mismatch { state: state.as_str() });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::document::{DocumentKind, DraftItem};

    use super::{DialogSession, DialogState, DocumentFlow, FlowData, SessionDecodeError};

    #[test]
    fn state_ids_round_trip_for_every_state() {
        for state in DialogState::ALL {
            assert_eq!(DialogState::parse(state.as_str()), Some(state), "{state:?}");
        }
        assert_eq!(DialogState::parse("quantum"), None);
    }

    #[test]
    fn every_gated_state_names_a_section() {
        for state in DialogState::ALL {
            let ungated = matches!(
                state,
                DialogState::Ready
                    | DialogState::OnboardWelcome
                    | DialogState::OnboardName
                    | DialogState::OnboardCurrency
            );
            assert_eq!(state.section().is_none(), ungated, "{state:?}");
        }
    }

    #[test]
    fn session_survives_encode_decode() {
        let mut flow = DocumentFlow::start(DocumentKind::Invoice);
        flow.items.push(DraftItem {
            description: "Website design".to_owned(),
            quantity: Decimal::from(2),
            unit_price: Decimal::from(1500),
            discount_pct: None,
        });
        let mut session = DialogSession::new(DialogState::ItemMore, FlowData::Document(flow));
        session.presented = vec!["add_item".to_owned(), "confirm".to_owned()];

        let (state, json) = session.encode().expect("encode");
        let decoded = DialogSession::decode(&state, &json).expect("decode");
        assert_eq!(decoded, session);
    }

    #[test]
    fn decode_rejects_state_payload_mismatch() {
        let session = DialogSession::new(DialogState::PaymentAmount, FlowData::Ready);
        let (state, json) = session.encode().expect("encode");
        assert!(matches!(
            DialogSession::decode(&state, &json),
            Err(SessionDecodeError::Mismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_unknown_state() {
        assert!(matches!(
            DialogSession::decode("hibernating", r#"{"data":{"flow":"ready"}}"#),
            Err(SessionDecodeError::UnknownState(_))
        ));
    }

    #[test]
    fn ready_session_is_empty_and_consistent() {
        let session = DialogSession::ready();
        assert!(session.is_ready());
        assert!(session.is_consistent());
        assert!(session.presented.is_empty());
    }
}
