pub mod config;
pub mod dialog;
pub mod domain;
pub mod errors;
pub mod gates;
pub mod msisdn;

pub use dialog::action::{Action, NormalizedInput, RawInput};
pub use dialog::outbound::{MenuOption, OutboundPlan};
pub use dialog::session::{DialogSession, DialogState, FlowData};
pub use domain::branch::{Branch, BranchId};
pub use domain::client::{Client, ClientId, Product, ProductId};
pub use domain::document::{
    Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus, DraftItem, Totals,
};
pub use domain::money::{Expense, ExpenseCategory, Payment, PaymentMethod, ReportPeriod};
pub use domain::principal::{Principal, Role, Section};
pub use domain::tenant::{Feature, Package, Tenant, TenantId};
pub use errors::{EdgeError, TurnError};
pub use msisdn::{Msisdn, MsisdnError};
