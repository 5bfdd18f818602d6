use crate::domain::principal::{Role, Section};
use crate::domain::tenant::{Feature, Package};

/// Role-based access to a section. Owner passes everywhere; every other
/// role only where its allow-list says so. Consulted on every turn of every
/// flow, not just at entry, because a principal can be demoted
/// mid-conversation.
pub fn section_allowed(role: Role, section: Section) -> bool {
    match role {
        Role::Owner => true,
        Role::Manager => matches!(
            section,
            Section::Documents
                | Section::Payments
                | Section::Expenses
                | Section::Clients
                | Section::Reports
        ),
        Role::Clerk => {
            matches!(section, Section::Documents | Section::Payments | Section::Clients)
        }
    }
}

/// Package-based access to a feature. Callers pass the tenant's *effective*
/// package so an open trial window counts.
pub fn feature_allowed(package: Package, feature: Feature) -> bool {
    package >= feature.minimum_package()
}
