pub mod api_keys;
pub mod audit_logs;
pub mod budgets;
pub mod end_users;
pub mod invitation_links;
pub mod organizations;
pub mod sessions;
pub mod teams;
pub mod usage_logs;
pub mod users;

pub use api_keys::Entity as ApiKeys;
pub use audit_logs::Entity as AuditLogs;
pub use budgets::Entity as Budgets;
pub use end_users::Entity as EndUsers;
pub use invitation_links::Entity as InvitationLinks;
pub use organizations::Entity as Organizations;
pub use sessions::Entity as Sessions;
pub use teams::Entity as Teams;
pub use usage_logs::Entity as UsageLogs;
pub use users::Entity as Users;
