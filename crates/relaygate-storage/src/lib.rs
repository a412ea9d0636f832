//! Durable persistence contract for the gateway's identity and accounting
//! state (spec.md "Management surface"): `APIKey`, `Team`, `User`,
//! `Organization`, `EndUser`, `UsageLog`, `AuditLog`, `Budget`, `Session`,
//! `InvitationLink`, all behind a single [`Store`] interface. The CRUD
//! surface the admin UI would need on top of this (`/key/*`, `/team/*`,
//! `/user/*`, `/organization/*`, `/spend/*`, `/control/*`, `/audit/*`,
//! `/invitation/*`) is out of scope.

pub mod db;
pub mod entities;
pub mod seaorm;
pub mod store;

pub use seaorm::SeaOrmStore;
pub use store::{AuditLogWrite, Store, StorageError, StorageResult, UsageLogWrite};
