//! Auth session/context and the governance engine (spec.md §4.G, §4.H).

mod context;
mod engine;
mod idempotency;
mod ledger;
mod oidc;
mod rate_limit;
mod session;

pub use context::{ApiKeyContext, AuthContext, BudgetPrincipal};
pub use engine::{AccountInput, GovernanceEngine, RequestInput};
pub use idempotency::{IdempotencyError, IdempotencyStore, InMemoryIdempotencyStore, RedisIdempotencyStore};
pub use ledger::{BudgetLedger, LedgerError, NoopLedger, UsageLogEntry, UsageLogSink};
pub use oidc::{IdTokenClaims, OidcError, PkceState, authorize_url, check_state, verify_id_token};
pub use rate_limit::{DistributedRateLimiter, FailPolicy, LocalRateLimiter, RateLimitError, RateLimiterBackend};
pub use session::{SessionClaims, SessionCodec, SessionError};
