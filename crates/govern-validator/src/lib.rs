//! Govern Validator: the terminal judgment of a run
//!
//! ```text
//! RunContext → VerdictRequest → authority (bounded by timeout) → Verdict
//!                                   │ unreachable / timeout
//!                                   └→ LocalFallback → Verdict (LOCAL_FALLBACK)
//! ```
//!
//! A non-2xx answer from the authority is a REJECTED verdict, never a fallback.

pub mod authority;
pub mod fallback;
pub mod request;
pub mod validator;

pub use authority::{AuthorityError, RemoteAuthority, ValidationAuthority};
pub use fallback::LocalFallback;
pub use request::{StageSummary, VerdictRequest};
pub use validator::{Validator, DEFAULT_TIMEOUT_MS};
