//! Govern Policy: governance levels, thresholds, and the gate
//!
//! # Architecture
//!
//! ```text
//! Verdict → Veto? → Mandatory approval? → Confidence ≥ threshold? → Disposition
//!                                                 ↑
//!                                      decay(issued_at → now)
//! ```
//!
//! # Example
//!
//! ```
//! use govern_core::{Disposition, GovernanceLevel, RunMode, Verdict, VerdictOrigin};
//! use govern_policy::{GovernanceGate, GovernancePolicy, LevelPolicy};
//!
//! let policy = GovernancePolicy::standard()
//!     .with_level(GovernanceLevel::Low, LevelPolicy::threshold(0.9));
//! let gate = GovernanceGate::new(policy);
//!
//! let verdict = Verdict::new(
//!     "run-1",
//!     Disposition::Approved,
//!     0.92,
//!     GovernanceLevel::Low,
//!     VerdictOrigin::LocalFallback,
//!     "executor self-report",
//! );
//!
//! let decision = gate.decide(&verdict, RunMode::Validated).unwrap();
//! assert_eq!(decision.disposition, Disposition::Approved);
//!
//! // DRY_RUN never auto-approves
//! let decision = gate.decide(&verdict, RunMode::DryRun).unwrap();
//! assert_eq!(decision.disposition, Disposition::Review);
//! ```

pub mod decay;
pub mod gate;
pub mod policy;

pub use decay::{decayed_confidence, effective_confidence};
pub use gate::{evaluate, GateDecision, GateRule, GovernanceGate};
pub use policy::{DecayPolicy, GovernancePolicy, LevelPolicy, PolicyError};
