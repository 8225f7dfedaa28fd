//! dbacl-bayesol - Bayes risk decisions over category scores
//!
//! A risk specification names the categories, their prior weights and a
//! loss for every (truth, decision) pair. Loss vectors may depend on the
//! document itself: each one carries a regex, and `$k` in its entries is
//! replaced by the numeric value of the k-th submatch on the first line it
//! matches. Scores arrive as `# scores` lines produced by the scorer.
//!
//! # Example
//!
//! ```rust
//! use dbacl_bayesol::{RiskSolver, RiskSpec};
//!
//! let mut spec = RiskSpec::parse(r#"
//!     categories { spam, notspam }
//!     prior { 1, 1 }
//!     loss_matrix {
//!     "" spam    [ 0, 1 ]
//!     "" notspam [ 1, 0 ]
//!     }
//! "#)?;
//! spec.observe_line("# scores spam 7.52 * 20 notspam 6.01 * 20")?;
//!
//! let solver = RiskSolver::new(spec.loss_matrix()?);
//! let decision = solver.decide().expect("two categories");
//! assert_eq!(spec.name(decision.best), Some("notspam"));
//! # Ok::<(), dbacl_core::DbaclError>(())
//! ```

pub use dbacl_core::{DbaclError, Result};

pub mod parser;
pub use parser::{parse_risk_spec, Expr, LossLine, RawRiskSpec, MAX_SUBMATCH};

pub mod spec;
pub use spec::{LossMatrix, LossRule, Observed, RiskSpec, MEANINGLESS_THRESHOLD, SCORES_MAGIC};

pub mod solver;
pub use solver::{log_sum_exp, Decision, RiskSolver};
