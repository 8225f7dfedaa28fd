//! dbacl-hypex - Divergences and Chernoff information of two categories
//!
//! Two unigram category dumps are merged into one joint token table. From it
//! this crate computes the Kullback-Leibler divergences between the
//! categories and sweeps the tilted family between them to estimate the
//! Chernoff information, the best error exponent of a binary test.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbacl_hypex::{nats_to_bits, CategoryPair, SweepConfig};
//! use std::path::Path;
//!
//! let pair = CategoryPair::from_files(Path::new("spam.dump"), Path::new("ham.dump"))?;
//! let edges = pair.edge_divergences()?;
//! println!("D(P0|P1) = {:.4} bits", nats_to_bits(edges.d01));
//!
//! let sweep = pair.chernoff_sweep(SweepConfig::default())?;
//! println!("chernoff rate {:.4} at beta {:.2}", nats_to_bits(sweep.chernoff_rate), sweep.chernoff_beta);
//! # Ok::<(), dbacl_core::DbaclError>(())
//! ```

pub use dbacl_core::{DbaclError, Result};

pub mod pair;
pub use pair::{CategoryPair, PairItem, Side, SideInfo, REFERENCE_TOLERANCE};

pub mod divergence;
pub use divergence::{
    nats_to_bits, ChernoffSweep, EdgeDivergences, SweepConfig, TiltedPoint, DEFAULT_BETA_STEP,
    SAFETY_TOLERANCE,
};
