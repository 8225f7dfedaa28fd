//! Hypex command implementation.

use anyhow::Result;
use clap::Parser;
use dbacl_hypex::{nats_to_bits, CategoryPair, Side, SweepConfig, DEFAULT_BETA_STEP};
use serde_json::json;
use std::path::PathBuf;

/// Hypex command arguments.
#[derive(Parser)]
pub struct HypexCommand {
    /// Dump of the first category (`dbacl dump`)
    pub dump0: PathBuf,

    /// Dump of the second category
    pub dump1: PathBuf,

    /// Increment of beta during the sweep, strictly between 0 and 1
    #[arg(short, long, default_value_t = DEFAULT_BETA_STEP)]
    pub step: f64,
}

pub fn run(cmd: HypexCommand, json: bool) -> Result<u8> {
    let pair = CategoryPair::from_files(&cmd.dump0, &cmd.dump1)?;
    let edges = pair.edge_divergences()?;
    let sweep = pair.chernoff_sweep(SweepConfig::new(cmd.step))?;

    if json {
        let value = json!({
            "tokens": pair.len(),
            "mismatched": pair.side(Side::P1).map_or(0, |s| s.mismatched),
            "edges": edges,
            "sweep": sweep,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    println!(
        "# D(P0|P1) = {:.6}\tD(P1|P0) = {:.6}",
        nats_to_bits(edges.d01),
        nats_to_bits(edges.d10)
    );
    println!("# beta | logZ_beta | Psi_beta | D(Q_beta|P_0) | D(Q_beta|P_1) | t");
    for p in &sweep.points {
        println!(
            "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            p.beta,
            nats_to_bits(p.log_z_beta),
            nats_to_bits(p.psi_beta),
            nats_to_bits(p.divergence[0]),
            nats_to_bits(p.divergence[1]),
            nats_to_bits(p.threshold())
        );
    }
    println!(
        "# chernoff_rate {:.6} chernoff_beta {:.6}",
        nats_to_bits(sweep.chernoff_rate),
        sweep.chernoff_beta
    );
    Ok(0)
}
