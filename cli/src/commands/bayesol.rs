//! Bayesol command implementation.

use super::{category_status, for_each_input};
use anyhow::{Context, Result};
use clap::Parser;
use dbacl_bayesol::{RiskSolver, RiskSpec};
use serde_json::json;
use std::io::BufRead;
use std::path::PathBuf;

/// Bayesol command arguments.
#[derive(Parser)]
pub struct BayesolCommand {
    /// Risk specification file
    #[arg(short = 'c', long = "risk-spec")]
    pub risk_spec: PathBuf,

    /// Print the risk of deciding each category
    #[arg(short = 'n', long, conflicts_with = "rank")]
    pub scores: bool,

    /// Rank all categories from best to worst
    #[arg(short = 'N', long)]
    pub rank: bool,

    /// Input containing `# scores` lines and the document text (stdin if none)
    pub files: Vec<PathBuf>,
}

pub fn run(cmd: BayesolCommand, json: bool) -> Result<u8> {
    let mut spec = RiskSpec::from_file(&cmd.risk_spec)
        .with_context(|| format!("couldn't read risk specification {}", cmd.risk_spec.display()))?;

    for_each_input(&cmd.files, |_, reader| {
        for line in reader.lines() {
            spec.observe_line(&line?)?;
        }
        Ok(())
    })?;

    let solver = RiskSolver::new(spec.loss_matrix()?);
    let Some(decision) = solver.decide() else {
        return Ok(0);
    };
    let name = |i: usize| spec.name(i).unwrap_or("?");

    if json {
        let risks: serde_json::Map<String, serde_json::Value> = decision
            .risks
            .iter()
            .enumerate()
            .map(|(i, r)| (name(i).to_string(), json!(r)))
            .collect();
        let mut value = json!({ "best": name(decision.best), "risks": risks });
        if cmd.rank {
            value["ranking"] = solver
                .rank()
                .iter()
                .map(|d| json!({ "category": name(d.best), "score": d.best_term }))
                .collect();
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if cmd.rank {
        let ranked: Vec<String> = solver
            .rank()
            .iter()
            .map(|d| format!("{} {:10.2}", name(d.best), d.best_term))
            .collect();
        println!("{}", ranked.join(" "));
    } else if cmd.scores {
        let risks: Vec<String> = decision
            .risks
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{} {:10.2}", name(i), r))
            .collect();
        println!("{}", risks.join(" "));
    } else {
        println!("{}", name(decision.best));
    }

    Ok(category_status(Some(decision.best)))
}
