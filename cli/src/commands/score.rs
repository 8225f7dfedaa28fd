//! Score command implementation.

use super::{category_status, for_each_input};
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use dbacl_category::{
    CategoryModel, CategoryScore, CharParser, Classifier, LoadOptions, ModelOptions,
    ScorerConfig, ShannonCorrection,
};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shannon {
    Stirling,
    Exact,
}

impl From<Shannon> for ShannonCorrection {
    fn from(s: Shannon) -> Self {
        match s {
            Shannon::Stirling => ShannonCorrection::Stirling,
            Shannon::Exact => ShannonCorrection::Exact,
        }
    }
}

fn parse_char_parser(name: &str) -> std::result::Result<CharParser, String> {
    CharParser::from_name(name).ok_or_else(|| {
        format!("unknown character class '{}' (char, alpha, alnum, graph, cef, adp, cef2)", name)
    })
}

/// Score command arguments.
#[derive(Parser)]
pub struct ScoreCommand {
    /// Category to score against; repeat for several. Bare names are
    /// looked up in $DBACL_PATH
    #[arg(short, long = "category", required = true)]
    pub categories: Vec<String>,

    /// Print the `# scores` line consumed by `dbacl bayesol`
    #[arg(short = 'n', long)]
    pub scores: bool,

    /// Print every category's statistics
    #[arg(short, long)]
    pub all: bool,

    /// Score each input file as a separate document
    #[arg(long)]
    pub per_file: bool,

    /// Memory-map category files instead of reading them
    #[arg(long)]
    pub mmap: bool,

    /// Character class of the standard tokenizer
    #[arg(short = 'L', long, value_parser = parse_char_parser)]
    pub char_parser: Option<CharParser>,

    /// Keep upper case letters
    #[arg(long)]
    pub case_sensitive: bool,

    /// Unicode word splitting and lower casing
    #[arg(long)]
    pub i18n: bool,

    /// Track the empirical entropy of each document
    #[arg(long)]
    pub entropy: bool,

    /// Shannon correction of repeated tokens
    #[arg(long, value_enum, default_value = "stirling")]
    pub shannon: Shannon,

    /// Input files (stdin if none)
    pub files: Vec<std::path::PathBuf>,
}

pub fn run(cmd: ScoreCommand, json: bool) -> Result<u8> {
    let options = ModelOptions {
        case_sensitive: cmd.case_sensitive,
        i18n: cmd.i18n,
        calc_entropy: cmd.entropy,
        ..ModelOptions::new()
    };
    let config = ScorerConfig {
        shannon: cmd.shannon.into(),
        ..ScorerConfig::default()
    };
    let load = if cmd.mmap {
        LoadOptions::mapped()
    } else {
        LoadOptions::owned()
    };

    let mut classifier = Classifier::new(options, cmd.char_parser.unwrap_or_default(), config)?;
    for name in &cmd.categories {
        let model = CategoryModel::open(name, load)?;
        debug!(category = name, features = model.header().unique_token_count, "loaded");
        classifier.add_category(model)?;
    }

    let mut status = 0;
    if cmd.per_file {
        for_each_input(&cmd.files, |name, reader| {
            classifier.reset();
            classifier.feed_reader(reader)?;
            status = report(&classifier, &cmd, json, Some(name))?;
            Ok(())
        })?;
    } else {
        for_each_input(&cmd.files, |_, reader| Ok(classifier.feed_reader(reader)?))?;
        status = report(&classifier, &cmd, json, None)?;
    }
    Ok(status)
}

fn report(classifier: &Classifier, cmd: &ScoreCommand, json: bool, input: Option<&str>) -> Result<u8> {
    let results = classifier.results();
    let best = classifier.scorer().best();
    if results.is_empty() {
        bail!("no categories to score against");
    }

    if json {
        let value = json!({
            "input": input,
            "best": classifier.best(),
            "entropy": classifier.scorer().empirical_entropy(),
            "categories": results,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if cmd.scores {
        println!("{}", classifier.scores_line());
    } else if cmd.all {
        if let Some(input) = input {
            println!("{}", input);
        }
        for score in &results {
            print_score(score);
        }
        if let Some(h) = classifier.scorer().empirical_entropy() {
            println!("empirical entropy {:.4}", h);
        }
    } else {
        match (input, classifier.best()) {
            (Some(input), Some(best)) => println!("{} {}", input, best),
            (None, Some(best)) => println!("{}", best),
            _ => {}
        }
    }
    Ok(category_status(best))
}

fn print_score(s: &CategoryScore) {
    let lowest = s
        .derived
        .lowest
        .map_or_else(|| "-".to_string(), |p| format!("{:.3}", p));
    println!(
        "{} {:.2} * {:.1} var {:.4} tokens {} missing {} poisson {:.2} confidence {:.1}% lowest {}",
        s.name,
        s.cross_entropy,
        s.complexity,
        s.variance,
        s.tokens,
        s.missing,
        s.derived.poisson,
        s.derived.confidence,
        lowest
    );
}
