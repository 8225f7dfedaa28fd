//! Dump command implementation.

use super::for_each_input;
use anyhow::{bail, Result};
use clap::Parser;
use dbacl_category::{
    write_dump, CategoryModel, Classifier, LoadOptions, ModelOptions, ScorerConfig,
    TokenCollector,
};
use dbacl_core::TokenSource;
use std::collections::HashMap;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;

/// Dump command arguments.
#[derive(Parser)]
pub struct DumpCommand {
    /// Category whose weights are dumped
    #[arg(short, long = "category")]
    pub category: String,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Text whose unigram tokens are dumped (stdin if none)
    pub files: Vec<PathBuf>,
}

pub fn run(cmd: DumpCommand) -> Result<u8> {
    let model = CategoryModel::open(&cmd.category, LoadOptions::owned())?;
    if model.max_order() != 1 {
        bail!("only unigram categories can be dumped");
    }

    // tokenize exactly the way scoring would
    let mut classifier = Classifier::new(
        ModelOptions::new(),
        model.header().char_parser,
        ScorerConfig::default(),
    )?;
    let index = classifier.add_category(model)?;
    let mut tokenizer = classifier.tokenizer().clone();
    let Some(model) = classifier.scorer().model(index) else {
        bail!("category {} went missing", cmd.category);
    };

    let mut collector = TokenCollector::default();
    for_each_input(&cmd.files, |_, reader| {
        for line in reader.lines() {
            tokenizer.tokenize_line(&line?, &mut collector);
        }
        Ok(())
    })?;

    let mut counts: HashMap<Vec<u8>, u64> = HashMap::new();
    let mut order = Vec::new();
    for (token, tt, source) in collector.tokens {
        if tt.order != 1 || source != TokenSource::Standard {
            continue;
        }
        let count = counts.entry(token.clone()).or_insert(0);
        if *count == 0 {
            order.push(token);
        }
        *count += 1;
    }

    let records = model.dump_records(order.iter().map(|t| (t.as_slice(), counts[t])));
    match &cmd.output {
        Some(path) => {
            let mut out = BufWriter::new(std::fs::File::create(path)?);
            write_dump(&mut out, model.header(), &records)?;
            out.flush()?;
        }
        None => {
            let mut out = BufWriter::new(io::stdout().lock());
            write_dump(&mut out, model.header(), &records)?;
            out.flush()?;
        }
    }
    Ok(0)
}
