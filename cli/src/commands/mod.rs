//! CLI commands for dbacl.

pub mod bayesol;
pub mod dump;
pub mod hypex;
pub mod score;

pub use bayesol::BayesolCommand;
pub use dump::DumpCommand;
pub use hypex::HypexCommand;
pub use score::ScoreCommand;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Open every input file, or stdin when there are none or the name is `-`.
pub(crate) fn for_each_input(
    files: &[PathBuf],
    mut f: impl FnMut(&str, Box<dyn BufRead>) -> Result<()>,
) -> Result<()> {
    if files.is_empty() {
        return f("-", Box::new(io::stdin().lock()));
    }
    for path in files {
        if path == Path::new("-") {
            f("-", Box::new(io::stdin().lock()))?;
        } else {
            let file = File::open(path).with_context(|| format!("couldn't open {}", path.display()))?;
            f(&path.display().to_string(), Box::new(BufReader::new(file)))?;
        }
    }
    Ok(())
}

/// Exit status naming a category, 1-based like the classic tools.
pub(crate) fn category_status(index: Option<usize>) -> u8 {
    index.map_or(0, |i| u8::try_from(i + 1).unwrap_or(u8::MAX))
}
