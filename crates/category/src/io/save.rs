//! Saving category files.
//!
//! The file is written next to its destination and renamed into place, so a
//! crash or full disk never leaves a half-written category behind.

use super::format::write_header;
use crate::model::CategoryModel;
use dbacl_core::{DbaclError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp{}", name, std::process::id()))
}

/// Category saver.
pub struct CategorySaver<'a> {
    model: &'a CategoryModel,
}

impl<'a> CategorySaver<'a> {
    pub fn new(model: &'a CategoryModel) -> Self {
        Self { model }
    }

    /// Write the model to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let features = self.model.features().ok_or_else(|| {
            DbaclError::InvalidConfig(format!(
                "category {} has no feature table to save",
                self.model.name()
            ))
        })?;

        let header = self.model.header();
        if features.capacity() != header.capacity() {
            return Err(DbaclError::InvalidConfig(format!(
                "category {} declares 2^{} slots but holds {}",
                self.model.name(),
                header.hash_bits,
                features.capacity()
            )));
        }

        let tmp = temp_sibling(path);
        let result = self.write_to(&tmp, |out| {
            write_header(out, header)?;
            for cell in self.model.digrams().cells() {
                out.write_all(&cell.to_be_bytes())?;
            }
            for i in 0..features.capacity() {
                out.write_all(&features.slot(i).to_bytes())?;
            }
            Ok(())
        });

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DbaclError::io(path, e)
        })?;

        debug!(category = self.model.name(), path = %path.display(), "saved category");
        Ok(())
    }

    fn write_to<F>(&self, tmp: &Path, body: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        let file = File::create(tmp).map_err(|e| DbaclError::io(tmp, e))?;
        let mut out = BufWriter::new(file);
        body(&mut out).map_err(|e| DbaclError::io(tmp, e))?;
        let file = out
            .into_inner()
            .map_err(|e| DbaclError::io(tmp, e.into_error()))?;
        file.sync_all().map_err(|e| DbaclError::io(tmp, e))
    }
}

impl CategoryModel {
    /// Save to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        CategorySaver::new(self).save(path)
    }
}
