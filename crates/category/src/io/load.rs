//! Loading category files from disk.

use super::format::read_header;
use crate::model::{
    CategoryItem, CategoryModel, DigramMatrix, FeatureTable, MappedFeatures, ITEM_SIZE,
};
use dbacl_core::{DbaclError, Result, TokenHash};
use memmap2::Mmap;
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the default category directory.
pub const CATEGORY_PATH_ENV: &str = "DBACL_PATH";

/// How the feature table of a category is brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Map the record table read-only instead of copying it
    pub mmap: bool,
}

impl LoadOptions {
    pub fn owned() -> Self {
        Self { mmap: false }
    }

    pub fn mapped() -> Self {
        Self { mmap: true }
    }
}

/// Resolve a category name to a path.
///
/// Names that are neither absolute nor explicitly relative (`./`, `../`) are
/// looked up in the directory named by `DBACL_PATH`, when it is set.
pub fn resolve_category_path(name: &str, extension: Option<&str>) -> PathBuf {
    let dir = env::var_os(CATEGORY_PATH_ENV);
    resolve_in(dir.as_deref().map(Path::new), name, extension)
}

fn resolve_in(dir: Option<&Path>, name: &str, extension: Option<&str>) -> PathBuf {
    let file = format!("{}{}", name, extension.unwrap_or(""));
    match dir {
        Some(dir) if !name.starts_with('/') && !name.starts_with('.') => dir.join(file),
        _ => PathBuf::from(file),
    }
}

/// Read until `buf` is full or EOF; returns how many bytes were read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(DbaclError::io(path, e)),
        }
    }
    Ok(got)
}

/// Category loader.
pub struct CategoryLoader;

impl CategoryLoader {
    /// Load a category file.
    ///
    /// The model is only returned when every section parsed completely.
    pub fn load(path: &Path, options: LoadOptions) -> Result<CategoryModel> {
        let file = File::open(path).map_err(|e| DbaclError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let (header, header_len) = read_header(&mut reader)?;

        let mut raw = vec![0u8; DigramMatrix::LEN * 2];
        let got = fill(&mut reader, &mut raw, path)?;
        if got < raw.len() {
            return Err(DbaclError::Truncated {
                path: path.to_path_buf(),
                expected: header_len + raw.len(),
                got: header_len + got,
            });
        }
        let cells = raw
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let digrams = DigramMatrix::from_cells(cells);

        let capacity = header.capacity();
        let table_offset = header_len + DigramMatrix::LEN * 2;
        let expected = table_offset + capacity * ITEM_SIZE;

        let features = if options.mmap {
            drop(reader);
            Self::map_table(path, table_offset, capacity, expected)?
        } else {
            let mut raw = vec![0u8; capacity * ITEM_SIZE];
            let got = fill(&mut reader, &mut raw, path)?;
            if got < raw.len() {
                return Err(DbaclError::Truncated {
                    path: path.to_path_buf(),
                    expected,
                    got: table_offset + got,
                });
            }
            let slots = raw
                .chunks_exact(ITEM_SIZE)
                .map(|chunk| {
                    let mut bytes = [0u8; ITEM_SIZE];
                    bytes.copy_from_slice(chunk);
                    CategoryItem::from_bytes(&bytes)
                })
                .collect();
            FeatureTable::Owned(TokenHash::from_slots(slots)?)
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(
            category = %name,
            hash_bits = header.hash_bits,
            max_order = header.max_order,
            mapped = options.mmap,
            "loaded category"
        );

        Ok(CategoryModel::from_parts(
            &name,
            Some(path.to_path_buf()),
            header,
            digrams,
            Some(features),
        ))
    }

    fn map_table(path: &Path, offset: usize, capacity: usize, expected: usize) -> Result<FeatureTable> {
        let file = File::open(path).map_err(|e| DbaclError::io(path, e))?;
        // SAFETY: the map is read-only and category files are replaced by
        // rename on save, never rewritten in place.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| DbaclError::io(path, e))?;
        if map.len() < expected {
            return Err(DbaclError::Truncated {
                path: path.to_path_buf(),
                expected,
                got: map.len(),
            });
        }

        #[cfg(unix)]
        if let Err(e) = map.advise(memmap2::Advice::Random) {
            debug!(error = %e, "madvise failed");
        }

        Ok(FeatureTable::Mapped(MappedFeatures::new(map, offset, capacity)))
    }
}

impl CategoryModel {
    /// Load the category called `name`, honouring `DBACL_PATH`.
    pub fn open(name: &str, options: LoadOptions) -> Result<Self> {
        CategoryLoader::load(&resolve_category_path(name, None), options)
    }

    /// Drop the current tables and read the file again.
    pub fn reload(&mut self, options: LoadOptions) -> Result<()> {
        let path = self
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                DbaclError::InvalidConfig(format!("category {} has no file to reload", self.name()))
            })?;
        self.unload();
        *self = CategoryLoader::load(&path, options)?;
        Ok(())
    }
}
