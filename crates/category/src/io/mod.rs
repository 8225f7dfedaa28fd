//! Reading and writing category files and dumps.

pub mod dump;
pub mod format;
pub mod load;
pub mod save;

pub use dump::{write_dump, DumpReader, DumpRecord};
pub use format::{read_header, write_header, DUMP_MARKER, MAGIC};
pub use load::{resolve_category_path, CategoryLoader, LoadOptions, CATEGORY_PATH_ENV};
pub use save::CategorySaver;
