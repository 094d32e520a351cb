//! Extraction of finished fusion archives onto disk.

pub mod extractor;

pub use crate::blocking::Cancellation;
pub use extractor::{ArchiveExtractor, DirectoryExtractor, EXTRACTION_RECORD, ExtractionRecord};
