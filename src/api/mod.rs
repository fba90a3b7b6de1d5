pub mod archive;
pub mod extractor;

pub use archive::{write_dir, write_zip, zip_bytes, DEFAULT_ARCHIVE_NAME};
pub use extractor::{ExtractionStats, ImageExtractor};
