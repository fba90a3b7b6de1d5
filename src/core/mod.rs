pub mod document;
pub mod error;

pub use document::{ImageSource, PageLayout, PdfDocument, Rect, Xref};
pub use error::{ExtractError, PixmapError};
