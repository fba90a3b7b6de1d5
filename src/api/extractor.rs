//! PDF 图片提取器

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;

use crate::core::document::PdfDocument;
use crate::core::error::ExtractError;
use crate::page_extractor::{DocumentExtractor, ExtractionConfig, ExtractionReport, PageProgress};

/// 提取统计（累计，跨多次调用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub documents: u64,
    pub pages_scanned: u64,
    pub images_extracted: u64,
    pub images_skipped: u64,
}

/// PDF 图片提取器 - 阅读顺序 + 尺寸过滤 + PNG 编码
///
/// ```no_run
/// use pdf_image_lib::api::ImageExtractor;
/// use pdf_image_lib::page_extractor::ExtractionConfig;
///
/// let extractor = ImageExtractor::create(ExtractionConfig::default())?;
/// let report = extractor.extract_file("directory.pdf")?;
/// println!("{} images", report.images.len());
/// # Ok::<(), pdf_image_lib::core::ExtractError>(())
/// ```
pub struct ImageExtractor {
    extractor: DocumentExtractor,
    stats: Arc<Mutex<ExtractionStats>>,
}

impl ImageExtractor {
    /// 创建提取器（配置越界时报错）
    pub fn create(config: ExtractionConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        info!(
            "🖼️ ImageExtractor: created (min {}x{}, row tolerance {})",
            config.min_width, config.min_height, config.row_tolerance
        );
        Ok(Self {
            extractor: DocumentExtractor::with_config(config),
            stats: Arc::new(Mutex::new(ExtractionStats::default())),
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        self.extractor.config()
    }

    /// 从内存中的 PDF 提取
    pub fn extract_bytes(&self, pdf: &[u8]) -> Result<ExtractionReport, ExtractError> {
        self.extract_bytes_with_progress(pdf, &mut |_| {})
    }

    pub fn extract_bytes_with_progress(
        &self,
        pdf: &[u8],
        on_progress: &mut dyn FnMut(&PageProgress),
    ) -> Result<ExtractionReport, ExtractError> {
        let document = PdfDocument::open_bytes(pdf)?.with_alpha(self.config().include_alpha);
        self.run(&document, on_progress)
    }

    /// 从文件提取
    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> Result<ExtractionReport, ExtractError> {
        self.extract_file_with_progress(path, &mut |_| {})
    }

    pub fn extract_file_with_progress<P: AsRef<Path>>(
        &self,
        path: P,
        on_progress: &mut dyn FnMut(&PageProgress),
    ) -> Result<ExtractionReport, ExtractError> {
        let document = PdfDocument::open(path)?.with_alpha(self.config().include_alpha);
        self.run(&document, on_progress)
    }

    fn run(
        &self,
        document: &PdfDocument,
        on_progress: &mut dyn FnMut(&PageProgress),
    ) -> Result<ExtractionReport, ExtractError> {
        let report = self.extractor.extract_with_progress(document, on_progress)?;

        if let Ok(mut stats) = self.stats.lock() {
            stats.documents += 1;
            stats.pages_scanned += report.pages_scanned as u64;
            stats.images_extracted += report.images.len() as u64;
            stats.images_skipped += report.skipped_count() as u64;
        }

        Ok(report)
    }

    /// 获取提取统计
    pub fn stats(&self) -> ExtractionStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// 重置统计
    pub fn reset(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = ExtractionStats::default();
        }
    }
}

impl Drop for ImageExtractor {
    fn drop(&mut self) {
        info!("🗑️ ImageExtractor: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = ExtractionConfig {
            min_height: 600,
            ..Default::default()
        };
        assert!(matches!(
            ImageExtractor::create(config),
            Err(ExtractError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_garbage_input_leaves_stats_untouched() {
        let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
        assert!(extractor.extract_bytes(b"%PDF-nope").is_err());
        assert_eq!(extractor.stats(), ExtractionStats::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
        assert!(matches!(
            extractor.extract_file("/nonexistent/input.pdf"),
            Err(ExtractError::Io(_))
        ));
    }
}
