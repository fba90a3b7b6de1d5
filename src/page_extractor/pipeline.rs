use log::{error, info, warn};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::core::document::ImageSource;
use crate::core::error::ExtractError;
use crate::page_extractor::filter::{ExtractedImage, ExtractionFilter, ImageAudit, PageOutput};
use crate::page_extractor::layout::{collect_image_refs, PlacementPolicy};
use crate::page_extractor::sequencer::ReadingOrderSequencer;

pub const MIN_DIMENSION_RANGE: (u32, u32) = (50, 500);
pub const ROW_TOLERANCE_RANGE: (f32, f32) = (0.0, 50.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub row_tolerance: f32,
    pub placement_policy: PlacementPolicy,
    pub include_alpha: bool,
    pub parallel: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 100,
            row_tolerance: 10.0,
            placement_policy: PlacementPolicy::FirstPlacement,
            include_alpha: false,
            parallel: false,
        }
    }
}

impl ExtractionConfig {
    /// Dense directory pages: small headshots, tight rows.
    pub fn for_small_portraits() -> Self {
        Self {
            min_width: 50,
            min_height: 50,
            row_tolerance: 5.0,
            ..Default::default()
        }
    }

    /// Catalog pages: only large photos, loosely aligned rows.
    pub fn for_large_photos() -> Self {
        Self {
            min_width: 300,
            min_height: 300,
            row_tolerance: 20.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        let (lo, hi) = MIN_DIMENSION_RANGE;
        for (name, value) in [("min_width", self.min_width), ("min_height", self.min_height)] {
            if !(lo..=hi).contains(&value) {
                return Err(ExtractError::InvalidConfig(format!(
                    "{} must be within {}..={}, got {}",
                    name, lo, hi, value
                )));
            }
        }
        let (lo, hi) = ROW_TOLERANCE_RANGE;
        if !(lo..=hi).contains(&self.row_tolerance) {
            return Err(ExtractError::InvalidConfig(format!(
                "row_tolerance must be within {}..={}, got {}",
                lo, hi, self.row_tolerance
            )));
        }
        Ok(())
    }
}

/// Emitted after each page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageProgress {
    pub pages_completed: usize,
    pub pages_total: usize,
    pub label: String,
}

/// Result of one page: collect → sequence → filter.
#[derive(Debug, Default)]
pub struct PageExtraction {
    /// 1-based.
    pub page_number: usize,
    pub images: Vec<ExtractedImage>,
    pub audits: Vec<ImageAudit>,
    /// Set when the page layout could not be read at all.
    pub layout_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Extracted(usize),
    /// Nothing passed the filter; lowering the thresholds is the usual fix.
    NoImagesFound,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub images: Vec<ExtractedImage>,
    pub audits: Vec<ImageAudit>,
    pub pages_scanned: usize,
    /// Pages whose layout could not be read (1-based).
    pub failed_pages: Vec<usize>,
}

impl ExtractionReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.images.is_empty() {
            RunOutcome::NoImagesFound
        } else {
            RunOutcome::Extracted(self.images.len())
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.audits.iter().filter(|a| !a.is_extracted()).count()
    }

    /// Ordered `(filename, png bytes)` pairs.
    pub fn into_files(self) -> Vec<(String, Vec<u8>)> {
        self.images
            .into_iter()
            .map(|img| (img.filename, img.bytes))
            .collect()
    }
}

pub struct DocumentExtractor {
    config: ExtractionConfig,
    sequencer: ReadingOrderSequencer,
    filter: ExtractionFilter,
    pool: Option<ThreadPool>,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    pub fn with_config(config: ExtractionConfig) -> Self {
        let pool = if config.parallel {
            let threads = num_cpus::get().min(4);
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("⚠️ thread pool unavailable, extracting sequentially: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            sequencer: ReadingOrderSequencer::new(config.row_tolerance),
            filter: ExtractionFilter::new(config.min_width, config.min_height),
            pool,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one page. `counter` counts images emitted before this page; the
    /// advanced counter comes back alongside the page result.
    pub fn process_page(
        &self,
        source: &dyn ImageSource,
        page_index: usize,
        counter: u32,
    ) -> (PageExtraction, u32) {
        let page_number = page_index + 1;

        let layout = match source.page_layout(page_index) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("⚠️ page {}: layout unreadable, skipping page: {}", page_number, e);
                return (
                    PageExtraction {
                        page_number,
                        layout_error: Some(e.to_string()),
                        ..Default::default()
                    },
                    counter,
                );
            }
        };

        let refs = collect_image_refs(&layout, self.config.placement_policy);
        let ordered = self.sequencer.sequence(refs);

        let (PageOutput { images, audits }, counter) = self.filter.extract_page(
            source,
            page_number,
            &ordered,
            counter,
            self.pool.as_ref(),
        );

        (
            PageExtraction {
                page_number,
                images,
                audits,
                layout_error: None,
            },
            counter,
        )
    }

    pub fn extract(&self, source: &dyn ImageSource) -> Result<ExtractionReport, ExtractError> {
        self.extract_with_progress(source, &mut |_| {})
    }

    /// Pages strictly in document order; `on_progress` fires after each one.
    pub fn extract_with_progress(
        &self,
        source: &dyn ImageSource,
        on_progress: &mut dyn FnMut(&PageProgress),
    ) -> Result<ExtractionReport, ExtractError> {
        let total = source.page_count();
        if total == 0 {
            error!("❌ document has no pages");
            return Err(ExtractError::NoPages);
        }

        let mut report = ExtractionReport::default();
        let mut counter = 0u32;

        for page_index in 0..total {
            let label = format!("Scanning Page {} of {}", page_index + 1, total);
            info!("📄 {}...", label);

            let (page, next) = self.process_page(source, page_index, counter);
            counter = next;

            if page.layout_error.is_some() {
                report.failed_pages.push(page.page_number);
            }
            report.images.extend(page.images);
            report.audits.extend(page.audits);
            report.pages_scanned += 1;

            on_progress(&PageProgress {
                pages_completed: page_index + 1,
                pages_total: total,
                label,
            });
        }

        match report.outcome() {
            RunOutcome::Extracted(n) => info!(
                "✅ Extracted {} images from {} pages ({} skipped)",
                n,
                total,
                report.skipped_count()
            ),
            RunOutcome::NoImagesFound => warn!(
                "⚠️ No images found in {} pages; consider lowering min width/height",
                total
            ),
        }

        Ok(report)
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
