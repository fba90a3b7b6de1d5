//! PDF 图片提取器 - 按阅读顺序导出页面中嵌入的图片
//!
//! 处理流程：
//! 1. 布局收集 - 每个图片取其在页面上的放置位置（左上角坐标）
//! 2. 阅读排序 - 先按行（y 容差分组），行内按 x 排序
//! 3. 提取过滤 - 解码、转 RGB、尺寸过滤、PNG 编码并按全局序号命名

pub mod filter;
pub mod layout;
pub mod pipeline;
pub mod sequencer;

pub use filter::{
    encode_png, image_filename, normalize_color, ExtractedImage, ExtractionFilter, ImageAudit,
    ImageStatus, PageOutput, SizeFilter, SkipReason,
};
pub use layout::{collect_image_refs, ImageRef, PlacementPolicy};
pub use pipeline::{
    DocumentExtractor, ExtractionConfig, ExtractionReport, PageExtraction, PageProgress, RunOutcome,
};
pub use sequencer::{ReadingOrderSequencer, Row};
