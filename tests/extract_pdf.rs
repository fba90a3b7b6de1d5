mod common;

use std::io::{Cursor, Read};

use common::{directory_pdf, draw, PdfBuilder};
use image::{DynamicImage, ImageFormat};
use pdf_image_lib::api::{zip_bytes, ImageExtractor};
use pdf_image_lib::core::{ExtractError, ImageSource, PdfDocument};
use pdf_image_lib::page_extractor::{
    DocumentExtractor, ExtractionConfig, ImageStatus, PlacementPolicy, RunOutcome, SkipReason,
};

fn decode_png(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory_with_format(bytes, ImageFormat::Png).unwrap()
}

fn names(report: &pdf_image_lib::page_extractor::ExtractionReport) -> Vec<&str> {
    report.images.iter().map(|i| i.filename.as_str()).collect()
}

#[test]
fn test_reading_order_across_pages() {
    pdf_image_lib::init_logging();
    let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
    let report = extractor.extract_bytes(&directory_pdf()).unwrap();

    assert_eq!(
        names(&report),
        vec![
            "img_001_page1.png",
            "img_002_page1.png",
            "img_003_page1.png",
            "img_004_page1.png",
            "img_005_page2.png",
            "img_006_page2.png",
        ]
    );

    // top row: green (x=50) then red (x=300); second row: blue then gray
    let first_pixels: Vec<[u8; 3]> = report.images[..4]
        .iter()
        .map(|i| decode_png(&i.bytes).to_rgb8().get_pixel(0, 0).0)
        .collect();
    assert_eq!(
        first_pixels,
        vec![[30, 200, 30], [200, 30, 30], [30, 30, 200], [77, 77, 77]]
    );

    assert_eq!(report.pages_scanned, 3);
    assert!(report.failed_pages.is_empty());
    assert_eq!(report.outcome(), RunOutcome::Extracted(6));
}

#[test]
fn test_logo_skipped_as_too_small() {
    let report = DocumentExtractor::new()
        .extract(&PdfDocument::open_bytes(&directory_pdf()).unwrap())
        .unwrap();

    let skipped: Vec<_> = report.audits.iter().filter(|a| !a.is_extracted()).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].page_number, 1);
    assert!(matches!(
        skipped[0].status,
        ImageStatus::Skipped(SkipReason::TooSmall {
            width: 40,
            height: 40
        })
    ));
}

#[test]
fn test_output_is_rgb_png_with_source_dimensions() {
    let report = DocumentExtractor::new()
        .extract(&PdfDocument::open_bytes(&directory_pdf()).unwrap())
        .unwrap();

    for image in &report.images {
        let decoded = decode_png(&image.bytes);
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)), "{}", image.filename);
        assert_eq!((decoded.width(), decoded.height()), (image.width, image.height));
    }

    // grayscale source converted, not resized
    let carol = &report.images[3];
    assert_eq!((carol.width, carol.height), (120, 160));
    // JPEG drawn through a form on page 2
    let erin = &report.images[5];
    assert_eq!((erin.width, erin.height), (160, 160));
}

#[test]
fn test_thresholds_are_inclusive() {
    let config = ExtractionConfig {
        min_width: 150,
        min_height: 150,
        ..Default::default()
    };
    let report = DocumentExtractor::with_config(config)
        .extract(&PdfDocument::open_bytes(&directory_pdf()).unwrap())
        .unwrap();

    // 150x150 photos and the 160x160 JPEG pass; 120x160 and 200x120 do not
    assert_eq!(
        names(&report),
        vec![
            "img_001_page1.png",
            "img_002_page1.png",
            "img_003_page2.png",
            "img_004_page2.png",
        ]
    );
}

#[test]
fn test_no_images_found() {
    let config = ExtractionConfig {
        min_width: 500,
        min_height: 500,
        ..Default::default()
    };
    let extractor = ImageExtractor::create(config).unwrap();
    let report = extractor.extract_bytes(&directory_pdf()).unwrap();

    assert_eq!(report.outcome(), RunOutcome::NoImagesFound);
    assert_eq!(extractor.stats().images_skipped, 7);
}

#[test]
fn test_row_tolerance_zero_splits_rows() {
    let config = ExtractionConfig {
        row_tolerance: 0.0,
        ..Default::default()
    };
    let report = DocumentExtractor::with_config(config)
        .extract(&PdfDocument::open_bytes(&directory_pdf()).unwrap())
        .unwrap();

    // red (y=100) now precedes green (y=104)
    let first = decode_png(&report.images[0].bytes).to_rgb8().get_pixel(0, 0).0;
    assert_eq!(first, [200, 30, 30]);
}

#[test]
fn test_repeated_placement_policy() {
    let mut pdf = PdfBuilder::new();
    let photo = pdf.rgb_image(120, 120, [9, 9, 9]);
    pdf.page(
        &[("P", photo)],
        &[
            draw("P", 300.0, 400.0, 100.0, 100.0),
            draw("P", 20.0, 20.0, 100.0, 100.0),
        ],
    );
    let bytes = pdf.build();

    let document = PdfDocument::open_bytes(&bytes).unwrap();
    let first = DocumentExtractor::new().extract(&document).unwrap();
    assert_eq!(first.images.len(), 1);
    assert_eq!((first.audits[0].x, first.audits[0].y), (300.0, 400.0));

    let each = DocumentExtractor::with_config(ExtractionConfig {
        placement_policy: PlacementPolicy::EachPlacement,
        ..Default::default()
    })
    .extract(&document)
    .unwrap();
    assert_eq!(each.images.len(), 2);
    assert_eq!((each.audits[0].x, each.audits[0].y), (20.0, 20.0));
}

#[test]
fn test_parallel_matches_sequential() {
    let bytes = directory_pdf();
    let sequential = ImageExtractor::create(ExtractionConfig::default())
        .unwrap()
        .extract_bytes(&bytes)
        .unwrap()
        .into_files();
    let parallel = ImageExtractor::create(ExtractionConfig {
        parallel: true,
        ..Default::default()
    })
    .unwrap()
    .extract_bytes(&bytes)
    .unwrap()
    .into_files();

    assert_eq!(sequential, parallel);
}

#[test]
fn test_progress_labels() {
    let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
    let mut labels = Vec::new();
    extractor
        .extract_bytes_with_progress(&directory_pdf(), &mut |p| labels.push(p.label.clone()))
        .unwrap();

    assert_eq!(
        labels,
        vec![
            "Scanning Page 1 of 3",
            "Scanning Page 2 of 3",
            "Scanning Page 3 of 3",
        ]
    );
}

#[test]
fn test_zip_archive_round_trip() {
    let report = ImageExtractor::create(ExtractionConfig::default())
        .unwrap()
        .extract_bytes(&directory_pdf())
        .unwrap();
    let archive_bytes = zip_bytes(&report.images).unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes)).unwrap();
    assert_eq!(archive.len(), report.images.len());
    for (index, image) in report.images.iter().enumerate() {
        let mut entry = archive.by_index(index).unwrap();
        assert_eq!(entry.name(), image.filename);
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, image.bytes);
    }
}

#[test]
fn test_extract_from_file_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("directory.pdf");
    std::fs::write(&path, directory_pdf()).unwrap();

    let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
    extractor.extract_file(&path).unwrap();
    extractor.extract_file(&path).unwrap();

    let stats = extractor.stats();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.pages_scanned, 6);
    assert_eq!(stats.images_extracted, 12);

    extractor.reset();
    assert_eq!(extractor.stats().documents, 0);
}

#[test]
fn test_page_layout_positions() {
    let document = PdfDocument::open_bytes(&directory_pdf()).unwrap();
    assert_eq!(document.page_count(), 3);

    let layout = document.page_layout(1).unwrap();
    assert_eq!(layout.images.len(), 2);
    // the form-drawn JPEG is registered after the page's own image
    let jpeg = layout.images[1];
    let rect = layout.image_rects(jpeg)[0];
    assert!((rect.x0 - 100.0).abs() < 1e-3);
    assert!((rect.y0 - 500.0).abs() < 1e-3);

    assert!(document.page_layout(2).unwrap().images.is_empty());
}

#[test]
fn test_invalid_pdf_is_error() {
    let extractor = ImageExtractor::create(ExtractionConfig::default()).unwrap();
    assert!(extractor.extract_bytes(b"this is not a pdf").is_err());
    assert!(matches!(
        PdfDocument::open_bytes(b"this is not a pdf"),
        Err(ExtractError::Pdf(_))
    ));
}
