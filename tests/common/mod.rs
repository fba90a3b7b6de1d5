//! Synthetic PDFs for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// Where to draw a named XObject, in top-left page coordinates.
pub struct Draw {
    pub name: &'static str,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub fn draw(name: &'static str, x: f32, y: f32, width: f32, height: f32) -> Draw {
    Draw {
        name,
        x,
        y,
        width,
        height,
    }
}

/// Place a form with the identity matrix.
pub fn identity(name: &'static str) -> Draw {
    draw(name, 0.0, PAGE_HEIGHT - 1.0, 1.0, 1.0)
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

/// `q w 0 0 h x y cm /Name Do Q`, flipping y into PDF space.
fn draw_ops(draws: &[Draw]) -> Vec<Operation> {
    draws
        .iter()
        .flat_map(|d| {
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        real(d.width),
                        real(0.0),
                        real(0.0),
                        real(d.height),
                        real(d.x),
                        real(PAGE_HEIGHT - d.y - d.height),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(d.name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ]
        })
        .collect()
}

fn xobject_dict(xobjects: &[(&str, ObjectId)]) -> Dictionary {
    let mut dict = Dictionary::new();
    for (name, id) in xobjects {
        dict.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    dict
}

pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn image(&mut self, dict: Dictionary, data: Vec<u8>) -> ObjectId {
        self.doc.add_object(Stream::new(dict, data))
    }

    pub fn rgb_image(&mut self, width: u32, height: u32, color: [u8; 3]) -> ObjectId {
        let data = color.repeat((width * height) as usize);
        self.image(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            data,
        )
    }

    pub fn gray_image(&mut self, width: u32, height: u32, value: u8) -> ObjectId {
        self.image(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![value; (width * height) as usize],
        )
    }

    /// RGB samples, FlateDecode-compressed.
    pub fn flate_rgb_image(&mut self, width: u32, height: u32, color: [u8; 3]) -> ObjectId {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&color.repeat((width * height) as usize))
            .unwrap();
        let data = encoder.finish().unwrap();
        self.image(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            data,
        )
    }

    pub fn jpeg_image(&mut self, width: u32, height: u32) -> ObjectId {
        let pixels = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut jpeg = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(pixels)
            .write_to(&mut jpeg, ImageOutputFormat::Jpeg(90))
            .unwrap();
        self.image(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.into_inner(),
        )
    }

    /// Form XObject covering the whole page that draws `draws`.
    pub fn form(&mut self, xobjects: &[(&str, ObjectId)], draws: &[Draw]) -> ObjectId {
        let content = Content {
            operations: draw_ops(draws),
        };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![real(0.0), real(0.0), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
            "Resources" => dictionary! { "XObject" => xobject_dict(xobjects) },
        };
        self.doc
            .add_object(Stream::new(dict, content.encode().unwrap()))
    }

    /// Add a Letter page drawing `draws` with the given XObject resources.
    pub fn page(&mut self, xobjects: &[(&str, ObjectId)], draws: &[Draw]) -> &mut Self {
        let content = Content {
            operations: draw_ops(draws),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobject_dict(xobjects) },
        });
        self.kids.push(page_id.into());
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
                "MediaBox" => vec![real(0.0), real(0.0), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

/// Three pages:
/// 1. two rows of photos plus a small logo in the top corner
/// 2. a photo reused from page 1, and a JPEG drawn through a form
/// 3. blank
pub fn directory_pdf() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    let alice = pdf.rgb_image(150, 150, [200, 30, 30]);
    let bob = pdf.rgb_image(150, 150, [30, 200, 30]);
    let carol = pdf.gray_image(120, 160, 77);
    let dave = pdf.flate_rgb_image(200, 120, [30, 30, 200]);
    let logo = pdf.rgb_image(40, 40, [0, 0, 0]);
    let erin = pdf.jpeg_image(160, 160);
    let form = pdf.form(&[("Im0", erin)], &[draw("Im0", 100.0, 500.0, 160.0, 160.0)]);

    pdf.page(
        &[
            ("Alice", alice),
            ("Bob", bob),
            ("Carol", carol),
            ("Dave", dave),
            ("Logo", logo),
        ],
        &[
            draw("Logo", 10.0, 10.0, 40.0, 40.0),
            draw("Alice", 300.0, 100.0, 100.0, 100.0),
            draw("Carol", 400.0, 300.0, 90.0, 120.0),
            draw("Bob", 50.0, 104.0, 100.0, 100.0),
            draw("Dave", 60.0, 296.0, 150.0, 90.0),
        ],
    );
    pdf.page(
        &[("Alice", alice), ("Fm0", form)],
        &[
            identity("Fm0"),
            draw("Alice", 300.0, 50.0, 100.0, 100.0),
        ],
    );
    pdf.page(&[], &[]);
    pdf.build()
}
