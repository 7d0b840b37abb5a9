//! Writing images and text onto the pages of an existing document.
//!
//! Every drawing call adds one content stream to the page. The first call on
//! a page also wraps the existing page content in `q`/`Q` so that graphics
//! state left behind by the original content cannot leak into ours.

use crate::{media_box_size, PageSize, PdfEngineError, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;

/// Standard-14 font families available without embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl StandardFont {
    /// Map a CSS font family onto the closest standard font.
    pub fn from_css_family(family: &str) -> Self {
        let family = family.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();

        if family.contains("courier") || family.contains("mono") {
            StandardFont::Courier
        } else if family.contains("times") || family == "serif" || family.contains("georgia") {
            StandardFont::TimesRoman
        } else {
            StandardFont::Helvetica
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }

    /// Average glyph advance as a fraction of the font size.
    fn average_advance(&self) -> f32 {
        match self {
            StandardFont::Helvetica => 0.52,
            StandardFont::TimesRoman => 0.47,
            StandardFont::Courier => 0.6,
        }
    }

    /// Approximate rendered width of `text` at `size` points.
    pub fn approximate_width(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * self.average_advance() * size
    }
}

/// Where an image lands on the page, in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A run of text on the page. `y` is the baseline in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPlacement {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub font: StandardFont,
    /// RGB components in `0.0..=1.0`.
    pub color: [f32; 3],
    pub max_width: Option<f32>,
}

/// A loaded document open for modification.
pub struct WritableDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    isolated_pages: HashSet<ObjectId>,
}

impl std::fmt::Debug for WritableDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableDocument").field("page_count", &self.page_ids.len()).finish()
    }
}

impl WritableDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let doc = Document::load_mem(bytes)?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(Self { doc, page_ids, isolated_pages: HashSet::new() })
    }

    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// Page for a 1-based page number.
    pub fn page(&mut self, page_number: u32) -> Result<WritablePage<'_>, PdfEngineError> {
        let page_count = self.page_count();
        let page_id = page_number
            .checked_sub(1)
            .and_then(|index| self.page_ids.get(index as usize).copied())
            .ok_or(PdfEngineError::PageOutOfRange { page: page_number, page_count })?;

        let size = media_box_size(&self.doc, page_id).unwrap_or(PageSize::LETTER);
        Ok(WritablePage { owner: self, page_id, size })
    }

    pub fn save(mut self) -> Result<Vec<u8>, PdfEngineError> {
        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }

    /// Register `object` under a fresh name in the page's `category`
    /// resource dictionary and return the name.
    fn add_resource(
        &mut self,
        page_id: ObjectId,
        category: &str,
        prefix: &str,
        object: Object,
    ) -> Result<String, PdfEngineError> {
        let mut resources = self.page_resources(page_id);
        let mut entries = match resources.get(category.as_bytes()) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => {
                self.doc.get_dictionary(*id).cloned().unwrap_or_else(|_| Dictionary::new())
            }
            _ => Dictionary::new(),
        };

        let mut counter = 1;
        let name = loop {
            let candidate = format!("{prefix}{counter}");
            if !entries.has(candidate.as_bytes()) {
                break candidate;
            }
            counter += 1;
        };

        let object_id = self.doc.add_object(object);
        entries.set(name.clone(), Object::Reference(object_id));
        resources.set(category, Object::Dictionary(entries));

        self.doc.get_dictionary_mut(page_id)?.set("Resources", Object::Dictionary(resources));
        Ok(name)
    }

    /// Resources of a page as an owned dictionary, resolving references and
    /// inheritance from the page tree.
    fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        let mut current = page_id;

        for _ in 0..16 {
            let Ok(dict) = self.doc.get_dictionary(current) else {
                break;
            };

            match dict.get(b"Resources") {
                Ok(Object::Dictionary(resources)) => return resources.clone(),
                Ok(Object::Reference(id)) => {
                    return self.doc.get_dictionary(*id).cloned().unwrap_or_else(|_| Dictionary::new());
                }
                _ => {}
            }

            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => current = parent,
                Err(_) => break,
            }
        }

        Dictionary::new()
    }

    fn append_content(
        &mut self,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), PdfEngineError> {
        let encoded = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let existing = self.doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();
        let mut contents = match existing {
            Some(Object::Reference(id)) => vec![Object::Reference(id)],
            Some(Object::Array(items)) => items,
            _ => Vec::new(),
        };

        if self.isolated_pages.insert(page_id) && !contents.is_empty() {
            let save_id = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let restore_id = self.doc.add_object(Stream::new(Dictionary::new(), b"Q\n".to_vec()));
            contents.insert(0, Object::Reference(save_id));
            contents.push(Object::Reference(restore_id));
        }
        contents.push(Object::Reference(content_id));

        self.doc.get_dictionary_mut(page_id)?.set("Contents", Object::Array(contents));
        Ok(())
    }
}

/// One page of a [`WritableDocument`].
pub struct WritablePage<'a> {
    owner: &'a mut WritableDocument,
    page_id: ObjectId,
    size: PageSize,
}

impl WritablePage<'_> {
    pub fn size(&self) -> PageSize {
        self.size
    }

    /// Draw an RGBA raster. Alpha is carried through a soft mask.
    pub fn draw_image(
        &mut self,
        image: &RgbaImage,
        placement: ImagePlacement,
    ) -> Result<(), PdfEngineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PdfEngineError::Backend("cannot draw an empty image".to_string()));
        }

        let pixel_count = (width * height) as usize;
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for pixel in image.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mask_id = self.owner.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => mask_id,
            },
            rgb,
        );

        let name =
            self.owner.add_resource(self.page_id, "XObject", "SigIm", Object::Stream(image_stream))?;

        self.owner.append_content(
            self.page_id,
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        placement.width.into(),
                        0.into(),
                        0.into(),
                        placement.height.into(),
                        placement.x.into(),
                        placement.y.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    /// Draw a single line of text with a standard font.
    ///
    /// Characters outside printable ASCII are replaced with `?`. When
    /// `max_width` is set the text is cut to fit it.
    pub fn draw_text(&mut self, text: &str, placement: TextPlacement) -> Result<(), PdfEngineError> {
        let mut line: String = text
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
            .collect();

        if let Some(max_width) = placement.max_width {
            while !line.is_empty()
                && placement.font.approximate_width(&line, placement.size) > max_width
            {
                line.pop();
            }
        }

        if line.is_empty() {
            return Ok(());
        }

        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => placement.font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        };
        let name = self.owner.add_resource(self.page_id, "Font", "SigF", Object::Dictionary(font))?;

        let [r, g, b] = placement.color;
        self.owner.append_content(
            self.page_id,
            vec![
                Operation::new("q", vec![]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(name.into_bytes()), placement.size.into()]),
                Operation::new("Td", vec![placement.x.into(), placement.y.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        )
    }
}
