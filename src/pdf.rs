//! Minimal single-page PDF 1.4 writer for receipts.
//!
//! Supports the built-in Helvetica faces (WinAnsi encoding), filled and
//! stroked rectangles, lines, text and RGB images. Coordinates passed to the
//! builder are measured from the top-left corner of the page; the builder
//! flips them into PDF user space.
//!
//! ```rust,ignore
//! let mut pdf = PdfBuilder::a4();
//! pdf.fill_rect(0.0, 0.0, pdf.width(), 80.0, Rgb(16, 94, 72))
//!     .text(40.0, 50.0, Font::Bold, 24.0, Rgb::WHITE, "RECEIPT");
//! let bytes = pdf.build()?;
//! ```

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write as _;

pub const A4_WIDTH: f32 = 595.28;
pub const A4_HEIGHT: f32 = 841.89;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    fn components(self) -> (f32, f32, f32) {
        (
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageId(usize);

struct PdfImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Font metrics
// ---------------------------------------------------------------------------

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48..63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64..79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80..95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96..111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112..126
];

/// Helvetica-Bold advance widths for ASCII 32..=126.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 48..63
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 64..79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 80..95
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 96..111
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 112..126
];

fn char_width(c: char, font: Font) -> u16 {
    let table = match font {
        Font::Regular => &HELVETICA_WIDTHS,
        Font::Bold => &HELVETICA_BOLD_WIDTHS,
    };
    match c as u32 {
        code @ 32..=126 => table[(code - 32) as usize],
        _ => 556,
    }
}

/// Rendered width of `text` in points.
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, font) as f32).sum::<f32>() * size / 1000.0
}

/// Shorten `text` with a trailing "..." until it fits in `max_width`.
pub fn fit_text(text: &str, font: Font, size: f32, max_width: f32) -> String {
    if text_width(text, font, size) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "...";
        if text_width(&candidate, font, size) <= max_width {
            return candidate;
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Text encoding
// ---------------------------------------------------------------------------

fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{20}'..='\u{7e}' => c as u8,
        '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        _ => b'?',
    }
}

/// Encode text as a PDF literal string body (without the parentheses).
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let byte = if c.is_control() { b' ' } else { win_ansi_byte(c) };
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            other => {
                let _ = write!(out, "\\{other:03o}");
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct PdfBuilder {
    width: f32,
    height: f32,
    title: String,
    ops: String,
    images: Vec<PdfImage>,
}

impl PdfBuilder {
    pub fn a4() -> Self {
        Self::new(A4_WIDTH, A4_HEIGHT)
    }

    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            title: String::new(),
            ops: String::with_capacity(4096),
            images: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    fn flip(&self, y: f32) -> f32 {
        self.height - y
    }

    /// Register raw 8-bit RGB pixels; draw them with [`PdfBuilder::image`].
    pub fn add_image(&mut self, width: u32, height: u32, rgb: Vec<u8>) -> ImageId {
        self.images.push(PdfImage { width, height, rgb });
        ImageId(self.images.len() - 1)
    }

    pub fn image(&mut self, id: ImageId, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        let bottom = self.flip(y + h);
        let _ = writeln!(
            self.ops,
            "q {w:.2} 0 0 {h:.2} {x:.2} {bottom:.2} cm /Im{} Do Q",
            id.0
        );
        self
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb) -> &mut Self {
        let (r, g, b) = color.components();
        let bottom = self.flip(y + h);
        let _ = writeln!(
            self.ops,
            "{r:.3} {g:.3} {b:.3} rg {x:.2} {bottom:.2} {w:.2} {h:.2} re f"
        );
        self
    }

    pub fn stroke_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        line_width: f32,
        color: Rgb,
    ) -> &mut Self {
        let (r, g, b) = color.components();
        let bottom = self.flip(y + h);
        let _ = writeln!(
            self.ops,
            "{r:.3} {g:.3} {b:.3} RG {line_width:.2} w {x:.2} {bottom:.2} {w:.2} {h:.2} re S"
        );
        self
    }

    pub fn line(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        line_width: f32,
        color: Rgb,
    ) -> &mut Self {
        let (r, g, b) = color.components();
        let (y1, y2) = (self.flip(y1), self.flip(y2));
        let _ = writeln!(
            self.ops,
            "{r:.3} {g:.3} {b:.3} RG {line_width:.2} w {x1:.2} {y1:.2} m {x2:.2} {y2:.2} l S"
        );
        self
    }

    /// Draw text with its baseline at `y`.
    pub fn text(
        &mut self,
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        color: Rgb,
        text: &str,
    ) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        let (r, g, b) = color.components();
        let baseline = self.flip(y);
        let _ = writeln!(
            self.ops,
            "BT /{} {size:.2} Tf {r:.3} {g:.3} {b:.3} rg {x:.2} {baseline:.2} Td ({}) Tj ET",
            font.resource(),
            escape_text(text)
        );
        self
    }

    pub fn text_right(
        &mut self,
        right: f32,
        y: f32,
        font: Font,
        size: f32,
        color: Rgb,
        text: &str,
    ) -> &mut Self {
        let x = right - text_width(text, font, size);
        self.text(x, y, font, size, color, text)
    }

    pub fn text_centered(
        &mut self,
        center: f32,
        y: f32,
        font: Font,
        size: f32,
        color: Rgb,
        text: &str,
    ) -> &mut Self {
        let x = center - text_width(text, font, size) / 2.0;
        self.text(x, y, font, size, color, text)
    }

    /// Serialize the document.
    pub fn build(self) -> std::io::Result<Vec<u8>> {
        let mut objects: Vec<Vec<u8>> = Vec::new();

        // 1: catalog, 2: pages, 3: page, 4/5: fonts, 6: content, 7..: images, last: info
        let image_base = 7;
        let info_id = image_base + self.images.len();

        objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
        objects.push(b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec());

        let mut xobjects = String::new();
        for i in 0..self.images.len() {
            let _ = write!(xobjects, "/Im{i} {} 0 R ", image_base + i);
        }
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R >> /XObject << {xobjects}>> >> \
                 /Contents 6 0 R >>",
                self.width, self.height
            )
            .into_bytes(),
        );
        objects.push(
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        );
        objects.push(
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        );
        objects.push(flate_stream("", self.ops.as_bytes())?);

        for image in &self.images {
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8 ",
                image.width, image.height
            );
            objects.push(flate_stream(&dict, &image.rgb)?);
        }

        objects.push(
            format!(
                "<< /Producer (don-lustre-admin) /Title ({}) >>",
                escape_text(&self.title)
            )
            .into_bytes(),
        );

        let mut out: Vec<u8> = Vec::with_capacity(8192);
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in &offsets {
            let _ = write!(xref, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        );
        out.extend_from_slice(xref.as_bytes());
        Ok(out)
    }
}

/// Wrap `data` in a Flate-compressed stream object. `extra_dict` holds
/// additional dictionary entries (with a trailing space).
fn flate_stream(extra_dict: &str, data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    let mut obj = format!(
        "<< {extra_dict}/Filter /FlateDecode /Length {} >>\nstream\n",
        compressed.len()
    )
    .into_bytes();
    obj.extend_from_slice(&compressed);
    obj.extend_from_slice(b"\nendstream");
    Ok(obj)
}
