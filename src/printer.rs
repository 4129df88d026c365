use crate::boxes::{BoxHeader, FourCC};
use crate::error::ParseError;
use crate::known_boxes::KnownBox;
use crate::registry::StructuredData;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};

/// Receives boxes from the walker in stream order.
///
/// `enter` and `leave` bracket every box, so children arrive between their
/// parent's `enter` and `leave`. Implementations only render; they never see
/// the cursor.
pub trait BoxVisitor {
    fn enter(&mut self, hdr: &BoxHeader) -> io::Result<()>;

    fn decoded(&mut self, hdr: &BoxHeader, data: &StructuredData) -> io::Result<()>;

    /// A box whose payload was consumed but could not be decoded.
    fn failed(&mut self, hdr: &BoxHeader, err: &ParseError) -> io::Result<()>;

    fn leave(&mut self, hdr: &BoxHeader) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Emitted once per display level.
    pub indent: String,
    /// Box types shown at a fixed depth regardless of nesting. Their children
    /// follow one level below.
    pub depth_overrides: HashMap<FourCC, usize>,
}

impl PrinterConfig {
    /// No depth overrides: display depth always equals nesting depth.
    pub fn plain() -> Self {
        PrinterConfig {
            indent: "  ".into(),
            depth_overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, typ: FourCC, depth: usize) -> Self {
        self.depth_overrides.insert(typ, depth);
        self
    }

    pub fn display_depth(&self, hdr: &BoxHeader, parent: Option<usize>) -> usize {
        match (self.depth_overrides.get(&hdr.typ), parent) {
            (Some(&d), _) => d,
            (None, Some(p)) => p + 1,
            (None, None) => hdr.depth,
        }
    }
}

impl Default for PrinterConfig {
    /// Groups fragmented streams by pinning `moof` and `mdat` to the left margin.
    fn default() -> Self {
        PrinterConfig::plain()
            .with_override(FourCC(*b"moof"), 0)
            .with_override(FourCC(*b"mdat"), 0)
    }
}

/// Parse a `TYPE=DEPTH` override such as `traf=1`.
pub fn parse_depth_override(s: &str) -> Result<(FourCC, usize), String> {
    let (typ, depth) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=DEPTH, got '{s}'"))?;
    let typ = FourCC::from_str(typ).ok_or_else(|| format!("'{typ}' is not a 4-character type code"))?;
    let depth = depth
        .parse::<usize>()
        .map_err(|e| format!("bad depth '{depth}': {e}"))?;
    Ok((typ, depth))
}

// ---------- Human-readable text ----------

pub struct TextPrinter<W> {
    out: W,
    config: PrinterConfig,
    depths: Vec<usize>,
}

impl<W: Write> TextPrinter<W> {
    pub fn new(out: W, config: PrinterConfig) -> Self {
        TextPrinter {
            out,
            config,
            depths: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn field(&mut self, name: &str, value: impl std::fmt::Display) -> io::Result<()> {
        let depth = self.depths.last().copied().unwrap_or(0) + 1;
        let indent = self.config.indent.repeat(depth);
        writeln!(self.out, "{indent}{name}: {value}")
    }
}

impl<W: Write> BoxVisitor for TextPrinter<W> {
    fn enter(&mut self, hdr: &BoxHeader) -> io::Result<()> {
        let depth = self.config.display_depth(hdr, self.depths.last().copied());
        let indent = self.config.indent.repeat(depth);
        writeln!(self.out, "{indent}'{}' box {} bytes", hdr.typ, hdr.size)?;
        self.depths.push(depth);
        Ok(())
    }

    fn decoded(&mut self, _hdr: &BoxHeader, data: &StructuredData) -> io::Result<()> {
        match data {
            StructuredData::FileType(ftyp) => {
                self.field("major brand", ftyp.major_brand)?;
                self.field("minor version", ftyp.minor_version)?;
                let brands: Vec<String> = ftyp
                    .compatible_brands
                    .iter()
                    .map(|b| b.to_string())
                    .collect();
                self.field("compatible brands", format!("[{}]", brands.join(", ")))?;
            }
            StructuredData::MovieHeader(mvhd) => {
                self.field("version", mvhd.version)?;
                self.field("creation time", mvhd.creation_time)?;
                self.field("modification time", mvhd.modification_time)?;
                self.field("timescale", mvhd.timescale)?;
                self.field("duration", mvhd.duration)?;
                match mvhd.duration_seconds() {
                    Ok(secs) => self.field("duration seconds", format!("{secs:.3}"))?,
                    Err(e) => self.field("duration seconds", format!("undefined ({e})"))?,
                }
                self.field("rate", f64::from(mvhd.rate))?;
                self.field("volume", f64::from(mvhd.volume))?;
                if mvhd.matrix.is_identity() {
                    self.field("matrix", "identity")?;
                } else {
                    self.field("matrix", format!("{:?}", mvhd.matrix.to_f64()))?;
                }
                self.field("next track id", mvhd.next_track_id)?;
            }
            StructuredData::MovieExtendsHeader(mehd) => {
                self.field("version", mehd.version)?;
                self.field("fragment duration", mehd.fragment_duration)?;
            }
            StructuredData::MovieFragmentHeader(mfhd) => {
                self.field("sequence number", mfhd.sequence_number)?;
            }
        }
        Ok(())
    }

    fn failed(&mut self, _hdr: &BoxHeader, err: &ParseError) -> io::Result<()> {
        self.field("not decoded", err)
    }

    fn leave(&mut self, _hdr: &BoxHeader) -> io::Result<()> {
        self.depths.pop();
        Ok(())
    }
}

// ---------- JSON representation ----------

/// A JSON-serializable node of the box tree.
#[derive(Debug, Serialize)]
pub struct JsonBox {
    /// Absolute byte offset of the box header
    pub offset: u64,
    /// Declared size including the header
    pub size: u32,
    /// Type code, non-printable bytes shown as '.'
    pub typ: String,
    /// Raw type code in hex, present only when it is not printable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ_hex: Option<String>,
    /// Display depth
    pub depth: usize,
    /// Human-readable box type name (e.g. "File Type Box")
    pub full_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<StructuredData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JsonBox>,
}

/// Collects the box tree for structured output.
pub struct JsonPrinter {
    config: PrinterConfig,
    stack: Vec<JsonBox>,
    roots: Vec<JsonBox>,
}

impl JsonPrinter {
    pub fn new(config: PrinterConfig) -> Self {
        JsonPrinter {
            config,
            stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Completed top-level boxes. Boxes still open when a walk aborted are
    /// dropped.
    pub fn into_boxes(self) -> Vec<JsonBox> {
        self.roots
    }
}

impl BoxVisitor for JsonPrinter {
    fn enter(&mut self, hdr: &BoxHeader) -> io::Result<()> {
        let depth = self
            .config
            .display_depth(hdr, self.stack.last().map(|b| b.depth));
        self.stack.push(JsonBox {
            offset: hdr.start,
            size: hdr.size,
            typ: hdr.typ.to_string(),
            typ_hex: (!hdr.typ.is_printable()).then(|| hdr.typ.to_hex()),
            depth,
            full_name: KnownBox::from(hdr.typ).full_name(),
            decoded: None,
            error: None,
            children: Vec::new(),
        });
        Ok(())
    }

    fn decoded(&mut self, _hdr: &BoxHeader, data: &StructuredData) -> io::Result<()> {
        if let Some(b) = self.stack.last_mut() {
            b.decoded = Some(data.clone());
        }
        Ok(())
    }

    fn failed(&mut self, _hdr: &BoxHeader, err: &ParseError) -> io::Result<()> {
        if let Some(b) = self.stack.last_mut() {
            b.error = Some(err.to_string());
        }
        Ok(())
    }

    fn leave(&mut self, _hdr: &BoxHeader) -> io::Result<()> {
        if let Some(done) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => self.roots.push(done),
            }
        }
        Ok(())
    }
}
