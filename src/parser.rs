use crate::boxes::{BoxHeader, FULL_BOX_HEADER_SIZE, FourCC, FullBoxHeader, HEADER_SIZE};
use crate::cursor::{ByteCursor, PayloadCursor};
use crate::error::{BoxWarning, FieldWarning, ParseError, Result, Variant};
use crate::known_boxes::{Handler, KnownBox};
use crate::printer::BoxVisitor;
use crate::registry::Registry;
use serde::Serialize;
use std::io::{Read, Seek};
use tracing::{debug, error, trace, warn};

/// Largest payload a semantic decoder is handed in memory.
pub const MAX_DECODE_PAYLOAD: u64 = 64 * 1024;

pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Deepest container nesting accepted before failing the file.
    pub max_depth: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Outcome of a complete pass over one stream.
#[derive(Debug, Default, Serialize)]
pub struct DumpReport {
    pub boxes: usize,
    pub warnings: Vec<BoxWarning>,
    /// Boxes whose payload could not be decoded but were stepped over.
    pub undecoded: usize,
}

/// Read the 8-byte standard header at the cursor. The declared size is not
/// validated here; see [`validate_header`].
pub fn read_box_header<R: Read + Seek>(r: &mut ByteCursor<R>, depth: usize) -> Result<BoxHeader> {
    let start = r.position();
    let size = r.read_u32()?;
    let typ = r.read_fourcc()?;
    Ok(BoxHeader {
        size,
        typ,
        start,
        depth,
    })
}

/// Read the version + flags word of a full box.
pub fn read_fullbox_header<R: Read + Seek>(
    r: &mut ByteCursor<R>,
    hdr: &BoxHeader,
) -> Result<FullBoxHeader> {
    let required = HEADER_SIZE + FULL_BOX_HEADER_SIZE;
    if u64::from(hdr.size) < required {
        return Err(ParseError::TooShort {
            typ: hdr.typ,
            offset: hdr.start,
            depth: hdr.depth,
            size: hdr.size,
            required,
        });
    }
    Ok(FullBoxHeader::from_word(r.read_u32()?))
}

/// Reject header variants this crate does not parse, and sizes that cannot
/// hold the header itself.
pub fn validate_header(hdr: &BoxHeader) -> Result<()> {
    let unsupported = |variant| ParseError::UnsupportedVariant {
        typ: hdr.typ,
        offset: hdr.start,
        depth: hdr.depth,
        variant,
    };
    match hdr.size {
        1 => return Err(unsupported(Variant::ExtendedSize)),
        0 => return Err(unsupported(Variant::SizeToEnd)),
        s if u64::from(s) < HEADER_SIZE => {
            return Err(ParseError::MalformedSize {
                typ: hdr.typ,
                offset: hdr.start,
                depth: hdr.depth,
                size: s,
                reason: "smaller than the 8-byte box header".into(),
            });
        }
        _ => {}
    }
    if hdr.typ == FourCC(*b"uuid") {
        return Err(unsupported(Variant::ExtendedType));
    }
    Ok(())
}

/// Walk a whole stream, reporting every box to `visitor`.
///
/// The stream is treated as an implicit outermost container that ends where
/// the source ends. The first fatal error aborts the pass.
pub fn dump<R: Read + Seek, V: BoxVisitor>(
    reader: R,
    registry: &Registry,
    opts: &DumpOptions,
    visitor: &mut V,
) -> Result<DumpReport> {
    let mut walker = Walker::new(ByteCursor::new(reader)?, registry, opts, visitor);
    walker.walk_top_level()?;
    Ok(walker.into_report())
}

/// Recursive box walker over one cursor.
///
/// Every path through [`Walker::dispatch`] consumes exactly the declared
/// payload of the box, which is what keeps sibling accounting correct at
/// every depth.
pub struct Walker<'a, R, V> {
    cursor: ByteCursor<R>,
    registry: &'a Registry,
    opts: &'a DumpOptions,
    visitor: &'a mut V,
    report: DumpReport,
}

impl<'a, R: Read + Seek, V: BoxVisitor> Walker<'a, R, V> {
    pub fn new(
        cursor: ByteCursor<R>,
        registry: &'a Registry,
        opts: &'a DumpOptions,
        visitor: &'a mut V,
    ) -> Self {
        Walker {
            cursor,
            registry,
            opts,
            visitor,
            report: DumpReport::default(),
        }
    }

    pub fn into_report(self) -> DumpReport {
        self.report
    }

    /// Consume top-level boxes until the source is exhausted.
    pub fn walk_top_level(&mut self) -> Result<()> {
        while !self.cursor.is_at_end() {
            let hdr = read_box_header(&mut self.cursor, 0)?;
            validate_header(&hdr)?;
            let available = self.cursor.remaining();
            if hdr.payload_len() > available {
                return Err(ParseError::ShortRead {
                    offset: hdr.payload_start(),
                    wanted: hdr.payload_len(),
                    available,
                });
            }
            self.visit(&hdr)?;
        }
        Ok(())
    }

    /// Consume the payload of `parent` as a sequence of child boxes.
    pub fn walk_container(&mut self, parent: &BoxHeader) -> Result<()> {
        let depth = parent.depth + 1;
        if depth > self.opts.max_depth {
            return Err(ParseError::UnsupportedVariant {
                typ: parent.typ,
                offset: parent.start,
                depth: parent.depth,
                variant: Variant::DepthLimit(self.opts.max_depth),
            });
        }

        let extent = parent.payload_len();
        let mut consumed = 0u64;
        while consumed < extent {
            let remaining = extent - consumed;
            if remaining < HEADER_SIZE {
                return Err(ParseError::MalformedSize {
                    typ: parent.typ,
                    offset: parent.start,
                    depth: parent.depth,
                    size: parent.size,
                    reason: format!("{remaining} trailing bytes cannot hold a child box"),
                });
            }

            let hdr = read_box_header(&mut self.cursor, depth)?;
            validate_header(&hdr)?;
            if u64::from(hdr.size) > remaining {
                return Err(ParseError::MalformedSize {
                    typ: hdr.typ,
                    offset: hdr.start,
                    depth,
                    size: hdr.size,
                    reason: format!(
                        "overruns parent '{}' at offset {} by {} bytes",
                        parent.typ,
                        parent.start,
                        u64::from(hdr.size) - remaining
                    ),
                });
            }

            self.visit(&hdr)?;
            consumed += u64::from(hdr.size);
        }
        Ok(())
    }

    fn visit(&mut self, hdr: &BoxHeader) -> Result<()> {
        debug!(typ = ?hdr.typ, offset = hdr.start, size = hdr.size, depth = hdr.depth, "box");
        self.report.boxes += 1;
        self.visitor.enter(hdr)?;
        self.dispatch(hdr)?;

        let pos = self.cursor.position();
        if pos != hdr.end() {
            return Err(ParseError::MalformedSize {
                typ: hdr.typ,
                offset: hdr.start,
                depth: hdr.depth,
                size: hdr.size,
                reason: format!("payload handling ended at offset {pos}, expected {}", hdr.end()),
            });
        }

        self.visitor.leave(hdr)?;
        Ok(())
    }

    /// Route a box whose header has just been read to its handler.
    pub fn dispatch(&mut self, hdr: &BoxHeader) -> Result<()> {
        match KnownBox::from(hdr.typ).handler() {
            Handler::Container => self.walk_container(hdr),
            Handler::Decode if self.registry.contains(&hdr.typ) => self.decode(hdr),
            Handler::Decode | Handler::Skip => self.skip(hdr),
        }
    }

    fn skip(&mut self, hdr: &BoxHeader) -> Result<()> {
        trace!(typ = ?hdr.typ, bytes = hdr.payload_len(), "skip");
        self.cursor.skip(hdr.payload_len())
    }

    fn decode(&mut self, hdr: &BoxHeader) -> Result<()> {
        let len = hdr.payload_len();
        if len > MAX_DECODE_PAYLOAD {
            return Err(ParseError::MalformedSize {
                typ: hdr.typ,
                offset: hdr.start,
                depth: hdr.depth,
                size: hdr.size,
                reason: format!("payload larger than {MAX_DECODE_PAYLOAD} bytes"),
            });
        }

        let buf = self.cursor.read_bytes(len as usize)?;
        let mut r = PayloadCursor::from_slice(&buf);
        let mut warnings = Vec::new();
        let Some(res) = self.registry.decode(&hdr.typ, &mut r, hdr, &mut warnings) else {
            return Ok(());
        };
        if let Some(name) = self.registry.name(&hdr.typ) {
            debug!(typ = ?hdr.typ, decoder = name, ok = res.is_ok(), "decoded");
        }

        match res {
            Ok(data) => {
                if !r.is_at_end() {
                    warnings.push(FieldWarning::TrailingBytes {
                        count: r.remaining(),
                    });
                }
                self.record_warnings(hdr, warnings);
                self.visitor.decoded(hdr, &data)?;
            }
            Err(e) if e.is_box_local() => {
                self.record_warnings(hdr, warnings);
                error!(typ = ?hdr.typ, offset = hdr.start, "{e}");
                self.report.undecoded += 1;
                self.visitor.failed(hdr, &e)?;
            }
            Err(e) => {
                self.record_warnings(hdr, warnings);
                return Err(e);
            }
        }
        Ok(())
    }

    fn record_warnings(&mut self, hdr: &BoxHeader, warnings: Vec<FieldWarning>) {
        for warning in warnings {
            let w = BoxWarning {
                typ: hdr.typ,
                offset: hdr.start,
                warning,
            };
            warn!("{w}");
            self.report.warnings.push(w);
        }
    }
}
