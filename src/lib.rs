pub mod boxes;
pub mod cursor;
pub mod error;
pub mod fp;
pub mod known_boxes;
pub mod parser;
pub mod printer;
pub mod registry;

pub use boxes::{BoxHeader, FourCC, FullBoxHeader};
pub use cursor::ByteCursor;
pub use error::{BoxWarning, FieldWarning, ParseError, Variant};
pub use parser::{DumpOptions, DumpReport, dump, read_box_header, read_fullbox_header};
pub use printer::{BoxVisitor, JsonPrinter, PrinterConfig, TextPrinter};
pub use registry::{Registry, StructuredData, default_registry};
