//! Registry Codec: protobuf text format <-> [`Document`].
//!
//! Decoding is checked against the `ModelServerConfig` schema, so a document that
//! comes out of [`decode_text`] only holds known fields with correctly typed values.
//! Encoding writes fields in document order, which makes
//! `decode_text(&encode_text(&d)) == d` hold for every schema-valid document.

mod error;
mod escape;
pub mod lexer;
mod parser;
mod printer;
pub mod schema;

pub use error::{ParseError, ParseResult, Position};

use crate::document::Document;

pub fn decode_text(text: &str) -> ParseResult<Document> {
    parser::parse(text)
}

pub fn encode_text(document: &Document) -> String {
    printer::print(document)
}
