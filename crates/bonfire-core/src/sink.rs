//! # Output Sink Boundary
//!
//! Renders result batches. A batch is handed over whole, so a sink never
//! sees part of one poll interleaved with the next.

use crate::backend::{Record, Terms};
use crate::error::Result;

pub trait OutputSink {
    /// Render `batch` in order. When `fields` is given, only those
    /// attributes are shown, in that order.
    fn emit(&mut self, batch: &[Record], fields: Option<&[String]>) -> Result<()>;

    /// Render the distinct values of a term query.
    fn emit_terms(&mut self, terms: &Terms) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn emit(&mut self, batch: &[Record], fields: Option<&[String]>) -> Result<()> {
        (**self).emit(batch, fields)
    }

    fn emit_terms(&mut self, terms: &Terms) -> Result<()> {
        (**self).emit_terms(terms)
    }
}
