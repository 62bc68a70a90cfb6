//! Low-level document structure: object syntax, stream filters, object
//! streams and structural rewriting

pub mod filters;
pub mod linearization;
pub mod object_stream;
pub mod parser;

pub use self::{
    linearization::{BuiltinRewriter, QpdfRewriter, StructuralRewriter},
    object_stream::{expand_all, Expansion},
    parser::ObjectParser,
};
