//! Raw-data readers and input sources.

mod reader;
mod source;

pub use reader::{
    combine_columns, parse_coordinates, parse_matrix, read_coordinates, read_metadata,
    GeneCoordinates, RawReader, TsvMatrixReader,
};
pub use source::{FileSource, InMemorySource, RawSource};
