pub mod anchor;
pub mod anchor_store;
pub mod chunk;
pub mod index;
pub mod model;
pub mod normalize;
pub mod passage_store;
pub mod structure;
pub mod tokenize;

pub use anchor::{create_anchor, drift_report, resolve, AnchorError};
pub use anchor_store::AnchorStore;
pub use chunk::{chunk, ChunkConfig, ChunkError};
pub use index::{IndexBuilder, IndexError, InvertedIndex};
pub use model::*;
pub use normalize::normalize;
pub use passage_store::PassageStore;
pub use structure::StructureIndex;
pub use tokenize::{tokenize, Tokenized, TOKENIZATION_VERSION};
