//! # Blocktree Library
//!
//! Compressed self-index for long strings over small alphabets
//! * `tree` holds the block-tree index: `access`, `rank`, `select`, space accounting
//! * `build` is the reference constructor, turning a text into a tree
//! * `huffman` is the canonical Huffman coder used for the optional leaf packing
//!
//! The index is immutable once built.  `access` works immediately; `rank`
//! and `select` need the per-symbol support built by `add_rank_support`,
//! which accepts a worker count and runs one task per distinct symbol.
//!
//! ## Example
//!
//! ```rs
//! use blocktree::build::{build,Params};
//! let text = "mississippi".as_bytes();
//! let mut tree = build(text,&Params { arity: 2, leaf_len: 2, top_blocks: 1 })
//!     .expect("build failed");
//! tree.add_rank_support(1).expect("rank build failed");
//! assert_eq!(tree.access(4).unwrap(),b'i');
//! assert_eq!(tree.rank(b's',10).unwrap(),4);
//! assert_eq!(tree.select(b'i',4).unwrap(),10);
//! ```

mod tools;
pub mod huffman;
pub mod tree;
pub mod build;

/// Index errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("position or occurrence index out of range")]
    OutOfRange,
    #[error("symbol not in the indexed alphabet")]
    UnknownSymbol,
    #[error("rank support has not been built")]
    RankNotBuilt,
    #[error("Huffman code would require more than 64 bits")]
    AlphabetTooLarge,
    #[error("Huffman stream was packed without samples")]
    NotSampled,
    #[error("internal consistency check failed")]
    InvariantViolated
}
