//! Reference constructor for the block tree
//!
//! Builds a valid marked tree straight from the text, level by level.  For
//! every level a Rabin-Karp sweep records the leftmost occurrence of each
//! window of the level's block size; a block becomes a back-pointer when its
//! content's leftmost occurrence ends at or before the block's start and the
//! one or two source blocks covering that occurrence are present, adjacent
//! and already marked internal.  Everything else is marked and expanded.
//! Blocks are decided left to right, so by the time a pointer is laid down
//! its sources are settled.
//!
//! Production builders derive better pointers from longest-previous-factor
//! tables; the tree shape they emit is the same, and [`crate::tree::BlockTree::from_raw`]
//! accepts either.

use bit_vec::BitVec;
use std::collections::HashMap;
use crate::Error;
use crate::tree::{BlockTree,RawTree};

/// Parameters controlling the tree shape
#[derive(Clone)]
pub struct Params {
    /// children per internal block, at least 2
    pub arity: usize,
    /// symbols per leaf block
    pub leaf_len: usize,
    /// number of blocks on the topmost level
    pub top_blocks: usize
}

pub const STD_PARAMS: Params = Params {
    arity: 2,
    leaf_len: 4,
    top_blocks: 1
};

const HASH_BASE: u64 = 0x100000001b3;

/// Index the whole of `text`.
pub fn build(text: &[u8],params: &Params) -> Result<BlockTree,Error> {
    if text.is_empty() || params.arity < 2 || params.leaf_len < 1 || params.top_blocks < 1 {
        return Err(Error::InvariantViolated);
    }
    // the deepest level's blocks are `arity` leaves wide; grow the top block
    // until `top_blocks` of them cover the text
    let mut height = 1;
    let mut top_size = params.leaf_len * params.arity;
    while params.top_blocks * top_size < text.len() {
        top_size *= params.arity;
        height += 1;
    }
    let mut padded = text.to_vec();
    padded.resize(params.top_blocks * top_size,0);
    log::debug!("tree of height {}, top block size {}, {} bytes of padding",
        height,top_size,padded.len() - text.len());

    let mut block_sizes = Vec::with_capacity(height);
    let mut marks = Vec::with_capacity(height);
    let mut pointers = Vec::with_capacity(height);
    let mut offsets = Vec::with_capacity(height);
    let mut starts: Vec<usize> = (0..params.top_blocks).map(|k| k * top_size).collect();
    let mut block_size = top_size;
    for _lvl in 0..height {
        let level = mark_level(&padded,&starts,block_size);
        log::debug!("level with block size {}: {} blocks, {} internal",
            block_size,starts.len(),level.marks.iter().filter(|m| *m).count());
        let child_size = block_size / params.arity;
        let mut next_starts = Vec::new();
        for (k,start) in starts.iter().enumerate() {
            if level.marks.get(k) == Some(true) {
                for t in 0..params.arity {
                    next_starts.push(start + t * child_size);
                }
            }
        }
        block_sizes.push(block_size);
        marks.push(level.marks);
        pointers.push(level.pointers);
        offsets.push(level.offsets);
        starts = next_starts;
        block_size = child_size;
    }
    // what remains of `starts` are the leaf blocks
    let mut leaves = Vec::with_capacity(starts.len() * params.leaf_len);
    for start in &starts {
        leaves.extend_from_slice(&padded[*start..*start + params.leaf_len]);
    }
    let mut chars = Vec::new();
    let mut seen = [false;256];
    for b in text {
        if !seen[*b as usize] {
            seen[*b as usize] = true;
            chars.push(*b);
        }
    }
    BlockTree::from_raw(RawTree {
        arity: params.arity,
        leaf_len: params.leaf_len,
        top_blocks: params.top_blocks,
        input_len: text.len(),
        block_sizes,
        marks,
        pointers,
        offsets,
        leaves,
        chars
    })
}

struct MarkedLevel {
    marks: BitVec,
    pointers: Vec<usize>,
    offsets: Vec<usize>
}

/// Decide internal vs back-pointer for every block of one level.
fn mark_level(text: &[u8],starts: &[usize],block_size: usize) -> MarkedLevel {
    let hashes = window_hashes(text,block_size);
    let mut first_pos: HashMap<u64,usize> = HashMap::new();
    for (p,h) in hashes.iter().enumerate() {
        first_pos.entry(*h).or_insert(p);
    }
    let mut marks = BitVec::from_elem(starts.len(),false);
    let mut pointers = Vec::new();
    let mut offsets = Vec::new();
    for (k,start) in starts.iter().enumerate() {
        match find_source(text,starts,&marks,block_size,&first_pos,&hashes,k,*start) {
            Some((ptr,off)) => {
                pointers.push(ptr);
                offsets.push(off);
            },
            None => {
                marks.set(k,true);
            }
        }
    }
    MarkedLevel { marks, pointers, offsets }
}

/// Try to express block `k` as a reference to the leftmost occurrence of its
/// content.  Returns the source block index within the level and the offset
/// into it, or None if the block has to be internal.
fn find_source(text: &[u8],starts: &[usize],marks: &BitVec,block_size: usize,
    first_pos: &HashMap<u64,usize>,hashes: &[u64],k: usize,start: usize) -> Option<(usize,usize)> {
    let q = *first_pos.get(&hashes[start])?;
    // must end at or before our own start
    if q + block_size > start {
        return None;
    }
    // hash hit, now make sure the bytes agree
    if text[q..q + block_size] != text[start..start + block_size] {
        return None;
    }
    // locate the block containing position q; levels below the top are
    // sparse, q may fall in a gap between surviving blocks
    let i1 = starts.partition_point(|s| *s <= q) - 1;
    let g = q - starts[i1];
    if g >= block_size || marks.get(i1) != Some(true) {
        return None;
    }
    if g > 0 {
        let spill_ok = i1 + 1 < starts.len()
            && starts[i1 + 1] == starts[i1] + block_size
            && marks.get(i1 + 1) == Some(true)
            && i1 + 1 < k;
        if !spill_ok {
            return None;
        }
    }
    Some((i1,g))
}

/// rolling hash of every window of length `width`
fn window_hashes(text: &[u8],width: usize) -> Vec<u64> {
    let mut power: u64 = 1;
    for _i in 1..width {
        power = power.wrapping_mul(HASH_BASE);
    }
    let mut hashes = Vec::with_capacity(text.len() - width + 1);
    let mut h: u64 = 0;
    for b in &text[0..width] {
        h = h.wrapping_mul(HASH_BASE).wrapping_add(*b as u64);
    }
    hashes.push(h);
    for p in 1..=text.len() - width {
        h = h.wrapping_sub((text[p-1] as u64).wrapping_mul(power))
            .wrapping_mul(HASH_BASE)
            .wrapping_add(text[p + width - 1] as u64);
        hashes.push(h);
    }
    hashes
}

#[test]
fn geometry() {
    let tree = build("aabbaabb".as_bytes(),&Params { arity: 2, leaf_len: 2, top_blocks: 1 }).expect("build failed");
    assert_eq!(tree.len(),8);
    assert_eq!(tree.height(),2);
    let tree = build(&[b'A';256],&Params { arity: 4, leaf_len: 4, top_blocks: 1 }).expect("build failed");
    assert_eq!(tree.height(),3);
    // leaf width that is not a power of the arity
    let tree = build(&[b'x';100],&Params { arity: 4, leaf_len: 8, top_blocks: 1 }).expect("build failed");
    assert_eq!(tree.len(),100);
    assert_eq!(tree.access(99).expect("access failed"),b'x');
}

#[test]
fn repetitive_input_collapses() {
    let tree = build(&[b'A';256],&Params { arity: 4, leaf_len: 4, top_blocks: 1 }).expect("build failed");
    // one run of A's: nothing but the leftmost block survives on any level
    assert_eq!(tree.leaf_symbols(),16);
}

#[test]
fn bad_params() {
    match build(&[],&STD_PARAMS) {
        Err(Error::InvariantViolated) => {},
        _ => panic!("expected InvariantViolated")
    }
    match build("abc".as_bytes(),&Params { arity: 1, leaf_len: 2, top_blocks: 1 }) {
        Err(Error::InvariantViolated) => {},
        _ => panic!("expected InvariantViolated")
    }
}

#[test]
fn multiple_top_blocks() {
    let text = "abracadabra_abracadabra_abracadabra!".as_bytes();
    let tree = build(text,&Params { arity: 2, leaf_len: 2, top_blocks: 3 }).expect("build failed");
    for (i,b) in text.iter().enumerate() {
        assert_eq!(tree.access(i).expect("access failed"),*b);
    }
}
