//! Block-tree self-index core
//!
//! A block tree cuts the text into equal-sized blocks, level by level.  A
//! block whose content already occurred earlier at the same level is not
//! expanded; it is replaced by a back-pointer `(ptr, off)` into the earlier
//! occurrence.  Expanded ("internal") blocks get `arity` children on the next
//! level, and the deepest level stores its symbols verbatim in a compressed
//! leaf array.  Every query walks the levels top-down, rerouting through
//! back-pointers as it goes.
//!
//! `rank` and `select` additionally need per-symbol counts.  These are built
//! on demand by [`BlockTree::add_rank_support`]: for each distinct symbol and
//! each level, one packed vector of block counts (prefix-cumulative on the
//! top level, cumulative within each sibling group elsewhere) and one packed
//! vector with the unused source prefix of every back-pointer.

use bit_vec::BitVec;
use std::collections::HashMap;
use crate::Error;
use crate::huffman::HuffmanCoder;
use crate::tools::int_vec::{IntVec,bits_for};
use crate::tools::rank_bits::RankBits;

/// One level of the tree: the internal/back-pointer bitmap with its rank
/// directory, and the pointer and offset vectors indexed by back-pointer
/// ordinal (the r-th zero in the bitmap).
struct Level {
    marks: RankBits,
    pointers: IntVec,
    offsets: IntVec
}

/// Leaf storage is either the dense remap or a Huffman stream, never both.
enum Leaves {
    Dense(IntVec),
    Huffman(HuffmanCoder)
}

/// Rank scaffolding for one symbol: `blocks[lvl][k]` is the cumulative
/// count described in the module docs, `pointers[lvl][r]` the count in the
/// skipped prefix of the r-th back-pointer's first source block.
#[derive(Default)]
struct CharRanks {
    blocks: Vec<IntVec>,
    pointers: Vec<IntVec>
}

/// Raw output of an external tree builder, see `build::build` for the
/// reference one.  All vectors are in level order, topmost first.
pub struct RawTree {
    /// children per internal block, at least 2
    pub arity: usize,
    /// symbols per leaf block
    pub leaf_len: usize,
    /// number of blocks on the topmost level
    pub top_blocks: usize,
    /// length of the indexed text, padding excluded
    pub input_len: usize,
    /// block size of each level, topmost first
    pub block_sizes: Vec<usize>,
    /// internal/back-pointer bitmap per level
    pub marks: Vec<BitVec>,
    /// source block index for every back-pointer, per level
    pub pointers: Vec<Vec<usize>>,
    /// in-block source offset for every back-pointer, per level
    pub offsets: Vec<Vec<usize>>,
    /// concatenation of all leaf blocks, whole blocks only
    pub leaves: Vec<u8>,
    /// distinct text symbols in first-seen order
    pub chars: Vec<u8>
}

pub struct BlockTree {
    arity: usize,
    leaf_len: usize,
    input_len: usize,
    block_sizes: Vec<usize>,
    blocks_per_level: Vec<usize>,
    levels: Vec<Level>,
    leaves: Leaves,
    leaf_count: usize,
    compress_map: Vec<u8>,
    decompress_map: Vec<u8>,
    chars: Vec<u8>,
    char_index: HashMap<u8,usize>,
    char_ranks: Option<Vec<CharRanks>>
}

impl BlockTree {
    /// Take ownership of a builder's raw parts, check the structural
    /// invariants, wire up the rank directories and compress the leaves.
    pub fn from_raw(raw: RawTree) -> Result<Self,Error> {
        validate(&raw)?;
        let leaf_count = raw.leaves.len() / raw.leaf_len;
        let mut levels = Vec::with_capacity(raw.marks.len());
        let mut blocks_per_level = Vec::with_capacity(raw.marks.len());
        for ((marks,pointers),offsets) in raw.marks.into_iter().zip(&raw.pointers).zip(&raw.offsets) {
            blocks_per_level.push(marks.len());
            levels.push(Level {
                marks: RankBits::new(marks),
                pointers: IntVec::from_slice(pointers),
                offsets: IntVec::from_slice(offsets)
            });
        }
        let mut char_index = HashMap::new();
        for (i,c) in raw.chars.iter().enumerate() {
            char_index.insert(*c,i);
        }
        let (leaves,compress_map,decompress_map) = compress_leaves(&raw.leaves);
        Ok(Self {
            arity: raw.arity,
            leaf_len: raw.leaf_len,
            input_len: raw.input_len,
            block_sizes: raw.block_sizes,
            blocks_per_level,
            levels,
            leaves,
            leaf_count,
            compress_map,
            decompress_map,
            chars: raw.chars,
            char_index,
            char_ranks: None
        })
    }

    /// length of the indexed text
    pub fn len(&self) -> usize {
        self.input_len
    }
    pub fn is_empty(&self) -> bool {
        self.input_len == 0
    }
    /// number of pointer levels above the leaf layer
    pub fn height(&self) -> usize {
        self.levels.len()
    }
    /// distinct text symbols in first-seen order
    pub fn alphabet(&self) -> &[u8] {
        &self.chars
    }
    /// total symbols held in the leaf layer
    pub fn leaf_symbols(&self) -> usize {
        self.leaf_count * self.leaf_len
    }
    pub fn rank_support(&self) -> bool {
        self.char_ranks.is_some()
    }

    /// The symbol at position `index` of the original text.
    pub fn access(&self,index: usize) -> Result<u8,Error> {
        if index >= self.input_len {
            return Err(Error::OutOfRange);
        }
        let mut block_size = self.block_sizes[0];
        let mut blk = index / block_size;
        let mut off = index % block_size;
        for level in &self.levels {
            if !level.marks.get(blk) {
                let r = level.marks.rank0(blk);
                off += level.offsets.get(r) as usize;
                blk = level.pointers.get(r) as usize;
                if off >= block_size {
                    blk += 1;
                    off -= block_size;
                }
            }
            block_size /= self.arity;
            let child = off / block_size;
            off %= block_size;
            blk = level.marks.rank1(blk) * self.arity + child;
        }
        match &self.leaves {
            Leaves::Dense(data) => {
                Ok(self.decompress_map[data.get(blk * self.leaf_len + off) as usize])
            },
            Leaves::Huffman(coder) => {
                Ok(coder.access(blk * self.leaf_len + off,1)?[0])
            }
        }
    }

    /// Occurrences of `c` in positions `[0, index]`.
    pub fn rank(&self,c: u8,index: usize) -> Result<usize,Error> {
        if index >= self.input_len {
            return Err(Error::OutOfRange);
        }
        let ranks = self.char_ranks.as_ref().ok_or(Error::RankNotBuilt)?;
        let ci = *self.char_index.get(&c).ok_or(Error::UnknownSymbol)?;
        let cr = &ranks[ci];
        let mut block_size = self.block_sizes[0];
        let mut blk = index / block_size;
        let mut off = index % block_size;
        let mut rank: i64 = match blk {
            0 => 0,
            k => cr.blocks[0].get(k - 1) as i64
        };
        for (lvl,level) in self.levels.iter().enumerate() {
            if !level.marks.get(blk) {
                let r = level.marks.rank0(blk);
                rank -= cr.pointers[lvl].get(r) as i64;
                off += level.offsets.get(r) as usize;
                blk = level.pointers.get(r) as usize;
                if off >= block_size {
                    rank += self.block_count(cr,lvl,blk);
                    blk += 1;
                    off -= block_size;
                }
            }
            block_size /= self.arity;
            let child = off / block_size;
            off %= block_size;
            blk = level.marks.rank1(blk) * self.arity + child;
            if lvl + 1 < self.levels.len() && child != 0 {
                rank += cr.blocks[lvl + 1].get(blk - 1) as i64;
            }
        }
        // count the leaf siblings to the left, then the target leaf prefix
        let group_start = blk - blk % self.arity;
        rank += self.count_leaf_range(c,group_start * self.leaf_len,(blk - group_start) * self.leaf_len)? as i64;
        rank += self.count_leaf_range(c,blk * self.leaf_len,off + 1)? as i64;
        Ok(rank as usize)
    }

    /// Position of the `j`-th occurrence of `c`, 1-indexed.
    pub fn select(&self,c: u8,j: usize) -> Result<usize,Error> {
        let ranks = self.char_ranks.as_ref().ok_or(Error::RankNotBuilt)?;
        let ci = *self.char_index.get(&c).ok_or(Error::UnknownSymbol)?;
        if j == 0 || j > self.rank(c,self.input_len - 1)? {
            return Err(Error::OutOfRange);
        }
        let cr = &ranks[ci];
        let top = &cr.blocks[0];
        let mut j = j as i64;
        // smallest top-level block whose cumulative count reaches j
        let mut lo = 0;
        let mut hi = top.len() - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            match (top.get(mid) as i64) < j {
                true => lo = mid + 1,
                false => hi = mid
            }
        }
        let mut blk = lo;
        let mut block_size = self.block_sizes[0] as i64;
        let mut pos: i64 = blk as i64 * block_size - 1;
        if blk > 0 {
            j -= top.get(blk - 1) as i64;
        }
        let level0 = &self.levels[0];
        if !level0.marks.get(blk) {
            let r = level0.marks.rank0(blk);
            let g = level0.offsets.get(r) as i64;
            blk = level0.pointers.get(r) as usize;
            // occurrences in the used part [g, B) of the first source block
            let used = self.block_count(cr,0,blk) - cr.pointers[0].get(r) as i64;
            if used < j {
                j -= used;
                pos += block_size - g;
                blk += 1;
            } else {
                j += cr.pointers[0].get(r) as i64;
                pos -= g;
            }
        }
        for lvl in 1..self.levels.len() {
            blk = self.levels[lvl - 1].marks.rank1(blk) * self.arity;
            block_size /= self.arity as i64;
            let first_sibling = blk;
            while (cr.blocks[lvl].get(blk) as i64) < j {
                blk += 1;
            }
            if blk > first_sibling {
                j -= cr.blocks[lvl].get(blk - 1) as i64;
            }
            pos += (blk - first_sibling) as i64 * block_size;
            let level = &self.levels[lvl];
            if !level.marks.get(blk) {
                let r = level.marks.rank0(blk);
                let g = level.offsets.get(r) as i64;
                blk = level.pointers.get(r) as usize;
                let used = self.block_count(cr,lvl,blk) - cr.pointers[lvl].get(r) as i64;
                if used < j {
                    j -= used;
                    pos += block_size - g;
                    blk += 1;
                } else {
                    j += cr.pointers[lvl].get(r) as i64;
                    pos -= g;
                }
            }
        }
        let group_start = self.levels[self.levels.len() - 1].marks.rank1(blk) * self.arity;
        let window = self.leaf_window(group_start * self.leaf_len,self.arity * self.leaf_len)?;
        let mut l = 0;
        while j > 0 {
            if window[l] == c {
                j -= 1;
            }
            l += 1;
        }
        Ok((pos + l as i64) as usize)
    }

    /// Build the per-symbol rank scaffolding.  Idempotent; `threads = 1`
    /// forces a sequential build, anything larger fans the symbols out over
    /// that many tasks (the per-symbol outputs are disjoint and the tree is
    /// read-only here, so the tasks share nothing mutable).
    pub fn add_rank_support(&mut self,threads: usize) -> Result<(),Error> {
        if self.char_ranks.is_some() {
            return Ok(());
        }
        log::debug!("building rank support for {} symbols on {} threads",self.chars.len(),threads.max(1));
        let this = &*self;
        let mut results: Vec<Result<CharRanks,Error>> = Vec::new();
        for _c in &this.chars {
            results.push(Ok(CharRanks::default()));
        }
        if threads <= 1 || this.chars.len() <= 1 {
            for (slot,c) in results.iter_mut().zip(&this.chars) {
                *slot = this.build_char_ranks(*c);
            }
        } else {
            let chunk = (this.chars.len() + threads - 1) / threads;
            rayon::scope(|scope| {
                for (slots,syms) in results.chunks_mut(chunk).zip(this.chars.chunks(chunk)) {
                    scope.spawn(move |_| {
                        for (slot,c) in slots.iter_mut().zip(syms) {
                            *slot = this.build_char_ranks(*c);
                        }
                    });
                }
            });
        }
        let mut per_char = Vec::with_capacity(results.len());
        for result in results {
            per_char.push(result?);
        }
        self.char_ranks = Some(per_char);
        Ok(())
    }

    /// Swap the dense leaf array for a canonical Huffman stream sampled
    /// every `sample_pos` symbols.  No-op if already applied.
    pub fn huffman_compress_leaves(&mut self,sample_pos: usize) -> Result<(),Error> {
        let data = match &self.leaves {
            Leaves::Dense(data) => data,
            Leaves::Huffman(_) => return Ok(())
        };
        let mut raw = Vec::with_capacity(data.len());
        for i in 0..data.len() {
            raw.push(self.decompress_map[data.get(i) as usize]);
        }
        self.leaves = Leaves::Huffman(HuffmanCoder::new(&raw,sample_pos)?);
        Ok(())
    }

    /// Bytes held by every owned component.
    pub fn space_usage(&self) -> usize {
        let mut total = std::mem::size_of::<usize>() * 4;
        total += self.block_sizes.len() * 8;
        total += self.blocks_per_level.len() * 8;
        for level in &self.levels {
            total += level.marks.size_in_bytes();
            total += level.pointers.size_in_bytes();
            total += level.offsets.size_in_bytes();
        }
        total += match &self.leaves {
            Leaves::Dense(data) => data.size_in_bytes(),
            Leaves::Huffman(coder) => coder.size_in_bytes()
        };
        total += self.compress_map.len() + self.decompress_map.len();
        total += self.chars.len() + self.char_index.len() * 9;
        if let Some(ranks) = &self.char_ranks {
            for cr in ranks {
                for iv in &cr.blocks {
                    total += iv.size_in_bytes();
                }
                for iv in &cr.pointers {
                    total += iv.size_in_bytes();
                }
            }
        }
        total
    }

    /// count of the symbol within block `k` alone, recovered from the
    /// cumulative layout of `blocks[lvl]`
    fn block_count(&self,cr: &CharRanks,lvl: usize,k: usize) -> i64 {
        let total = cr.blocks[lvl].get(k) as i64;
        let first = match lvl {
            0 => k == 0,
            _ => k % self.arity == 0
        };
        match first {
            true => total,
            false => total - cr.blocks[lvl].get(k - 1) as i64
        }
    }

    /// original-text bytes for leaf positions `[start, start + count)`
    fn leaf_window(&self,start: usize,count: usize) -> Result<Vec<u8>,Error> {
        let total = self.leaf_count * self.leaf_len;
        if start >= total {
            return Ok(Vec::new());
        }
        let end = (start + count).min(total);
        match &self.leaves {
            Leaves::Dense(data) => {
                Ok((start..end).map(|i| self.decompress_map[data.get(i) as usize]).collect())
            },
            Leaves::Huffman(coder) => coder.access(start,end - start)
        }
    }

    /// occurrences of `c` among leaf positions `[start, start + count)`
    fn count_leaf_range(&self,c: u8,start: usize,count: usize) -> Result<usize,Error> {
        let total = self.leaf_count * self.leaf_len;
        if start >= total || count == 0 {
            return Ok(0);
        }
        let end = (start + count).min(total);
        match &self.leaves {
            Leaves::Dense(data) => {
                let id = self.compress_map[c as usize] as u64;
                Ok((start..end).filter(|i| data.get(*i) == id).count())
            },
            Leaves::Huffman(coder) => {
                Ok(coder.access(start,end - start)?.iter().filter(|b| **b == c).count())
            }
        }
    }

    fn build_char_ranks(&self,c: u8) -> Result<CharRanks,Error> {
        let mut blocks: Vec<Vec<u64>> = self.levels.iter().map(|l| vec![0;l.marks.len()]).collect();
        let mut pointers: Vec<Vec<u64>> = self.levels.iter().map(|l| vec![0;l.marks.count_zeros()]).collect();
        for k in 0..self.blocks_per_level[0] {
            self.rank_block(c,0,k,&mut blocks,&mut pointers)?;
        }
        // top level becomes a plain prefix sum, the binary search in select
        // depends on it
        for k in 1..blocks[0].len() {
            let prev = blocks[0][k-1];
            blocks[0][k] += prev;
        }
        // deeper levels accumulate within each run of `arity` siblings
        for lvl_counts in blocks.iter_mut().skip(1) {
            let mut acc = 0;
            let mut counter = self.arity;
            for count in lvl_counts.iter_mut() {
                let own = *count;
                *count += acc;
                acc += own;
                counter -= 1;
                if counter == 0 {
                    acc = 0;
                    counter = self.arity;
                }
            }
        }
        Ok(CharRanks {
            blocks: blocks.iter().map(|v| IntVec::from_slice(v)).collect(),
            pointers: pointers.iter().map(|v| IntVec::from_slice(v)).collect()
        })
    }

    /// Raw count of `c` in block `k` of level `lvl`, filling `blocks` and
    /// `pointers` along the way.  Blocks are visited left to right within
    /// every level, so a back-pointer's source entries are already final
    /// when it reads them.
    fn rank_block(&self,c: u8,lvl: usize,k: usize,blocks: &mut Vec<Vec<u64>>,pointers: &mut Vec<Vec<u64>>) -> Result<u64,Error> {
        if k >= self.blocks_per_level[lvl] {
            return Ok(0);
        }
        let level = &self.levels[lvl];
        let mut count = 0;
        if level.marks.get(k) {
            let first_child = level.marks.rank1(k) * self.arity;
            if lvl + 1 < self.levels.len() {
                for t in 0..self.arity {
                    count += self.rank_block(c,lvl + 1,first_child + t,blocks,pointers)?;
                }
            } else {
                for t in 0..self.arity {
                    count += self.count_leaf_range(c,(first_child + t) * self.leaf_len,self.leaf_len)? as u64;
                }
            }
        } else {
            let r = level.marks.rank0(k);
            let ptr = level.pointers.get(r) as usize;
            let g = level.offsets.get(r) as usize;
            count = blocks[lvl][ptr];
            let mut unused = 0;
            if g > 0 {
                unused = self.part_rank_block(c,lvl,ptr,g,blocks,pointers)?;
                let extension = self.part_rank_block(c,lvl,ptr + 1,g,blocks,pointers)?;
                count = count - unused + extension;
            }
            pointers[lvl][r] = unused;
        }
        blocks[lvl][k] = count;
        Ok(count)
    }

    /// count of `c` in the first `g` positions of block `k` at level `lvl`
    fn part_rank_block(&self,c: u8,lvl: usize,k: usize,g: usize,blocks: &mut Vec<Vec<u64>>,pointers: &mut Vec<Vec<u64>>) -> Result<u64,Error> {
        if k >= self.blocks_per_level[lvl] {
            return Ok(0);
        }
        let level = &self.levels[lvl];
        let mut count = 0;
        if level.marks.get(k) {
            let first_child = level.marks.rank1(k) * self.arity;
            if lvl + 1 < self.levels.len() {
                let child_size = self.block_sizes[lvl + 1];
                let mut t = 0;
                let mut covered = 0;
                while t < self.arity && covered + child_size <= g {
                    count += blocks[lvl + 1][first_child + t];
                    covered += child_size;
                    t += 1;
                }
                if covered != g {
                    count += self.part_rank_block(c,lvl + 1,first_child + t,g - covered,blocks,pointers)?;
                }
            } else {
                let mut t = 0;
                let mut covered = 0;
                while t < self.arity && covered + self.leaf_len <= g {
                    count += self.count_leaf_range(c,(first_child + t) * self.leaf_len,self.leaf_len)? as u64;
                    covered += self.leaf_len;
                    t += 1;
                }
                if covered != g {
                    count += self.count_leaf_range(c,(first_child + t) * self.leaf_len,g % self.leaf_len)? as u64;
                }
            }
        } else {
            let r = level.marks.rank0(k);
            let ptr = level.pointers.get(r) as usize;
            let off = level.offsets.get(r) as usize;
            let block_size = self.block_sizes[lvl];
            if g + off >= block_size {
                count += blocks[lvl][ptr] - pointers[lvl][r];
                count += self.part_rank_block(c,lvl,ptr + 1,g + off - block_size,blocks,pointers)?;
            } else {
                count += self.part_rank_block(c,lvl,ptr,g + off,blocks,pointers)?;
                count -= pointers[lvl][r];
            }
        }
        Ok(count)
    }
}

/// dense remap: ids assigned to present bytes in increasing byte order
fn compress_leaves(raw: &[u8]) -> (Leaves,Vec<u8>,Vec<u8>) {
    let mut present = [false;256];
    for b in raw {
        present[*b as usize] = true;
    }
    let mut compress_map = vec![0u8;256];
    let mut decompress_map = vec![0u8;256];
    let mut sigma: usize = 0;
    for (byte,seen) in present.iter().enumerate() {
        if *seen {
            compress_map[byte] = sigma as u8;
            decompress_map[sigma] = byte as u8;
            sigma += 1;
        }
    }
    let width = bits_for(sigma.saturating_sub(1) as u64);
    let mut data = IntVec::new(width);
    for b in raw {
        data.push(compress_map[*b as usize] as u64);
    }
    (Leaves::Dense(data),compress_map,decompress_map)
}

/// structural checks on a builder's output, `InvariantViolated` on any miss
fn validate(raw: &RawTree) -> Result<(),Error> {
    if raw.arity < 2 || raw.leaf_len < 1 || raw.top_blocks < 1 || raw.input_len == 0 {
        return Err(Error::InvariantViolated);
    }
    if raw.marks.is_empty()
        || raw.marks.len() != raw.block_sizes.len()
        || raw.pointers.len() != raw.marks.len()
        || raw.offsets.len() != raw.marks.len()
        || raw.leaves.len() % raw.leaf_len != 0 {
        return Err(Error::InvariantViolated);
    }
    if raw.marks[0].len() != raw.top_blocks
        || raw.input_len > raw.top_blocks * raw.block_sizes[0]
        || raw.block_sizes[raw.block_sizes.len() - 1] != raw.leaf_len * raw.arity {
        return Err(Error::InvariantViolated);
    }
    for (lvl,marks) in raw.marks.iter().enumerate() {
        if lvl + 1 < raw.block_sizes.len() && raw.block_sizes[lvl] != raw.block_sizes[lvl + 1] * raw.arity {
            return Err(Error::InvariantViolated);
        }
        let internal = marks.iter().filter(|m| *m).count();
        let expansion = internal * raw.arity;
        let children = match lvl + 1 < raw.marks.len() {
            true => raw.marks[lvl + 1].len(),
            false => raw.leaves.len() / raw.leaf_len
        };
        if expansion != children {
            return Err(Error::InvariantViolated);
        }
        if raw.pointers[lvl].len() != marks.len() - internal || raw.offsets[lvl].len() != marks.len() - internal {
            return Err(Error::InvariantViolated);
        }
        let mut r = 0;
        for (k,mark) in marks.iter().enumerate() {
            if mark {
                continue;
            }
            let ptr = raw.pointers[lvl][r];
            let g = raw.offsets[lvl][r];
            r += 1;
            // sources lie strictly earlier, are themselves internal, and a
            // nonzero offset needs a successor source block to spill into
            if g >= raw.block_sizes[lvl] || ptr >= k || marks.get(ptr) != Some(true) {
                return Err(Error::InvariantViolated);
            }
            if g > 0 && (ptr + 1 >= k || marks.get(ptr + 1) != Some(true)) {
                return Err(Error::InvariantViolated);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
fn sample_tree(text: &[u8],arity: usize,leaf_len: usize) -> BlockTree {
    crate::build::build(text,&crate::build::Params { arity, leaf_len, top_blocks: 1 }).expect("build failed")
}

#[test]
fn small_periodic_text() {
    let text = "aabbaabb".as_bytes();
    let mut tree = sample_tree(text,2,2);
    assert_eq!(tree.access(0).expect("access failed"),b'a');
    assert_eq!(tree.access(5).expect("access failed"),b'a');
    assert_eq!(tree.access(7).expect("access failed"),b'b');
    tree.add_rank_support(1).expect("rank build failed");
    assert_eq!(tree.rank(b'a',7).expect("rank failed"),4);
    assert_eq!(tree.rank(b'b',7).expect("rank failed"),4);
    assert_eq!(tree.rank(b'a',3).expect("rank failed"),2);
    assert_eq!(tree.select(b'b',3).expect("select failed"),6);
    assert_eq!(tree.select(b'a',1).expect("select failed"),0);
}

#[test]
fn mississippi() {
    let text = "mississippi".as_bytes();
    let mut tree = sample_tree(text,2,2);
    assert_eq!(tree.access(4).expect("access failed"),b'i');
    tree.add_rank_support(1).expect("rank build failed");
    assert_eq!(tree.rank(b's',10).expect("rank failed"),4);
    assert_eq!(tree.select(b's',2).expect("select failed"),3);
    assert_eq!(tree.select(b'i',4).expect("select failed"),10);
}

#[test]
fn access_fidelity() {
    for text in ["mississippi".as_bytes(),"aabbaabb".as_bytes(),"abracadabra, abracadabra!".as_bytes()] {
        let tree = sample_tree(text,2,2);
        for (i,b) in text.iter().enumerate() {
            assert_eq!(tree.access(i).expect("access failed"),*b);
        }
    }
}

#[test]
fn rank_count_agreement() {
    let text = "how much wood would a woodchuck chuck if a woodchuck could chuck wood".as_bytes();
    let mut tree = sample_tree(text,2,4);
    tree.add_rank_support(1).expect("rank build failed");
    for c in tree.alphabet().to_vec() {
        let mut count = 0;
        for (i,b) in text.iter().enumerate() {
            if *b == c {
                count += 1;
            }
            assert_eq!(tree.rank(c,i).expect("rank failed"),count);
        }
    }
}

#[test]
fn select_rank_duality() {
    let text = "how much wood would a woodchuck chuck if a woodchuck could chuck wood".as_bytes();
    let mut tree = sample_tree(text,2,4);
    tree.add_rank_support(1).expect("rank build failed");
    for c in tree.alphabet().to_vec() {
        let total = tree.rank(c,text.len() - 1).expect("rank failed");
        for j in 1..=total {
            let pos = tree.select(c,j).expect("select failed");
            assert_eq!(tree.rank(c,pos).expect("rank failed"),j);
            assert_eq!(text[pos],c);
        }
        for (i,b) in text.iter().enumerate() {
            let r = tree.rank(c,i).expect("rank failed");
            if r > 0 {
                let pos = tree.select(c,r).expect("select failed");
                assert!(pos <= i);
                assert_eq!(pos == i,*b == c);
            }
        }
    }
}

#[test]
fn uniform_text_collapses() {
    let mut tree = sample_tree(&[b'A';256],4,4);
    tree.add_rank_support(1).expect("rank build failed");
    assert_eq!(tree.rank(b'A',255).expect("rank failed"),256);
    assert_eq!(tree.select(b'A',128).expect("select failed"),127);
    for level in &tree.levels {
        assert!(level.marks.count_ones() <= 1);
    }
    // space stays far below the text on a highly repetitive input
    let big = sample_tree(&[b'A';65536],4,4);
    assert_eq!(big.access(65535).expect("access failed"),b'A');
    assert!(big.space_usage() < 65536 / 4);
}

#[test]
fn huffman_leaves_preserve_queries() {
    let text = "mississippi".as_bytes();
    let mut plain = sample_tree(text,2,2);
    plain.add_rank_support(1).expect("rank build failed");
    let mut packed = sample_tree(text,2,2);
    packed.huffman_compress_leaves(2).expect("huffman packing failed");
    // rank support built after the leaves were packed
    packed.add_rank_support(1).expect("rank build failed");
    for i in 0..text.len() {
        assert_eq!(packed.access(i).expect("access failed"),plain.access(i).expect("access failed"));
    }
    assert_eq!(packed.rank(b's',10).expect("rank failed"),4);
    assert_eq!(packed.select(b'i',4).expect("select failed"),10);
    // a second application is a no-op
    packed.huffman_compress_leaves(2).expect("huffman packing failed");
    assert_eq!(packed.access(4).expect("access failed"),b'i');
}

#[test]
fn rank_augmentation_totals() {
    let text = "the quick brown fox jumps over the lazy dog".as_bytes();
    let mut tree = sample_tree(text,2,2);
    tree.add_rank_support(1).expect("rank build failed");
    let ranks = tree.char_ranks.as_ref().expect("rank support missing");
    for (ci,c) in tree.chars.iter().enumerate() {
        let naive = text.iter().filter(|b| *b == c).count() as u64;
        let top = &ranks[ci].blocks[0];
        assert_eq!(top.get(top.len() - 1),naive);
    }
}

#[test]
fn parallel_build_matches_sequential() {
    let text = "peter piper picked a peck of pickled peppers".as_bytes();
    let mut seq = sample_tree(text,2,2);
    seq.add_rank_support(1).expect("rank build failed");
    let mut par = sample_tree(text,2,2);
    par.add_rank_support(4).expect("rank build failed");
    // and building twice is a no-op
    par.add_rank_support(4).expect("rank build failed");
    for c in seq.alphabet().to_vec() {
        for i in 0..text.len() {
            assert_eq!(seq.rank(c,i).expect("rank failed"),par.rank(c,i).expect("rank failed"));
        }
    }
}

#[test]
fn query_failures() {
    let text = "mississippi".as_bytes();
    let mut tree = sample_tree(text,2,2);
    match tree.access(11) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
    match tree.rank(b's',3) {
        Err(Error::RankNotBuilt) => {},
        _ => panic!("expected RankNotBuilt")
    }
    tree.add_rank_support(1).expect("rank build failed");
    match tree.rank(b'z',3) {
        Err(Error::UnknownSymbol) => {},
        _ => panic!("expected UnknownSymbol")
    }
    match tree.select(b's',0) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
    match tree.select(b's',5) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
    match tree.rank(b's',11) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
}

#[test]
fn rejects_forward_pointer() {
    let valid = || RawTree {
        arity: 2,
        leaf_len: 1,
        top_blocks: 1,
        input_len: 4,
        block_sizes: vec![4,2],
        marks: vec![BitVec::from_fn(1,|_| true),BitVec::from_fn(2,|k| k == 0)],
        pointers: vec![Vec::new(),vec![0]],
        offsets: vec![Vec::new(),vec![0]],
        leaves: "ab".as_bytes().to_vec(),
        chars: vec![b'a',b'b']
    };
    let tree = BlockTree::from_raw(valid()).expect("raw tree was rejected");
    assert_eq!(tree.access(2).expect("access failed"),b'a');
    let mut forward = valid();
    forward.pointers[1][0] = 1;
    match BlockTree::from_raw(forward) {
        Err(Error::InvariantViolated) => {},
        _ => panic!("expected InvariantViolated")
    }
    let mut dangling = valid();
    dangling.offsets[1][0] = 1;
    match BlockTree::from_raw(dangling) {
        Err(Error::InvariantViolated) => {},
        _ => panic!("expected InvariantViolated")
    }
}

#[cfg(test)]
fn check_queries(text: &[u8],arity: usize,leaf_len: usize,queries: usize,seed: u64) {
    use rand::{Rng,SeedableRng};
    let mut positions: Vec<Vec<usize>> = vec![Vec::new();256];
    for (i,b) in text.iter().enumerate() {
        positions[*b as usize].push(i);
    }
    let mut tree = sample_tree(text,arity,leaf_len);
    tree.add_rank_support(4).expect("rank build failed");
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    for _q in 0..queries {
        let i = rng.gen_range(0..text.len());
        assert_eq!(tree.access(i).expect("access failed"),text[i]);
        let c = text[rng.gen_range(0..text.len())];
        let expected = positions[c as usize].partition_point(|p| *p <= i);
        assert_eq!(tree.rank(c,i).expect("rank failed"),expected);
        let j = rng.gen_range(1..=positions[c as usize].len());
        let pos = tree.select(c,j).expect("select failed");
        assert_eq!(pos,positions[c as usize][j - 1]);
        assert_eq!(tree.rank(c,pos).expect("rank failed"),j);
    }
}

#[test]
fn randomized_queries() {
    use rand::{Rng,SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xb10c);
    let text: Vec<u8> = (0..65536).map(|_i| rng.gen::<u8>()).collect();
    for (arity,leaf_len) in [(2,4),(4,8),(8,16)] {
        check_queries(&text,arity,leaf_len,10000,0x5eed ^ arity as u64);
    }
}

#[test]
fn repetitive_queries() {
    use rand::{Rng,SeedableRng};
    // a mutated repeat: long stretches match earlier text at odd alignments,
    // which is what exercises the back-pointer paths
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x9e97);
    let seed_block: Vec<u8> = (0..2048).map(|_i| b'a' + rng.gen_range(0..4)).collect();
    let mut text = Vec::with_capacity(65536);
    while text.len() < 65536 {
        text.extend_from_slice(&seed_block);
        let at = text.len() - rng.gen_range(1..2048);
        text[at] = b'a' + rng.gen_range(0..4);
    }
    text.truncate(65536);
    for (arity,leaf_len) in [(2,4),(4,8)] {
        check_queries(&text,arity,leaf_len,10000,0x7e57 ^ arity as u64);
    }
}
