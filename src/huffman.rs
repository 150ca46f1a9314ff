//! Canonical Huffman coding over a byte alphabet
//!
//! This is the optional second compression stage for the leaf layer of the
//! block tree.  Codeword lengths come from the usual node-merge construction,
//! run on an arena of nodes fed by a min-heap; the codewords themselves are
//! assigned canonically (symbols ordered by length, then value) so only the
//! lengths matter for decoding.  Decoding is table driven: every possible
//! prefix of `max_code_length` bits maps directly to a symbol and its code
//! length, giving O(1) decode per symbol at the cost of a table exponential
//! in the longest code.
//!
//! The packed stream is a sequence of 64-bit words filled most significant
//! bit first.  When `sample_pos > 0`, the absolute bit offset of every
//! `sample_pos`-th symbol is recorded so a decode can start near any symbol
//! index without scanning from the front.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use crate::Error;

#[derive(Clone,Copy,Default)]
struct CodeWord {
    /// codeword aligned to the most significant bit
    word: u64,
    len: u8
}

#[derive(Clone,Copy,Default)]
struct DecodeEntry {
    symbol: u8,
    len: u8
}

/// transient node-merge arena, only the shape matters
struct Node {
    symbol: u8,
    children: Option<(usize,usize)>
}

pub struct HuffmanCoder {
    max_code_length: u8,
    bit_size: usize,
    bits: Vec<u64>,
    sample_pos: usize,
    samples: Vec<usize>,
    encode_table: Vec<CodeWord>,
    decode_table: Vec<DecodeEntry>
}

impl HuffmanCoder {
    /// Build the code over `text` and pack the whole of it.
    /// `sample_pos = 0` disables sampling, and with it `access`.
    pub fn new(text: &[u8],sample_pos: usize) -> Result<Self,Error> {
        let mut ans = Self {
            max_code_length: 0,
            bit_size: 0,
            bits: Vec::new(),
            sample_pos,
            samples: Vec::new(),
            encode_table: vec![CodeWord::default();256],
            decode_table: Vec::new()
        };
        if text.is_empty() {
            return Ok(ans);
        }
        let mut freqs = [0u64;256];
        for b in text {
            freqs[*b as usize] += 1;
        }
        let lengths = code_lengths(&freqs)?;
        ans.build_tables(&lengths)?;
        ans.pack(text);
        Ok(ans)
    }
    /// derive canonical codewords from the lengths and fill both tables
    fn build_tables(&mut self,lengths: &[u8;256]) -> Result<(),Error> {
        let max_len = *lengths.iter().max().unwrap_or(&0);
        if max_len > 64 {
            return Err(Error::AlphabetTooLarge);
        }
        let table_size = match 1usize.checked_shl(max_len as u32) {
            Some(size) => size,
            None => return Err(Error::AlphabetTooLarge)
        };
        self.max_code_length = max_len;
        self.decode_table = vec![DecodeEntry::default();table_size];
        // canonical order: shorter codes first, ties by symbol value
        let mut ordered: Vec<(u8,u8)> = Vec::new();
        for (sym,len) in lengths.iter().enumerate() {
            if *len > 0 {
                ordered.push((*len,sym as u8));
            }
        }
        ordered.sort_unstable();
        let mut code: u64 = 0;
        let mut prev_len: u8 = 0;
        for (len,sym) in ordered {
            code <<= len - prev_len;
            self.encode_table[sym as usize] = CodeWord {
                word: code << (64 - len),
                len
            };
            let lo = (code << (max_len - len)) as usize;
            for entry in &mut self.decode_table[lo..lo + (1usize << (max_len - len))] {
                *entry = DecodeEntry { symbol: sym, len };
            }
            code += 1;
            prev_len = len;
        }
        Ok(())
    }
    /// write the whole text as one MSB-first word stream, sampling as we go
    fn pack(&mut self,text: &[u8]) {
        self.bits.push(0);
        let mut cur = 0;
        let mut off = 0;
        for (i,b) in text.iter().enumerate() {
            if self.sample_pos > 0 && i % self.sample_pos == 0 {
                self.samples.push(cur * 64 + off);
            }
            if off == 64 {
                self.bits.push(0);
                cur += 1;
                off = 0;
            }
            let cw = self.encode_table[*b as usize];
            self.bits[cur] |= cw.word >> off;
            let room = 64 - off;
            if (cw.len as usize) > room {
                self.bits.push(0);
                cur += 1;
                // room is at least 1 here, the shift is in range
                self.bits[cur] |= cw.word << room;
                off = cw.len as usize - room;
            } else {
                off += cw.len as usize;
            }
        }
        self.bit_size = cur * 64 + off;
    }
    /// Decode `n_syms` symbols starting at an absolute bit position.
    pub fn decode(&self,start_bit: usize,n_syms: usize) -> Result<Vec<u8>,Error> {
        if start_bit >= self.bit_size {
            return Err(Error::OutOfRange);
        }
        let mut decoded = Vec::with_capacity(n_syms);
        let mut block = start_bit / 64;
        let mut off = start_bit % 64;
        let shift = 64 - self.max_code_length as usize;
        for _i in 0..n_syms {
            if block * 64 + off >= self.bit_size {
                return Err(Error::OutOfRange);
            }
            let mut window = self.bits[block] << off;
            // shifting by the full word width is not defined, skip when aligned
            if off != 0 {
                let next = match block + 1 < self.bits.len() {
                    true => self.bits[block+1],
                    false => 0
                };
                window |= next >> (64 - off);
            }
            let entry = self.decode_table[(window >> shift) as usize];
            decoded.push(entry.symbol);
            off += entry.len as usize;
            if off >= 64 {
                block += 1;
                off -= 64;
            }
        }
        Ok(decoded)
    }
    /// Decode `n_syms` symbols starting at symbol index `start_sym`,
    /// entering the stream at the nearest earlier sample.
    pub fn access(&self,start_sym: usize,n_syms: usize) -> Result<Vec<u8>,Error> {
        if self.sample_pos == 0 {
            return Err(Error::NotSampled);
        }
        let nearest = start_sym / self.sample_pos;
        if nearest >= self.samples.len() {
            return Err(Error::OutOfRange);
        }
        let skip = start_sym % self.sample_pos;
        let mut decoded = self.decode(self.samples[nearest],n_syms + skip)?;
        Ok(decoded.split_off(skip))
    }
    pub fn bit_size(&self) -> usize {
        self.bit_size
    }
    pub fn max_code_length(&self) -> u8 {
        self.max_code_length
    }
    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<u8>() + std::mem::size_of::<usize>() * 2
            + self.bits.len() * 8
            + self.samples.len() * 8
            + self.encode_table.len() * std::mem::size_of::<CodeWord>()
            + self.decode_table.len() * std::mem::size_of::<DecodeEntry>()
    }
}

/// Codeword lengths via the node-merge tree.  The heap is keyed on
/// (frequency, insertion order) so ties resolve the same way every run.
fn code_lengths(freqs: &[u64;256]) -> Result<[u8;256],Error> {
    let mut arena: Vec<Node> = Vec::new();
    // the arena index doubles as the insertion order
    let mut heap: BinaryHeap<Reverse<(u64,usize)>> = BinaryHeap::new();
    for (sym,occs) in freqs.iter().enumerate() {
        if *occs > 0 {
            arena.push(Node { symbol: sym as u8, children: None });
            heap.push(Reverse((*occs,arena.len() - 1)));
        }
    }
    while heap.len() > 1 {
        let Reverse((occs1,left)) = heap.pop().unwrap();
        let Reverse((occs2,right)) = heap.pop().unwrap();
        arena.push(Node { symbol: 0, children: Some((left,right)) });
        heap.push(Reverse((occs1 + occs2,arena.len() - 1)));
    }
    let mut lengths = [0u8;256];
    if let Some(Reverse((_,root))) = heap.pop() {
        let mut stack: Vec<(usize,u32)> = vec![(root,0)];
        while let Some((idx,depth)) = stack.pop() {
            match arena[idx].children {
                Some((left,right)) => {
                    stack.push((left,depth + 1));
                    stack.push((right,depth + 1));
                },
                None => {
                    if depth > 64 {
                        return Err(Error::AlphabetTooLarge);
                    }
                    // a lone symbol still gets a 1-bit code
                    lengths[arena[idx].symbol as usize] = depth.max(1) as u8;
                }
            }
        }
    }
    Ok(lengths)
}

#[test]
fn canonical_codes() {
    // freqs a=4 b=2 c=1 give lengths a=1, b=2, c=2, hence the canonical
    // stream 0 0 0 0 10 10 11, packed MSB first
    let coder = HuffmanCoder::new("aaaabbc".as_bytes(),0).expect("build failed");
    assert_eq!(coder.max_code_length(),2);
    assert_eq!(coder.bit_size(),10);
    let packed = coder.bits[0].to_be_bytes();
    assert_eq!(packed[0..2].to_vec(),hex::decode("0ac0").unwrap());
}

#[test]
fn decoding() {
    let coder = HuffmanCoder::new("aaaabbc".as_bytes(),2).expect("build failed");
    assert_eq!(coder.decode(0,7).expect("decode failed"),"aaaabbc".as_bytes());
    // starting one symbol in
    assert_eq!(coder.decode(1,6).expect("decode failed"),"aaabbc".as_bytes());
}

#[test]
fn sampled_access() {
    let coder = HuffmanCoder::new("aaaabbc".as_bytes(),2).expect("build failed");
    assert_eq!(coder.access(3,2).expect("access failed"),"ab".as_bytes());
    assert_eq!(coder.access(0,7).expect("access failed"),"aaaabbc".as_bytes());
    assert_eq!(coder.access(6,1).expect("access failed"),"c".as_bytes());
}

#[test]
fn access_requires_samples() {
    let coder = HuffmanCoder::new("aaaabbc".as_bytes(),0).expect("build failed");
    match coder.access(3,2) {
        Err(Error::NotSampled) => {},
        _ => panic!("expected NotSampled")
    }
}

#[test]
fn decode_bounds() {
    let coder = HuffmanCoder::new("aaaabbc".as_bytes(),2).expect("build failed");
    match coder.decode(10,1) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
    match coder.decode(9,2) {
        Err(Error::OutOfRange) => {},
        _ => panic!("expected OutOfRange")
    }
}

#[test]
fn single_symbol_alphabet() {
    let coder = HuffmanCoder::new(&[b'z';40],8).expect("build failed");
    assert_eq!(coder.max_code_length(),1);
    assert_eq!(coder.bit_size(),40);
    assert_eq!(coder.decode(0,40).expect("decode failed"),vec![b'z';40]);
    assert_eq!(coder.access(17,3).expect("access failed"),vec![b'z';3]);
}

#[test]
fn long_words_roundtrip() {
    // enough symbols that codewords straddle many word boundaries
    let text: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 23) as u8).collect();
    let coder = HuffmanCoder::new(&text,16).expect("build failed");
    assert_eq!(coder.decode(0,text.len()).expect("decode failed"),text);
    for start in [0,1,15,16,17,100,2999] {
        let take = (text.len() - start).min(40);
        assert_eq!(coder.access(start,take).expect("access failed"),text[start..start+take].to_vec());
    }
}
