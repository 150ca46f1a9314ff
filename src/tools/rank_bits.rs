//! Bitvector with a constant-time rank directory
use bit_vec::BitVec;

/// A fixed bitvector together with cumulative popcounts taken at every
/// storage word.  `rank1(i)` counts set bits in `[0, i)` with one table
/// lookup and one masked popcount; `rank0` is its complement.  Select is
/// not provided, the tree navigation never needs it.
pub struct RankBits {
    bits: BitVec,
    cum: Vec<u32>
}

impl RankBits {
    pub fn new(bits: BitVec) -> Self {
        let mut cum = Vec::with_capacity(bits.storage().len() + 1);
        let mut acc: u32 = 0;
        for word in bits.storage() {
            cum.push(acc);
            acc += word.count_ones();
        }
        cum.push(acc);
        Self { bits, cum }
    }
    pub fn len(&self) -> usize {
        self.bits.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
    /// read bit `idx`, false when out of range
    pub fn get(&self,idx: usize) -> bool {
        self.bits.get(idx) == Some(true)
    }
    /// number of set bits in positions `[0, i)`
    pub fn rank1(&self,i: usize) -> usize {
        let i = i.min(self.bits.len());
        let word = i / 32;
        let rem = i % 32;
        let mut count = self.cum[word] as usize;
        if rem > 0 {
            count += (self.bits.storage()[word] & ((1u32 << rem) - 1)).count_ones() as usize;
        }
        count
    }
    /// number of unset bits in positions `[0, i)`
    pub fn rank0(&self,i: usize) -> usize {
        i.min(self.bits.len()) - self.rank1(i)
    }
    pub fn count_ones(&self) -> usize {
        self.cum[self.cum.len()-1] as usize
    }
    pub fn count_zeros(&self) -> usize {
        self.bits.len() - self.count_ones()
    }
    pub fn size_in_bytes(&self) -> usize {
        self.bits.storage().len() * 4 + self.cum.len() * 4
    }
}

#[test]
fn rank_matches_naive() {
    let mut bits = BitVec::from_elem(200,false);
    for i in 0..200 {
        if i % 3 == 0 || i % 7 == 0 {
            bits.set(i,true);
        }
    }
    let naive: Vec<usize> = (0..=200).map(|i| (0..i).filter(|k| k % 3 == 0 || k % 7 == 0).count()).collect();
    let rb = RankBits::new(bits);
    for i in 0..=200 {
        assert_eq!(rb.rank1(i),naive[i]);
        assert_eq!(rb.rank0(i),i - naive[i]);
    }
}

#[test]
fn rank_at_word_boundaries() {
    let mut bits = BitVec::from_elem(96,false);
    for i in 0..96 {
        bits.set(i,i % 2 == 0);
    }
    let rb = RankBits::new(bits);
    assert_eq!(rb.rank1(32),16);
    assert_eq!(rb.rank1(64),32);
    assert_eq!(rb.rank1(96),48);
    assert_eq!(rb.rank0(96),48);
    assert_eq!(rb.count_ones(),48);
}

#[test]
fn all_zeros() {
    let rb = RankBits::new(BitVec::from_elem(40,false));
    assert_eq!(rb.rank1(40),0);
    assert_eq!(rb.rank0(17),17);
    assert_eq!(rb.count_zeros(),40);
}
