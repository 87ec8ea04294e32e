use std::fmt::{self, Debug, Formatter};

type BitBlock = u64;

const BLOCK_NBITS: usize = std::mem::size_of::<BitBlock>() * 8;

/// Fixed-width set of symbol codes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
  slice: Box<[BitBlock]>,
}

impl BitSet {
  pub fn new(num_bits: usize) -> Self {
    let len = (num_bits + BLOCK_NBITS - 1) / BLOCK_NBITS;
    Self {
      slice: vec![0; len].into_boxed_slice(),
    }
  }

  #[cfg(test)]
  pub fn from_bit(num_bits: usize, bit: usize) -> Self {
    let mut s = Self::new(num_bits);
    s.insert(bit);
    s
  }

  /// Returns whether the bit was newly set.
  pub fn insert(&mut self, bit: usize) -> bool {
    let block = &mut self.slice[bit / BLOCK_NBITS];
    let mask = 1 << (bit % BLOCK_NBITS);
    let changed = *block & mask == 0;
    *block |= mask;
    changed
  }

  #[cfg(test)]
  pub fn contains(&self, bit: usize) -> bool {
    self.slice[bit / BLOCK_NBITS] & (1 << (bit % BLOCK_NBITS)) != 0
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.slice.iter().all(|&x| x == 0)
  }

  /// Returns whether the set has changed.
  pub fn union_with(&mut self, other: &BitSet) -> bool {
    let mut changed = false;
    for (block, &bits) in self.slice.iter_mut().zip(other.slice.iter()) {
      changed |= bits & !*block != 0;
      *block |= bits;
    }
    changed
  }

  /// Set bits, in increasing order.
  pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    self.slice.iter()
      .enumerate()
      .flat_map(|(i, &block)| Bits { block, base: i * BLOCK_NBITS })
  }
}

/// `sets[dst] |= sets[src]`, returning whether `sets[dst]` changed.
pub fn union_at(sets: &mut [BitSet], dst: usize, src: usize) -> bool {
  if dst == src {
    return false;
  }
  if dst < src {
    let (lo, hi) = sets.split_at_mut(src);
    lo[dst].union_with(&hi[0])
  } else {
    let (lo, hi) = sets.split_at_mut(dst);
    hi[0].union_with(&lo[src])
  }
}

/// Bits of one block, lowest first.
struct Bits {
  block: BitBlock,
  base: usize,
}

impl Iterator for Bits {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    if self.block == 0 {
      return None;
    }
    let bit = self.block.trailing_zeros() as usize;
    self.block &= self.block - 1;
    Some(self.base + bit)
  }
}

impl Debug for BitSet {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}
