// Fixed-length k-mers packed 2 bits per nucleotide into a u64.
// The length k is a property of the index/graph that owns them, so every
// operation that depends on it takes k explicitly.

use std::fmt;

/// Longest k-mer that fits a u64 with an odd length.
pub const MAX_K: usize = 31;

/// Maps ASCII to 2-bit codes: A=0, C=1, G=2, T/U=3, anything else 4.
pub static NT4_TABLE: &[u8] = &[
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 0, 4, 1, 4, 4, 4, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 0, 4, 1, 4, 4, 4, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
];

pub const NUCLS: &[u8; 4] = b"ACGT";

#[inline]
pub fn encode(c: u8) -> Option<u8> {
    let code = NT4_TABLE[c as usize];
    if code < 4 { Some(code) } else { None }
}

#[inline]
pub fn decode(code: u8) -> u8 {
    NUCLS[(code & 3) as usize]
}

#[inline]
pub fn complement(code: u8) -> u8 {
    3 - code
}

/// Reverses a 4-bit extension mask through complementation: bit b moves to bit 3-b.
#[inline]
pub fn complement_mask(mask: u8) -> u8 {
    ((mask & 1) << 3) | ((mask & 2) << 1) | ((mask & 4) >> 1) | ((mask & 8) >> 3)
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Kmer {
    bits: u64,
}

impl Kmer {
    #[inline]
    fn mask(k: usize) -> u64 {
        if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 }
    }

    /// Packs `seq` into a k-mer of length `seq.len()`; None on any non-ACGT symbol.
    pub fn from_bytes(seq: &[u8]) -> Option<Kmer> {
        debug_assert!(seq.len() <= 32);
        let mut bits = 0u64;
        for &c in seq {
            bits = (bits << 2) | encode(c)? as u64;
        }
        Some(Kmer { bits })
    }

    /// Code of the nucleotide at position `i` (0 is the leftmost).
    #[inline]
    pub fn get(&self, i: usize, k: usize) -> u8 {
        ((self.bits >> (2 * (k - 1 - i))) & 3) as u8
    }

    #[inline]
    pub fn first(&self, k: usize) -> u8 {
        self.get(0, k)
    }

    #[inline]
    pub fn last(&self) -> u8 {
        (self.bits & 3) as u8
    }

    /// Shifts left and appends `code` on the right.
    #[inline]
    pub fn push_back(&self, code: u8, k: usize) -> Kmer {
        Kmer { bits: ((self.bits << 2) | code as u64) & Kmer::mask(k) }
    }

    /// Shifts right and prepends `code` on the left.
    #[inline]
    pub fn push_front(&self, code: u8, k: usize) -> Kmer {
        Kmer { bits: (self.bits >> 2) | ((code as u64) << (2 * (k - 1))) }
    }

    pub fn reverse_complement(&self, k: usize) -> Kmer {
        let mut fwd = self.bits;
        let mut rev = 0u64;
        for _ in 0..k {
            rev = (rev << 2) | (3 - (fwd & 3));
            fwd >>= 2;
        }
        Kmer { bits: rev }
    }

    /// Returns the canonical (smaller) orientation and whether it is the reverse complement.
    pub fn normalize(&self, k: usize) -> (Kmer, bool) {
        let rev = self.reverse_complement(k);
        if *self <= rev { (*self, false) } else { (rev, true) }
    }

    pub fn to_bytes(&self, k: usize) -> Vec<u8> {
        (0..k).map(|i| decode(self.get(i, k))).collect()
    }

    pub fn to_string(&self, k: usize) -> String {
        String::from_utf8_lossy(&self.to_bytes(k)).into_owned()
    }
}

impl fmt::Debug for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kmer({:#x})", self.bits)
    }
}

/// Rolling extraction of every k-mer of a sequence that spans only valid symbols.
/// Yields `(start position, k-mer)`.
pub struct KmerWindows<'a> {
    seq: &'a [u8],
    k: usize,
    pos: usize,
    run: usize,
    current: Kmer,
}

impl<'a> KmerWindows<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        KmerWindows { seq, k, pos: 0, run: 0, current: Kmer::default() }
    }
}

impl<'a> Iterator for KmerWindows<'a> {
    type Item = (usize, Kmer);

    fn next(&mut self) -> Option<(usize, Kmer)> {
        while self.pos < self.seq.len() {
            let c = self.seq[self.pos];
            self.pos += 1;
            match encode(c) {
                Some(code) => {
                    self.current = self.current.push_back(code, self.k);
                    self.run += 1;
                    if self.run >= self.k {
                        return Some((self.pos - self.k, self.current));
                    }
                }
                // an invalid symbol restarts the window
                None => self.run = 0,
            }
        }
        None
    }
}
