// One sequencing read (or reference contig) and the k-mer occurrences it contributes.

use super::kmer::{self, Kmer, KmerWindows};

#[derive(Clone, Debug, PartialEq)]
pub struct Read {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

/// A k-mer seen in a read, with the neighbouring nucleotide codes (if valid) in read orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KmerOccurrence {
    pub kmer: Kmer,
    pub prev: Option<u8>,
    pub next: Option<u8>,
}

impl Read {
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        Read { id: id.into(), seq: seq.into(), qual: None }
    }

    pub fn with_qual(id: impl Into<String>, seq: impl Into<Vec<u8>>, qual: impl Into<Vec<u8>>) -> Self {
        Read { id: id.into(), seq: seq.into(), qual: Some(qual.into()) }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Every k-mer window not spanning an invalid symbol. A read shorter than k yields nothing.
    pub fn occurrences(&self, k: usize) -> impl Iterator<Item = KmerOccurrence> + '_ {
        let seq = &self.seq;
        KmerWindows::new(seq, k).map(move |(pos, kmer)| {
            let prev = if pos > 0 { kmer::encode(seq[pos - 1]) } else { None };
            let next = seq.get(pos + k).and_then(|&c| kmer::encode(c));
            KmerOccurrence { kmer, prev, next }
        })
    }

    /// Number of windows dropped because they would span an invalid symbol.
    pub fn invalid_windows(&self, k: usize) -> usize {
        if self.seq.len() < k {
            return 0;
        }
        let total = self.seq.len() - k + 1;
        total - KmerWindows::new(&self.seq, k).count()
    }
}
