// K-mer extension index: for each canonical k-mer, which nucleotides can precede
// and follow it, plus an occurrence counter.
//
// The build runs the read-stream partitions in parallel, and each partition is
// further cut into batches of consecutive reads that rayon workers pick up as
// they come. Each batch fills a purely local table that is then merged into a
// sharded concurrent map (dashmap); the combine is a bitwise OR on the masks and
// a saturating add on the counter, so the result does not depend on worker
// interleaving.
// Counts are exact until they saturate at u32::MAX.

use std::collections::HashMap;
use std::mem;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kmer::{complement, complement_mask, Kmer};
use crate::read::Read;
use crate::read_stream::ReadStream;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtensionRecord {
    // low nibble: predecessor mask, high nibble: successor mask
    exts: u8,
    count: u32,
}

impl ExtensionRecord {
    pub fn new(prev_mask: u8, next_mask: u8, count: u32) -> Self {
        ExtensionRecord { exts: (prev_mask & 0xf) | ((next_mask & 0xf) << 4), count }
    }

    /// Record for a single occurrence of `kmer` in read orientation, keyed by its canonical form.
    pub fn occurrence(kmer: Kmer, prev: Option<u8>, next: Option<u8>, k: usize) -> (Kmer, ExtensionRecord) {
        let prev_mask = prev.map_or(0, |c| 1 << c);
        let next_mask = next.map_or(0, |c| 1 << c);
        let record = ExtensionRecord::new(prev_mask, next_mask, 1);
        let (canon, flipped) = kmer.normalize(k);
        if flipped { (canon, record.flipped()) } else { (canon, record) }
    }

    pub fn prev_mask(&self) -> u8 {
        self.exts & 0xf
    }

    pub fn next_mask(&self) -> u8 {
        self.exts >> 4
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn in_degree(&self) -> u32 {
        self.prev_mask().count_ones()
    }

    pub fn out_degree(&self) -> u32 {
        self.next_mask().count_ones()
    }

    pub fn has_prev(&self, code: u8) -> bool {
        self.prev_mask() & (1 << code) != 0
    }

    pub fn has_next(&self, code: u8) -> bool {
        self.next_mask() & (1 << code) != 0
    }

    pub fn unique_next(&self) -> Option<u8> {
        unique_code(self.next_mask())
    }

    pub fn unique_prev(&self) -> Option<u8> {
        unique_code(self.prev_mask())
    }

    /// In-degree or out-degree different from one.
    pub fn is_junction(&self) -> bool {
        self.in_degree() != 1 || self.out_degree() != 1
    }

    /// The same record seen from the reverse-complement strand.
    pub fn flipped(&self) -> ExtensionRecord {
        ExtensionRecord::new(complement_mask(self.next_mask()), complement_mask(self.prev_mask()), self.count)
    }

    pub fn combine(&mut self, other: &ExtensionRecord) {
        self.exts |= other.exts;
        self.count = self.count.saturating_add(other.count);
    }

    fn remove_next(&mut self, code: u8) {
        self.exts &= !(1 << (code + 4));
    }

    fn remove_prev(&mut self, code: u8) {
        self.exts &= !(1 << code);
    }
}

fn unique_code(mask: u8) -> Option<u8> {
    if mask.count_ones() == 1 { Some(mask.trailing_zeros() as u8) } else { None }
}

fn insert_into(map: &mut HashMap<Kmer, ExtensionRecord>, kmer: Kmer, prev: Option<u8>, next: Option<u8>, k: usize) {
    let (key, record) = ExtensionRecord::occurrence(kmer, prev, next, k);
    map.entry(key).or_default().combine(&record);
}

/// Per-partition counters; short reads and invalid symbols are skipped, not fatal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildStats {
    pub reads: u64,
    pub short_reads: u64,
    pub invalid_windows: u64,
    pub occurrences: u64,
    pub max_read_length: usize,
    pub batches: u64,
}

impl BuildStats {
    fn merge(&mut self, other: &BuildStats) {
        self.reads += other.reads;
        self.short_reads += other.short_reads;
        self.invalid_windows += other.invalid_windows;
        self.occurrences += other.occurrences;
        self.max_read_length = self.max_read_length.max(other.max_read_length);
        self.batches += other.batches;
    }
}

/// Consecutive reads of one stream, about `batch_bases` nucleotides at a time.
/// A read error ends the iteration after being yielded.
struct ReadBatches<'a> {
    stream: &'a mut dyn ReadStream,
    batch_bases: usize,
    done: bool,
}

impl Iterator for ReadBatches<'_> {
    type Item = Result<Vec<Read>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::new();
        let mut bases = 0;
        while bases < self.batch_bases {
            match self.stream.next_read() {
                Some(Ok(read)) => {
                    bases += read.len().max(1);
                    batch.push(read);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

// approximate footprint of one buffered entry, hash table overhead included
const PARTIAL_ENTRY_BYTES: usize = 2 * (mem::size_of::<Kmer>() + mem::size_of::<ExtensionRecord>());

/// Shared, concurrently writable index used while reads are being processed.
pub struct ExtensionIndexBuilder {
    k: usize,
    map: DashMap<Kmer, ExtensionRecord>,
}

impl ExtensionIndexBuilder {
    pub fn new(k: usize) -> Self {
        ExtensionIndexBuilder { k, map: DashMap::new() }
    }

    /// Safe to call from any number of threads for the same key.
    pub fn insert(&self, kmer: Kmer, prev: Option<u8>, next: Option<u8>) {
        let (key, record) = ExtensionRecord::occurrence(kmer, prev, next, self.k);
        self.map.entry(key).or_default().combine(&record);
    }

    fn merge_partial(&self, partial: &mut HashMap<Kmer, ExtensionRecord>) {
        for (kmer, record) in partial.drain() {
            self.map.entry(kmer).or_default().combine(&record);
        }
    }

    fn fill_batch(&self, reads: &[Read], is_contig: bool) -> BuildStats {
        let k = self.k;
        let mut stats = BuildStats { batches: 1, ..Default::default() };
        let mut partial: HashMap<Kmer, ExtensionRecord> = HashMap::new();
        for read in reads {
            stats.reads += 1;
            if !is_contig {
                stats.max_read_length = stats.max_read_length.max(read.len());
            }
            if read.len() < k {
                stats.short_reads += 1;
                continue;
            }
            stats.invalid_windows += read.invalid_windows(k) as u64;
            for occ in read.occurrences(k) {
                insert_into(&mut partial, occ.kmer, occ.prev, occ.next, k);
                stats.occurrences += 1;
            }
        }
        self.merge_partial(&mut partial);
        stats
    }

    fn fill_from_stream(&self, stream: &mut dyn ReadStream, is_contig: bool, batch_bases: usize) -> Result<BuildStats> {
        stream.reset()?;
        let name = stream.name();
        let stats = ReadBatches { stream, batch_bases, done: false }
            .par_bridge()
            .map(|batch| batch.map(|reads| self.fill_batch(&reads, is_contig)))
            .try_reduce(BuildStats::default, |mut a, b| {
                a.merge(&b);
                Ok(a)
            })?;
        debug!(
            "Stream {} done: {} reads in {} batches, {} k-mer occurrences",
            name, stats.reads, stats.batches, stats.occurrences
        );
        Ok(stats)
    }

    /// Builds the index from every stream in parallel. Each stream is read in
    /// batches that are indexed concurrently on the current rayon pool.
    /// `contigs` contributes k-mers but not to the read length statistic.
    /// `buffer_size` bounds the bytes of local tables held across workers.
    /// Any failing partition fails the whole build and nothing is returned.
    pub fn build_from_streams(
        k: usize,
        streams: &mut [Box<dyn ReadStream>],
        contigs: Option<&mut Box<dyn ReadStream>>,
        buffer_size: usize,
    ) -> Result<(ExtensionIndex, BuildStats)> {
        let builder = ExtensionIndexBuilder::new(k);
        let mut partitions: Vec<(&mut Box<dyn ReadStream>, bool)> = streams.iter_mut().map(|s| (s, false)).collect();
        if let Some(c) = contigs {
            partitions.push((c, true));
        }
        let workers = rayon::current_num_threads();
        let batch_bases = std::cmp::max(1, buffer_size / workers / PARTIAL_ENTRY_BYTES);
        info!(
            "Building extension index for k={} from {} partitions on {} threads ({} bases per batch)",
            k,
            partitions.len(),
            workers,
            batch_bases
        );

        let partial_stats = partitions
            .into_par_iter()
            .enumerate()
            .map(|(partition, (stream, is_contig))| {
                builder
                    .fill_from_stream(stream.as_mut(), is_contig, batch_bases)
                    .map_err(|e| Error::Build { partition, source: Box::new(e) })
            })
            .collect::<Result<Vec<BuildStats>>>()?;

        let mut stats = BuildStats::default();
        for s in &partial_stats {
            stats.merge(s);
        }
        let index = builder.finish();
        info!(
            "Extension index built: {} k-mers from {} reads in {} batches (max read length {}, {} short reads, {} invalid windows)",
            index.len(),
            stats.reads,
            stats.batches,
            stats.max_read_length,
            stats.short_reads,
            stats.invalid_windows
        );
        Ok((index, stats))
    }

    /// Freezes the index; lookups are only available on the result.
    pub fn finish(self) -> ExtensionIndex {
        ExtensionIndex { k: self.k, map: self.map.into_iter().collect() }
    }
}

/// Read-only (apart from tip clipping) view of the index after the build.
/// All k-mer arguments may be given in either orientation.
#[derive(Clone, Debug)]
pub struct ExtensionIndex {
    k: usize,
    map: HashMap<Kmer, ExtensionRecord>,
}

impl ExtensionIndex {
    pub fn new(k: usize) -> Self {
        ExtensionIndex { k, map: HashMap::new() }
    }

    /// Sequential build, handy for small inputs.
    pub fn from_seqs<S: AsRef<[u8]>>(k: usize, seqs: &[S]) -> Self {
        let mut index = ExtensionIndex::new(k);
        for seq in seqs {
            let read = Read::new("", seq.as_ref().to_vec());
            for occ in read.occurrences(k) {
                index.insert(occ.kmer, occ.prev, occ.next);
            }
        }
        index
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of canonical k-mers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn insert(&mut self, kmer: Kmer, prev: Option<u8>, next: Option<u8>) {
        insert_into(&mut self.map, kmer, prev, next, self.k);
    }

    pub fn contains(&self, kmer: Kmer) -> bool {
        self.map.contains_key(&kmer.normalize(self.k).0)
    }

    /// Record of `kmer` expressed in the orientation it was given in.
    pub fn lookup(&self, kmer: Kmer) -> Option<ExtensionRecord> {
        let (canon, flipped) = kmer.normalize(self.k);
        let record = self.map.get(&canon)?;
        Some(if flipped { record.flipped() } else { *record })
    }

    pub fn count(&self, kmer: Kmer) -> u32 {
        self.lookup(kmer).map_or(0, |r| r.count())
    }

    /// Canonical k-mers in ascending order, for reproducible traversals.
    pub fn sorted_kmers(&self) -> Vec<Kmer> {
        let mut kmers: Vec<Kmer> = self.map.keys().copied().collect();
        kmers.sort_unstable();
        kmers
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Kmer, &ExtensionRecord)> {
        self.map.iter()
    }

    pub fn successors(&self, kmer: Kmer) -> Vec<Kmer> {
        let k = self.k;
        match self.lookup(kmer) {
            Some(r) => (0..4).filter(|&c| r.has_next(c)).map(|c| kmer.push_back(c, k)).collect(),
            None => vec![],
        }
    }

    pub fn predecessors(&self, kmer: Kmer) -> Vec<Kmer> {
        let k = self.k;
        match self.lookup(kmer) {
            Some(r) => (0..4).filter(|&c| r.has_prev(c)).map(|c| kmer.push_front(c, k)).collect(),
            None => vec![],
        }
    }

    pub fn remove(&mut self, kmer: Kmer) -> Option<ExtensionRecord> {
        self.map.remove(&kmer.normalize(self.k).0)
    }

    /// Drops the `kmer -> kmer + code` extension (stored on whichever strand is canonical).
    pub fn remove_next(&mut self, kmer: Kmer, code: u8) {
        let (canon, flipped) = kmer.normalize(self.k);
        if let Some(r) = self.map.get_mut(&canon) {
            if flipped { r.remove_prev(complement(code)) } else { r.remove_next(code) }
        }
    }

    /// Drops the `code + kmer -> kmer` extension.
    pub fn remove_prev(&mut self, kmer: Kmer, code: u8) {
        let (canon, flipped) = kmer.normalize(self.k);
        if let Some(r) = self.map.get_mut(&canon) {
            if flipped { r.remove_next(complement(code)) } else { r.remove_prev(code) }
        }
    }
}
