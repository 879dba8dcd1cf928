use tracing::{debug, info};

use crate::ext_index::ExtensionIndex;
use crate::kmer::Kmer;

/// Pre-simplification on the extension index, before any edge is materialized.
///
/// A tip is a chain of k-mers t0..tm where t0 has no predecessor, every ti has a
/// single successor, t1..tm have a single predecessor, and the successor of tm
/// (the junction) has more than one predecessor. It is clipped when its length
/// (m + 1 transitions) is below `length_bound` and its mean count is below
/// `max_relative_coverage` times the best competing predecessor of the junction.
/// Chains that dead-end on both sides have no competitor and are kept.
pub struct EarlyTipClipper<'a> {
    index: &'a mut ExtensionIndex,
    length_bound: usize,
    max_relative_coverage: f64,
}

struct Tip {
    kmers: Vec<Kmer>,
    junction: Kmer,
}

impl<'a> EarlyTipClipper<'a> {
    pub fn new(index: &'a mut ExtensionIndex, length_bound: usize, max_relative_coverage: f64) -> Self {
        EarlyTipClipper { index, length_bound, max_relative_coverage }
    }

    fn find_tip(&self, start: Kmer) -> Option<Tip> {
        let k = self.index.k();
        let first = self.index.lookup(start)?;
        if first.in_degree() != 0 || first.out_degree() != 1 {
            return None;
        }
        let mut kmers = vec![start];
        let mut cur = start;
        loop {
            if kmers.len() >= self.length_bound {
                return None;
            }
            let next = cur.push_back(self.index.lookup(cur)?.unique_next()?, k);
            let next_record = self.index.lookup(next)?;
            if next_record.in_degree() > 1 {
                return Some(Tip { kmers, junction: next });
            }
            if next_record.out_degree() != 1 {
                return None;
            }
            kmers.push(next);
            cur = next;
        }
    }

    fn is_weak(&self, tip: &Tip) -> bool {
        let total: u64 = tip.kmers.iter().map(|&km| self.index.count(km) as u64).sum();
        let mean = total as f64 / tip.kmers.len() as f64;
        let attach = *tip.kmers.last().unwrap_or(&tip.junction);
        let competitor = self
            .index
            .predecessors(tip.junction)
            .into_iter()
            .filter(|&p| p != attach)
            .map(|p| self.index.count(p))
            .max()
            .unwrap_or(0);
        mean < self.max_relative_coverage * competitor as f64
    }

    fn remove_tip(&mut self, tip: &Tip) {
        let k = self.index.k();
        if let Some(last) = tip.kmers.last() {
            self.index.remove_prev(tip.junction, last.first(k));
        }
        for &km in &tip.kmers {
            self.index.remove(km);
        }
    }

    /// Returns the number of tips removed.
    pub fn clip_tips(&mut self) -> usize {
        let k = self.index.k();
        info!("Early tip clipping (length bound {})", self.length_bound);
        if self.length_bound == 0 {
            return 0;
        }
        let mut clipped = 0;
        let mut kmers_removed = 0;
        for canon in self.index.sorted_kmers() {
            for start in [canon, canon.reverse_complement(k)].iter() {
                if !self.index.contains(*start) {
                    continue;
                }
                if let Some(tip) = self.find_tip(*start) {
                    if self.is_weak(&tip) {
                        self.remove_tip(&tip);
                        clipped += 1;
                        kmers_removed += tip.kmers.len();
                    }
                }
            }
        }
        debug!("{} k-mers removed with tips", kmers_removed);
        info!("{} tips clipped", clipped);
        clipped
    }
}
