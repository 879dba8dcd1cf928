// Reads -> extension index -> (early tip clipping) -> condensed graph.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::condense::GraphCondenser;
use crate::error::{Error, Result};
use crate::ext_index::{BuildStats, ExtensionIndex, ExtensionIndexBuilder};
use crate::flanking::FlankingCoverage;
use crate::graph::Graph;
use crate::presimp::EarlyTipClipper;
use crate::read_stream::ReadStream;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructionMode {
    Extension,
    /// Recognized so that configurations naming it fail with a clear message.
    Legacy,
}

impl FromStr for ConstructionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "extension" => Ok(ConstructionMode::Extension),
            "legacy" => Ok(ConstructionMode::Legacy),
            other => Err(Error::Configuration(format!("unknown construction mode '{}'", other))),
        }
    }
}

impl fmt::Display for ConstructionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionMode::Extension => write!(f, "extension"),
            ConstructionMode::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EarlyTipClipping {
    pub enable: bool,
    /// Longest tip (in k-mers) that may be clipped; defaults to max read length - k.
    pub length_bound: Option<usize>,
    pub max_relative_coverage: f64,
}

impl Default for EarlyTipClipping {
    fn default() -> Self {
        EarlyTipClipping { enable: false, length_bound: None, max_relative_coverage: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstructionParams {
    pub k: usize,
    pub mode: ConstructionMode,
    pub early_tc: EarlyTipClipping,
    pub keep_perfect_loops: bool,
    /// Bytes of k-mer updates all workers together may buffer before merging.
    pub read_buffer_size: usize,
}

impl Default for ConstructionParams {
    fn default() -> Self {
        ConstructionParams {
            k: 21,
            mode: ConstructionMode::Extension,
            early_tc: EarlyTipClipping::default(),
            keep_perfect_loops: true,
            read_buffer_size: 512 << 20,
        }
    }
}

impl ConstructionParams {
    pub fn validate(&self) -> Result<()> {
        if self.mode != ConstructionMode::Extension {
            return Err(Error::Configuration(format!(
                "construction mode '{}' is not supported, use '{}'",
                self.mode,
                ConstructionMode::Extension
            )));
        }
        if self.k < 3 || self.k > 31 || self.k % 2 == 0 {
            return Err(Error::Configuration(format!("k must be odd and between 3 and 31, got {}", self.k)));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Configuration("read buffer size must be positive".to_string()));
        }
        let rel = self.early_tc.max_relative_coverage;
        if rel.is_nan() || rel < 0.0 {
            return Err(Error::Configuration("max relative tip coverage must be non-negative".to_string()));
        }
        Ok(())
    }

    pub fn tip_length_bound(&self, max_read_length: usize) -> usize {
        self.early_tc.length_bound.unwrap_or_else(|| max_read_length.saturating_sub(self.k))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstructionStats {
    pub build: BuildStats,
    pub index_kmers: usize,
    pub tips_clipped: usize,
    pub vertices: usize,
    pub edges: usize,
}

fn build_index(
    params: &ConstructionParams,
    streams: &mut [Box<dyn ReadStream>],
    contigs: Option<&mut Box<dyn ReadStream>>,
) -> Result<(ExtensionIndex, ConstructionStats)> {
    params.validate()?;
    if streams.is_empty() {
        return Err(Error::Configuration("at least one read stream is required".to_string()));
    }
    info!("Constructing de Bruijn graph for k={}", params.k);
    let (mut index, build) =
        ExtensionIndexBuilder::build_from_streams(params.k, streams, contigs, params.read_buffer_size)?;
    if build.reads == 0 {
        return Err(Error::Configuration("all read streams are empty".to_string()));
    }
    let mut stats = ConstructionStats { build, index_kmers: index.len(), ..Default::default() };
    if params.early_tc.enable {
        let bound = params.tip_length_bound(stats.build.max_read_length);
        stats.tips_clipped =
            EarlyTipClipper::new(&mut index, bound, params.early_tc.max_relative_coverage).clip_tips();
    }
    Ok((index, stats))
}

fn condense_index(params: &ConstructionParams, index: &ExtensionIndex, stats: &mut ConstructionStats) -> Result<Graph> {
    let g = GraphCondenser::new(index).condense(params.keep_perfect_loops)?;
    stats.vertices = g.vertex_count();
    stats.edges = g.edge_count();
    debug!("Construction stats: {:?}", stats);
    Ok(g)
}

/// Builds the condensed graph from `streams` (and the optional reference contigs).
pub fn construct_graph(
    params: &ConstructionParams,
    streams: &mut [Box<dyn ReadStream>],
    contigs: Option<&mut Box<dyn ReadStream>>,
) -> Result<(Graph, ConstructionStats)> {
    let (index, mut stats) = build_index(params, streams, contigs)?;
    let g = condense_index(params, &index, &mut stats)?;
    Ok((g, stats))
}

/// Same as [`construct_graph`], also filling `flanking` from the index before it is dropped.
/// Register `flanking` on the returned graph to keep it up to date.
pub fn construct_graph_with_coverage(
    params: &ConstructionParams,
    streams: &mut [Box<dyn ReadStream>],
    contigs: Option<&mut Box<dyn ReadStream>>,
    flanking: &mut FlankingCoverage,
) -> Result<(Graph, ConstructionStats)> {
    let (index, mut stats) = build_index(params, streams, contigs)?;
    let g = condense_index(params, &index, &mut stats)?;
    flanking.fill_from_index(&g, &index);
    Ok((g, stats))
}
