use std::path::PathBuf;

use anyhow::{bail, Context};
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_asmgraph::construction::{construct_graph, ConstructionMode, ConstructionParams, EarlyTipClipping};
use rust_asmgraph::gfa_output::output_gfa_file;
use rust_asmgraph::graph_io::save_graph_file;
use rust_asmgraph::read_stream::{FastxReadStream, PairedReadStream, ReadStream, ReadStreamList};
use rust_asmgraph::seq_output::write_edge_sequences_file;

#[derive(Debug, StructOpt)]
#[structopt(name = "rust-asmgraph", about = "Condensed de Bruijn graph construction from short reads")]
struct Opt {
    /// Activate debug mode
    // short and long flags (-d, --debug) will be deduced from the field's name
    #[structopt(short, long)]
    debug: bool,

    /// Single-end read files (FASTA/FASTQ, optionally gzipped)
    #[structopt(parse(from_os_str))]
    reads: Vec<PathBuf>,

    /// Paired-end library as two mate files; may be repeated
    #[structopt(long, parse(from_os_str), number_of_values = 2)]
    paired: Vec<PathBuf>,

    /// Reference contigs whose k-mers are added to the graph
    #[structopt(long, parse(from_os_str))]
    contigs: Option<PathBuf>,

    /// Output graph/sequences prefix
    #[structopt(parse(from_os_str), short, long)]
    prefix: Option<PathBuf>,

    #[structopt(short, long)]
    k: Option<usize>,
    /// Construction mode (only "extension" is supported)
    #[structopt(long)]
    mode: Option<ConstructionMode>,
    /// Clip short low-coverage tips before condensation
    #[structopt(long)]
    early_tc: bool,
    /// Longest clipped tip, in k-mers (default: max read length - k)
    #[structopt(long)]
    tip_length: Option<usize>,
    #[structopt(long)]
    tip_rel_cov: Option<f64>,
    /// Drop isolated perfect cycles instead of keeping them as loops
    #[structopt(long)]
    drop_perfect_loops: bool,
    /// Read buffer size, in MiB
    #[structopt(long)]
    buffer_mb: Option<usize>,
    #[structopt(short, long)]
    threads: Option<usize>,
}

fn open_streams(opt: &Opt) -> anyhow::Result<ReadStreamList> {
    let mut streams: ReadStreamList = Vec::new();
    for path in &opt.reads {
        streams.push(Box::new(FastxReadStream::open(path)?));
    }
    for mates in opt.paired.chunks(2) {
        let left = Box::new(FastxReadStream::open(&mates[0])?);
        let right = Box::new(FastxReadStream::open(&mates[1])?);
        streams.push(Box::new(PairedReadStream::new(left, right)));
    }
    Ok(streams)
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let level = if opt.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut params = ConstructionParams::default();
    if let Some(k) = opt.k { params.k = k } else { warn!("using default k value ({})", params.k); }
    if let Some(mode) = opt.mode { params.mode = mode; }
    if let Some(mb) = opt.buffer_mb { params.read_buffer_size = mb << 20; }
    params.keep_perfect_loops = !opt.drop_perfect_loops;
    params.early_tc = EarlyTipClipping {
        enable: opt.early_tc,
        length_bound: opt.tip_length,
        max_relative_coverage: opt.tip_rel_cov.unwrap_or(params.early_tc.max_relative_coverage),
    };
    params.validate()?;

    let output_prefix = match &opt.prefix {
        Some(p) => p.clone(),
        None => {
            let p = PathBuf::from(format!("graph-k{}", params.k));
            warn!("using default prefix ({})", p.display());
            p
        }
    };

    if let Some(threads) = opt.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("couldn't configure the thread pool")?;
    }

    if opt.reads.is_empty() && opt.paired.is_empty() {
        bail!("please specify at least one input file");
    }
    let mut streams = open_streams(&opt)?;
    let mut contigs: Option<Box<dyn ReadStream>> = match &opt.contigs {
        Some(path) => Some(Box::new(FastxReadStream::open(path)?)),
        None => None,
    };

    let (graph, stats) = construct_graph(&params, &mut streams, contigs.as_mut())?;
    info!(
        "Graph: {} vertices, {} edges ({} reads, {} tips clipped)",
        stats.vertices, stats.edges, stats.build.reads, stats.tips_clipped
    );

    let with_ext = |ext: &str| PathBuf::from(format!("{}.{}", output_prefix.display(), ext));
    output_gfa_file(with_ext("gfa"), &graph)?;
    write_edge_sequences_file(with_ext("fasta"), &graph)?;
    save_graph_file(with_ext("graph"), &graph)?;
    Ok(())
}
