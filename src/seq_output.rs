// Edge sequences as FASTA, one record per conjugate pair, named like the GFA
// segments so the two outputs can be cross-referenced.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bio::io::fasta;
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::GraphCore;

pub fn write_edge_sequences<W: Write>(writer: W, g: &GraphCore) -> io::Result<usize> {
    let mut fasta_writer = fasta::Writer::new(writer);
    let mut written = 0;
    for e in g.edges() {
        if g.edge_int_id(e) > g.edge_int_id(g.conjugate(e)) {
            continue;
        }
        let id = format!("edge_{}", g.edge_int_id(e));
        let desc = format!("length={} coverage={:.2}", g.length(e), g.coverage(e));
        fasta_writer.write(&id, Some(desc.as_str()), g.nucls(e))?;
        written += 1;
    }
    fasta_writer.flush()?;
    Ok(written)
}

pub fn write_edge_sequences_file(path: impl AsRef<Path>, g: &GraphCore) -> Result<()> {
    let path = path.as_ref();
    let io_err = |source| Error::Io { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(io_err)?;
    let written = write_edge_sequences(BufWriter::new(file), g).map_err(io_err)?;
    info!("Wrote {} edge sequences to {}", written, path.display());
    Ok(())
}
