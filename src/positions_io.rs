// Edge positions on disk. The file is a sequence of records, one per edge,
// until end of stream:
//   stable edge id: u64, record count: u64,
//   count x (contig name: u64 length + bytes, initial range: 2 x u64, mapped range: 2 x u64)
// all integers little-endian. Edges are addressed by stable id only, so loading
// needs an id mapper for the graph the file was saved from.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use crate::binary_io::{read_string, read_u64, try_read_u64, write_string, write_u64};
use crate::error::{Error, PersistenceError, Result};
use crate::graph::{EdgeId, GraphCore};
use crate::id_mapper::IdMapper;
use crate::positions::{EdgePosition, EdgesPositionHandler, Interval};

fn malformed(edge_id: u64) -> impl Fn(io::Error) -> PersistenceError {
    move |e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            PersistenceError::Malformed(format!("record of edge {}: {}", edge_id, e))
        }
        _ => PersistenceError::Io(e),
    }
}

fn write_interval<W: Write>(writer: &mut W, interval: Interval) -> io::Result<()> {
    write_u64(writer, interval.start)?;
    write_u64(writer, interval.end)
}

fn read_interval<R: Read>(reader: &mut R) -> io::Result<Interval> {
    let start = read_u64(reader)?;
    let end = read_u64(reader)?;
    if end < start {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("range [{}, {}) is reversed", start, end)));
    }
    Ok(Interval::new(start, end))
}

/// Writes one record per edge of `g`, edges without positions included.
pub fn save_positions<W: Write>(
    writer: &mut W,
    g: &GraphCore,
    handler: &EdgesPositionHandler,
) -> std::result::Result<(), PersistenceError> {
    for e in g.edges() {
        let positions = handler.edge_positions(e);
        write_u64(writer, g.edge_int_id(e))?;
        write_u64(writer, positions.len() as u64)?;
        for p in &positions {
            write_string(writer, &p.contig)?;
            write_interval(writer, p.initial)?;
            write_interval(writer, p.mapped)?;
        }
    }
    Ok(())
}

/// Reads every record and resolves every id before touching `handler`, so a
/// failed load leaves it as it was. On success the handler is attached.
/// Returns the number of positions loaded.
pub fn load_positions<R: Read>(
    reader: &mut R,
    mapper: &IdMapper<EdgeId>,
    handler: &mut EdgesPositionHandler,
) -> std::result::Result<usize, PersistenceError> {
    if handler.is_attached() {
        return Err(PersistenceError::AlreadyAttached);
    }
    let mut staged: Vec<(EdgeId, EdgePosition)> = Vec::new();
    while let Some(id) = try_read_u64(reader)? {
        let e = mapper.resolve(id)?;
        let count = read_u64(reader).map_err(malformed(id))?;
        for _ in 0..count {
            let contig = read_string(reader).map_err(malformed(id))?;
            let initial = read_interval(reader).map_err(malformed(id))?;
            let mapped = read_interval(reader).map_err(malformed(id))?;
            staged.push((e, EdgePosition::new(contig, initial, mapped)));
        }
    }
    handler.attach();
    for (e, p) in &staged {
        handler.add_edge_position(*e, &p.contig, p.initial, p.mapped);
    }
    Ok(staged.len())
}

pub fn save_positions_file(path: impl AsRef<Path>, g: &GraphCore, handler: &EdgesPositionHandler) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let mut writer = BufWriter::new(file);
    save_positions(&mut writer, g, handler)?;
    writer.flush().map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    info!("Saved {} edge positions to {}", handler.len(), path.display());
    Ok(())
}

pub fn load_positions_file(
    path: impl AsRef<Path>,
    mapper: &IdMapper<EdgeId>,
    handler: &mut EdgesPositionHandler,
) -> Result<usize> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let loaded = load_positions(&mut BufReader::new(file), mapper, handler)?;
    info!("Loaded {} edge positions from {}", loaded, path.display());
    Ok(loaded)
}
