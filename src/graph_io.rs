// Saving and loading the graph itself with its stable ids, so that files keyed
// by stable ids (edge positions and the like) stay valid across runs.
//
// Layout, little-endian:
//   magic "ASMG", version: u64, k: u64, next stable id: u64,
//   vertex pair count: u64, count x (id: u64, conjugate id: u64),
//   edge pair count: u64, count x (id: u64, conjugate id: u64, start vertex id: u64,
//                                  end vertex id: u64, raw coverage: f64, nucls: u64 length + bytes)
// Only the member of each conjugate pair with the smaller id is written.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use crate::binary_io::{read_bytes, read_f64, read_u64, write_bytes, write_f64, write_u64};
use crate::error::{Error, PersistenceError, Result};
use crate::graph::{EdgeId, Graph, GraphCore, VertexId};
use crate::id_mapper::IdMapper;
use crate::utils::is_nucl_seq;

const MAGIC: &[u8; 4] = b"ASMG";
const VERSION: u64 = 1;

fn malformed(message: String) -> PersistenceError {
    PersistenceError::Malformed(message)
}

// Every persisted id lies below the next id recorded in the header.
fn check_ids(what: &str, id: u64, conj_id: u64, next_int_id: u64) -> std::result::Result<(), PersistenceError> {
    if id >= next_int_id || conj_id >= next_int_id {
        return Err(malformed(format!("{} id pair ({}, {}) is not below the next id {}", what, id, conj_id, next_int_id)));
    }
    Ok(())
}

fn truncated(e: io::Error) -> PersistenceError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => malformed("graph file is truncated".to_string()),
        _ => PersistenceError::Io(e),
    }
}

pub fn save_graph<W: Write>(writer: &mut W, g: &GraphCore) -> std::result::Result<(), PersistenceError> {
    writer.write_all(MAGIC)?;
    write_u64(writer, VERSION)?;
    write_u64(writer, g.k() as u64)?;
    write_u64(writer, g.next_int_id())?;

    let vertices: Vec<VertexId> = g
        .vertices()
        .into_iter()
        .filter(|&v| g.vertex_int_id(v) <= g.vertex_int_id(g.conjugate_vertex(v)))
        .collect();
    write_u64(writer, vertices.len() as u64)?;
    for v in vertices {
        write_u64(writer, g.vertex_int_id(v))?;
        write_u64(writer, g.vertex_int_id(g.conjugate_vertex(v)))?;
    }

    let edges: Vec<EdgeId> =
        g.edges().into_iter().filter(|&e| g.edge_int_id(e) <= g.edge_int_id(g.conjugate(e))).collect();
    write_u64(writer, edges.len() as u64)?;
    for e in edges {
        write_u64(writer, g.edge_int_id(e))?;
        write_u64(writer, g.edge_int_id(g.conjugate(e)))?;
        write_u64(writer, g.vertex_int_id(g.edge_start(e)))?;
        write_u64(writer, g.vertex_int_id(g.edge_end(e)))?;
        write_f64(writer, g.raw_coverage(e))?;
        write_bytes(writer, g.nucls(e))?;
    }
    Ok(())
}

/// Rebuilds a graph with the same stable ids and returns the mappers resolving them.
/// No handler is attached to the result.
pub fn load_graph<R: Read>(
    reader: &mut R,
) -> std::result::Result<(Graph, IdMapper<VertexId>, IdMapper<EdgeId>), PersistenceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MAGIC {
        return Err(malformed("not a graph file".to_string()));
    }
    let version = read_u64(reader).map_err(truncated)?;
    if version != VERSION {
        return Err(malformed(format!("unsupported graph file version {}", version)));
    }
    let k = read_u64(reader).map_err(truncated)? as usize;
    let next_int_id = read_u64(reader).map_err(truncated)?;

    let mut graph = Graph::new(k);
    let mut vertices = IdMapper::new();
    let vertex_pairs = read_u64(reader).map_err(truncated)?;
    for _ in 0..vertex_pairs {
        let id = read_u64(reader).map_err(truncated)?;
        let conj_id = read_u64(reader).map_err(truncated)?;
        check_ids("vertex", id, conj_id, next_int_id)?;
        if vertices.resolve(id).is_ok() || vertices.resolve(conj_id).is_ok() {
            return Err(malformed(format!("vertex id {} appears twice", id)));
        }
        let core = graph.core_mut();
        let v = if id == conj_id {
            core.hidden_add_self_conjugate_vertex(Some(id))
        } else {
            core.hidden_add_vertex_pair(Some((id, conj_id)))
        };
        vertices.insert(id, v);
        vertices.insert(conj_id, graph.conjugate_vertex(v));
    }

    let mut edges = IdMapper::new();
    let edge_pairs = read_u64(reader).map_err(truncated)?;
    for _ in 0..edge_pairs {
        let id = read_u64(reader).map_err(truncated)?;
        let conj_id = read_u64(reader).map_err(truncated)?;
        check_ids("edge", id, conj_id, next_int_id)?;
        let from = vertices.resolve(read_u64(reader).map_err(truncated)?)?;
        let to = vertices.resolve(read_u64(reader).map_err(truncated)?)?;
        let raw_coverage = read_f64(reader).map_err(truncated)?;
        let nucls = read_bytes(reader).map_err(truncated)?;
        if nucls.len() <= k || !is_nucl_seq(&nucls) {
            return Err(malformed(format!("edge {} has an invalid sequence", id)));
        }
        if edges.resolve(id).is_ok() || edges.resolve(conj_id).is_ok() {
            return Err(malformed(format!("edge id {} appears twice", id)));
        }
        let e = graph.core_mut().hidden_add_edge(from, to, nucls, raw_coverage, Some((id, conj_id)));
        edges.insert(id, e);
        edges.insert(conj_id, graph.conjugate(e));
    }
    graph.core_mut().reserve_int_ids(next_int_id);
    Ok((graph, vertices, edges))
}

pub fn save_graph_file(path: impl AsRef<Path>, g: &GraphCore) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let mut writer = BufWriter::new(file);
    save_graph(&mut writer, g)?;
    writer.flush().map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    info!("Saved graph ({} vertices, {} edges) to {}", g.vertex_count(), g.edge_count(), path.display());
    Ok(())
}

pub fn load_graph_file(path: impl AsRef<Path>) -> Result<(Graph, IdMapper<VertexId>, IdMapper<EdgeId>)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let loaded = load_graph(&mut BufReader::new(file))?;
    info!("Loaded graph ({} vertices, {} edges) from {}", loaded.0.vertex_count(), loaded.0.edge_count(), path.display());
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn summary(g: &GraphCore) -> Vec<(u64, u64, u64, u64, Vec<u8>, u64)> {
        g.edges()
            .into_iter()
            .map(|e| {
                (
                    g.edge_int_id(e),
                    g.edge_int_id(g.conjugate(e)),
                    g.vertex_int_id(g.edge_start(e)),
                    g.vertex_int_id(g.edge_end(e)),
                    g.nucls(e).to_vec(),
                    g.raw_coverage(e).to_bits(),
                )
            })
            .collect()
    }

    #[test]
    fn test_round_trip_keeps_ids() {
        let mut g = Graph::new(3);
        let a = g.add_vertex();
        let b = g.add_vertex();
        let c = g.add_self_conjugate_vertex();
        let e = g.add_edge(a, b, b"ACGTTC".to_vec(), 1.5);
        g.add_edge(b, c, b"TTCGAA".to_vec(), 2.0);
        let conj_a = g.conjugate_vertex(a);
        g.add_edge(a, conj_a, b"ACGCGT".to_vec(), 4.0);
        g.delete_edge(e);
        let mut buf = Vec::new();
        save_graph(&mut buf, &g).unwrap();

        let (loaded, vertices, edges) = load_graph(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(loaded.k(), 3);
        assert_eq!(summary(&loaded), summary(&g));
        assert_eq!(vertices.len(), g.vertex_count());
        assert_eq!(edges.len(), g.edge_count());
        assert_eq!(loaded.next_int_id(), g.next_int_id());
        for v in g.vertices() {
            let w = vertices.resolve(g.vertex_int_id(v)).unwrap();
            assert_eq!(loaded.vertex_int_id(loaded.conjugate_vertex(w)), g.vertex_int_id(g.conjugate_vertex(v)));
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        match load_graph(&mut Cursor::new(b"NOPE".to_vec())) {
            Err(PersistenceError::Malformed(_)) => {}
            other => panic!("unexpected: {:?}", other.map(|(g, _, _)| g.edge_count())),
        }
        let mut g = Graph::new(3);
        let a = g.add_vertex();
        let b = g.add_vertex();
        g.add_edge(a, b, b"ACGTT".to_vec(), 0.0);
        let mut buf = Vec::new();
        save_graph(&mut buf, &g).unwrap();
        buf.truncate(buf.len() - 1);
        match load_graph(&mut Cursor::new(buf)) {
            Err(PersistenceError::Malformed(_)) => {}
            other => panic!("unexpected: {:?}", other.map(|(g, _, _)| g.edge_count())),
        }
    }

    fn header(next_int_id: u64) -> Vec<u8> {
        let mut buf = MAGIC.to_vec();
        for &x in [VERSION, 3, next_int_id].iter() {
            write_u64(&mut buf, x).unwrap();
        }
        buf
    }

    #[test]
    fn test_ids_beyond_the_header_are_malformed() {
        let mut buf = header(10);
        for &x in [1, u64::MAX, 5].iter() {
            write_u64(&mut buf, x).unwrap();
        }
        match load_graph(&mut Cursor::new(buf)) {
            Err(PersistenceError::Malformed(message)) => assert!(message.contains("vertex")),
            other => panic!("unexpected: {:?}", other.map(|(g, _, _)| g.edge_count())),
        }

        let mut buf = header(u64::MAX);
        for &x in [1, 1, 2, 1, u64::MAX, 7, 1, 2].iter() {
            write_u64(&mut buf, x).unwrap();
        }
        match load_graph(&mut Cursor::new(buf)) {
            Err(PersistenceError::Malformed(message)) => assert!(message.contains("edge")),
            other => panic!("unexpected: {:?}", other.map(|(g, _, _)| g.edge_count())),
        }
    }
}
