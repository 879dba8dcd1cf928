// Lazy, finite, restartable sources of reads. Construction reads each stream on
// a worker thread, so every stream must be movable to one.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;

use crate::error::{Error, Result};
use crate::read::Read;

pub trait ReadStream: Send {
    /// Next read, None once the stream is exhausted.
    fn next_read(&mut self) -> Option<Result<Read>>;

    /// Rewinds to the first read.
    fn reset(&mut self) -> Result<()>;

    fn name(&self) -> String;
}

pub type ReadStreamList = Vec<Box<dyn ReadStream>>;

/// Reads kept in memory; also used for contigs handed over by another stage.
pub struct MemoryReadStream {
    name: String,
    reads: Vec<Read>,
    pos: usize,
}

impl MemoryReadStream {
    pub fn new(name: impl Into<String>, reads: Vec<Read>) -> Self {
        MemoryReadStream { name: name.into(), reads, pos: 0 }
    }

    /// Convenience for plain sequences, ids are assigned by position.
    pub fn from_seqs<S: AsRef<[u8]>>(name: impl Into<String>, seqs: &[S]) -> Self {
        let reads = seqs.iter().enumerate().map(|(i, s)| Read::new(format!("read{}", i), s.as_ref().to_vec())).collect();
        MemoryReadStream::new(name, reads)
    }
}

impl ReadStream for MemoryReadStream {
    fn next_read(&mut self) -> Option<Result<Read>> {
        let read = self.reads.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(read))
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

type BoxedInput = BufReader<Box<dyn io::Read + Send>>;

enum Records {
    Fasta(fasta::Records<BoxedInput>),
    Fastq(fastq::Records<BoxedInput>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FastxFormat {
    Fasta,
    Fastq,
}

impl FastxFormat {
    /// Guessed from the file name, a trailing ".gz" is ignored.
    pub fn from_path(path: &Path) -> FastxFormat {
        let name = path.to_string_lossy().to_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".fq") || name.ends_with(".fastq") {
            FastxFormat::Fastq
        } else {
            FastxFormat::Fasta
        }
    }
}

/// A FASTA or FASTQ file, optionally gzip-compressed.
pub struct FastxReadStream {
    path: PathBuf,
    format: FastxFormat,
    records: Option<Records>,
}

impl FastxReadStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = FastxFormat::from_path(&path);
        let mut stream = FastxReadStream { path, format, records: None };
        stream.reset()?;
        Ok(stream)
    }

    fn open_input(&self) -> Result<Box<dyn io::Read + Send>> {
        let file = File::open(&self.path).map_err(|source| Error::Io { path: self.path.clone(), source })?;
        let gzipped = self.path.extension().map_or(false, |ext| ext == "gz");
        Ok(if gzipped { Box::new(MultiGzDecoder::new(file)) } else { Box::new(file) })
    }

    fn parse_error(&self, message: String) -> Error {
        Error::Parse { path: self.path.clone(), message }
    }
}

impl ReadStream for FastxReadStream {
    fn next_read(&mut self) -> Option<Result<Read>> {
        let next = match self.records.as_mut()? {
            Records::Fasta(records) => records.next().map(|r| {
                r.map(|rec| Read::new(rec.id(), rec.seq().to_vec())).map_err(|e| e.to_string())
            }),
            Records::Fastq(records) => records.next().map(|r| {
                r.map(|rec| Read::with_qual(rec.id(), rec.seq().to_vec(), rec.qual().to_vec()))
                    .map_err(|e| e.to_string())
            }),
        };
        next.map(|r| r.map_err(|message| self.parse_error(message)))
    }

    fn reset(&mut self) -> Result<()> {
        let input = BufReader::new(self.open_input()?);
        self.records = Some(match self.format {
            FastxFormat::Fasta => Records::Fasta(fasta::Reader::from_bufread(input).records()),
            FastxFormat::Fastq => Records::Fastq(fastq::Reader::from_bufread(input).records()),
        });
        Ok(())
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Interleaves the mates of a paired-end library; mates are indexed independently.
pub struct PairedReadStream {
    left: Box<dyn ReadStream>,
    right: Box<dyn ReadStream>,
    take_left: bool,
}

impl PairedReadStream {
    pub fn new(left: Box<dyn ReadStream>, right: Box<dyn ReadStream>) -> Self {
        PairedReadStream { left, right, take_left: true }
    }
}

impl ReadStream for PairedReadStream {
    fn next_read(&mut self) -> Option<Result<Read>> {
        let (first, second) = if self.take_left {
            (&mut self.left, &mut self.right)
        } else {
            (&mut self.right, &mut self.left)
        };
        self.take_left = !self.take_left;
        first.next_read().or_else(|| second.next_read())
    }

    fn reset(&mut self) -> Result<()> {
        self.take_left = true;
        self.left.reset()?;
        self.right.reset()
    }

    fn name(&self) -> String {
        format!("{}+{}", self.left.name(), self.right.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn drain(stream: &mut dyn ReadStream) -> Vec<Read> {
        let mut reads = Vec::new();
        while let Some(r) = stream.next_read() {
            reads.push(r.unwrap());
        }
        reads
    }

    #[test]
    fn test_memory_stream_restarts() {
        let mut stream = MemoryReadStream::from_seqs("mem", &["ACGT", "GGCC"]);
        assert_eq!(drain(&mut stream).len(), 2);
        assert!(stream.next_read().is_none());
        stream.reset().unwrap();
        assert_eq!(drain(&mut stream)[1].seq, b"GGCC".to_vec());
    }

    #[test]
    fn test_paired_stream_interleaves() {
        let left = MemoryReadStream::from_seqs("l", &["AAAA", "CCCC", "GGGG"]);
        let right = MemoryReadStream::from_seqs("r", &["TTTT"]);
        let mut paired = PairedReadStream::new(Box::new(left), Box::new(right));
        let seqs: Vec<Vec<u8>> = drain(&mut paired).into_iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![b"AAAA".to_vec(), b"TTTT".to_vec(), b"CCCC".to_vec(), b"GGGG".to_vec()]);
    }

    #[test]
    fn test_fastq_file_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq");
        let mut f = File::create(&path).unwrap();
        write!(f, "@r1\nACGTAC\n+\nIIIIII\n@r2\nGGTTAA\n+\nIIIIII\n").unwrap();
        drop(f);
        let mut stream = FastxReadStream::open(&path).unwrap();
        let reads = drain(&mut stream);
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].id, "r1");
        assert_eq!(reads[1].seq, b"GGTTAA".to_vec());
        assert_eq!(reads[1].qual.as_deref(), Some(&b"IIIIII"[..]));
        stream.reset().unwrap();
        assert_eq!(drain(&mut stream).len(), 2);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FastxFormat::from_path(Path::new("x.fastq.gz")), FastxFormat::Fastq);
        assert_eq!(FastxFormat::from_path(Path::new("x.fa")), FastxFormat::Fasta);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        match FastxReadStream::open("/nonexistent/reads.fa") {
            Err(Error::Io { .. }) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
