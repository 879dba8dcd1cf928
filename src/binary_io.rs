// Fixed-width little-endian primitives shared by the graph and auxiliary file formats.

use std::io::{self, Read, Write};

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Like `read_u64`, but a clean end of stream (no byte at all) gives None.
pub fn try_read_u64<R: Read>(reader: &mut R) -> io::Result<Option<u64>> {
    let mut bytes = [0u8; 8];
    let mut filled = 0;
    while filled < bytes.len() {
        match reader.read(&mut bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => Ok(None),
        8 => Ok(Some(u64::from_le_bytes(bytes))),
        _ => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated integer")),
    }
}

pub fn write_f64<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    write_u64(writer, value.to_bits())
}

pub fn read_f64<R: Read>(reader: &mut R) -> io::Result<f64> {
    read_u64(reader).map(f64::from_bits)
}

/// Length-prefixed byte string.
pub fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u64(writer, bytes.len() as u64)?;
    writer.write_all(bytes)
}

pub fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u64(reader)?;
    let mut bytes = Vec::new();
    reader.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated byte string"));
    }
    Ok(bytes)
}

pub fn write_string<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    write_bytes(writer, s.as_bytes())
}

pub fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_bytes(reader)?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_layout_is_little_endian() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 0x0102).unwrap();
        write_string(&mut buf, "chr").unwrap();
        assert_eq!(buf, vec![2, 1, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, b'c', b'h', b'r']);
    }

    #[test]
    fn test_end_of_stream() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert_eq!(try_read_u64(&mut empty).unwrap(), None);
        let mut partial = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(try_read_u64(&mut partial).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_truncated_string() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 10).unwrap();
        buf.extend_from_slice(b"abc");
        assert_eq!(read_string(&mut Cursor::new(buf)).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_f64_bits_survive() {
        let mut buf = Vec::new();
        write_f64(&mut buf, 0.1 + 0.2).unwrap();
        assert_eq!(read_f64(&mut Cursor::new(buf)).unwrap(), 0.1 + 0.2);
    }
}
