// Various helper functions used throughout.

pub fn revcomp(dna: &[u8]) -> Vec<u8> {
    dna.iter().rev().map(|&c| switch_base(c)).collect()
}

fn switch_base(c: u8) -> u8 {
    match c {
        b'a' => b't',
        b'c' => b'g',
        b't' => b'a',
        b'g' => b'c',
        b'u' => b'a',
        b'A' => b'T',
        b'C' => b'G',
        b'T' => b'A',
        b'G' => b'C',
        b'U' => b'A',
        _ => b'N',
    }
}

/// true when every symbol is one of ACGT (upper case)
pub fn is_nucl_seq(seq: &[u8]) -> bool {
    seq.iter().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T'))
}
