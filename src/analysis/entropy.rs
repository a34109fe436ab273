//! Shannon entropy over an 8-bit alphabet

/// Shannon entropy of a byte buffer, in bits per symbol (0.0 ..= 8.0).
///
/// An empty buffer has entropy 0.0 by convention.
pub fn entropy_8bit(buf: &[u8]) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in buf {
        counts[b as usize] += 1;
    }
    let total = buf.len() as f64;
    let mut h = 0.0;
    for &c in counts.iter().filter(|&&c| c > 0) {
        let p = c as f64 / total;
        h -= p * p.log2();
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_zero() {
        assert_eq!(entropy_8bit(&[]), 0.0);
    }

    #[test]
    fn constant_buffer_is_zero() {
        let buf = vec![0x41u8; 4096];
        assert_eq!(entropy_8bit(&buf), 0.0);
    }

    #[test]
    fn uniform_bytes_hit_eight_bits() {
        let buf: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        let h = entropy_8bit(&buf);
        assert!((h - 8.0).abs() < 1e-9, "uniform distribution should be 8 bits, got {h}");
    }

    #[test]
    fn two_symbols_is_one_bit() {
        let buf: Vec<u8> = [0u8, 255u8].iter().cycle().take(1024).copied().collect();
        let h = entropy_8bit(&buf);
        assert!((h - 1.0).abs() < 1e-9, "two equiprobable symbols should be 1 bit, got {h}");
    }
}
