/// Encode `value` so that byte order matches numeric order, for storing
/// numbers in value slots that range queries compare bytewise.
///
/// NaN sorts after everything.
pub fn sortable_serialise(value: f64) -> Vec<u8> {
    let bits = if value.is_nan() { f64::NAN.to_bits() & !(1 << 63) } else { (value + 0.0).to_bits() };
    let key = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    key.to_be_bytes().to_vec()
}

/// Inverse of `sortable_serialise`. Short input is padded with zero bytes,
/// so the empty string decodes to the smallest value.
pub fn sortable_unserialise(data: &[u8]) -> f64 {
    let mut raw = [0u8; 8];
    let n = data.len().min(8);
    raw[..n].copy_from_slice(&data[..n]);
    let key = u64::from_be_bytes(raw);
    if key < !f64::NEG_INFINITY.to_bits() {
        return f64::NEG_INFINITY;
    }
    let bits = if key >> 63 == 1 { key & !(1 << 63) } else { !key };
    f64::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_follows_numeric_order() {
        let values = [f64::NEG_INFINITY, -1e10, -2.5, -0.0, 0.0, 1e-300, 1.0, 2.5, 1e10, f64::INFINITY];
        let encoded: Vec<Vec<u8>> = values.iter().map(|&v| sortable_serialise(v)).collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for &v in &values {
            assert_eq!(sortable_unserialise(&sortable_serialise(v)), v);
        }
        assert!(sortable_serialise(f64::NAN) > sortable_serialise(f64::INFINITY));
        assert_eq!(sortable_unserialise(b""), f64::NEG_INFINITY);
    }
}
