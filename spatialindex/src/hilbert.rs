//! N-dimensional Hilbert curve keys for spatial locality.
//!
//! The Hilbert curve maps grid cells to a 1D index such that consecutive
//! indices are always adjacent cells. Bulk loading sorts entries by the key of
//! their centers to pack nearby entries into the same node.
//!
//! Keys are computed with Skilling's transpose algorithm ("Programming the
//! Hilbert curve", AIP Conf. Proc. 707, 2004) and packed into a `u128`.

/// Maximum number of bits per dimension.
const MAX_BITS: u32 = 16;

/// Number of bits per dimension used for `dimension`-dimensional keys, so that
/// the whole key fits in 128 bits (beyond 128 dimensions the leading bits are
/// dropped).
pub fn bits_per_dimension(dimension: usize) -> u32 {
    (128 / dimension.max(1) as u32).clamp(1, MAX_BITS)
}

/// Encodes grid coordinates (each below `2^bits`) to their Hilbert index.
///
/// # Example
/// ```
/// use spatialindex::hilbert::hilbert_key;
///
/// // the 2x2 curve visits (0,0), (0,1), (1,1), (1,0)
/// assert_eq!(hilbert_key(&[0, 0], 1), 0);
/// assert_eq!(hilbert_key(&[0, 1], 1), 1);
/// assert_eq!(hilbert_key(&[1, 1], 1), 2);
/// assert_eq!(hilbert_key(&[1, 0], 1), 3);
/// ```
pub fn hilbert_key(coords: &[u32], bits: u32) -> u128 {
    debug_assert!(bits > 0 && bits <= MAX_BITS, "bits must be 1-16");
    let mut x = coords.to_vec();
    axes_to_transpose(&mut x, bits);

    let mut key = 0u128;
    for bit in (0..bits).rev() {
        for xi in &x {
            key = (key << 1) | ((*xi >> bit) & 1) as u128;
        }
    }
    key
}

/// Encodes a point in absolute space to a Hilbert index, normalizing each
/// coordinate against `[low, high]`.
///
/// Coordinates outside the bounds are clamped; a dimension with zero range maps
/// to the middle of the grid.
pub fn hilbert_key_bounded(point: &[f64], low: &[f64], high: &[f64]) -> u128 {
    let bits = bits_per_dimension(point.len());
    let cells = 1u64 << bits;
    let coords: Vec<u32> = point
        .iter()
        .enumerate()
        .map(|(d, p)| {
            let range = high[d] - low[d];
            let norm = if range > 0.0 && range.is_finite() {
                ((p - low[d]) / range).clamp(0.0, 1.0)
            } else {
                0.5
            };
            ((norm * cells as f64) as u64).min(cells - 1) as u32
        })
        .collect();
    hilbert_key(&coords, bits)
}

// Skilling's AxestoTranspose: rewrites the coordinates in place into the
// "transposed" Hilbert index, whose interleaved bits form the key.
fn axes_to_transpose(x: &mut [u32], bits: u32) {
    let n = x.len();
    if n == 0 {
        return;
    }
    let m = 1u32 << (bits - 1);

    // inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for xi in x.iter_mut() {
        *xi ^= t;
    }
}
