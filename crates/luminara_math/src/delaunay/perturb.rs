//! Deterministic low-bit perturbation of user-supplied float coordinates.
//!
//! Breaks exact cocircularity/cosphericity for generic input without
//! changing the coordinate the user sees: casting the perturbed `f64` back
//! to `f32` always recovers the original float.

/// Per-axis companion coefficients, distinct so that two sites sharing one
/// coordinate do not also share their companion value.
const COMPANION_COEFFS: [[f32; 3]; 3] = [
    [0.0, 0.618_034, 0.414_214],
    [0.414_214, 0.0, 0.618_034],
    [0.618_034, 0.414_214, 0.0],
];

fn companion(axis: usize, coords: &[f32]) -> f32 {
    let mut acc = 0.0f32;
    for (i, &c) in coords.iter().enumerate() {
        acc += COMPANION_COEFFS[axis][i] * c;
    }
    acc
}

fn bit_reversed_32(bits: u32) -> u32 {
    bits.reverse_bits()
}

/// Perturbs a single coordinate `x` on `axis` given the site's full
/// unperturbed coordinate tuple (2 or 3 floats), returning an `f64` such
/// that `(x as f32) == x` continues to hold.
pub fn perturb_coordinate(axis: usize, coords: &[f32]) -> f64 {
    let x = coords[axis];
    let comp = companion(axis, coords);
    let j = bit_reversed_32(comp.to_bits()) >> 1; // j in [0, 2^31)

    let eps_f = f32::EPSILON as f64;
    let fraction = (j as f64) / (1u64 << 31) as f64;

    let base = if x == 0.0 {
        // `f32::MIN_POSITIVE` is the smallest *normal* f32 (2^-126); scaling
        // that by 0.1 still round-trips to a nonzero subnormal. The smallest
        // representable subnormal (`f32::from_bits(1)`, 2^-149) is the one
        // that underflows back to exactly 0.0 after the `0.1 *` scale below,
        // which is what the round-trip assertion requires.
        0.1 * f32::from_bits(1) as f64
    } else {
        x as f64
    };

    let xp = base * (1.0 + fraction * 0.1 * eps_f);
    debug_assert_eq!(xp as f32, x, "perturbation must round-trip to the original float");
    xp
}

/// Perturbs a full 2D coordinate pair.
pub fn perturb2(coords: [f32; 2]) -> [f64; 2] {
    let full = [coords[0], coords[1], 0.0];
    [perturb_coordinate(0, &full), perturb_coordinate(1, &full)]
}

/// Perturbs a full 3D coordinate triple.
pub fn perturb3(coords: [f32; 3]) -> [f64; 3] {
    [
        perturb_coordinate(0, &coords),
        perturb_coordinate(1, &coords),
        perturb_coordinate(2, &coords),
    ]
}
