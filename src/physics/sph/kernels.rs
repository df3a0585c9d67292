use std::f32::consts::PI;

/// Kernel support radius. Positions are measured in units of `H`, so every
/// kernel below is written for `H = 1` with the coefficients precomputed.
pub const H: f32 = 1.0;
pub const H2: f32 = H * H;

// 315 / (64 π H⁹)
const POLY6_COEFF: f32 = 315.0 / (64.0 * PI);
// 45 / (π H⁶)
const SPIKY_GRAD_COEFF: f32 = 45.0 / PI;
// 45 / (π H⁵)
const VISC_LAPL_COEFF: f32 = 45.0 / PI;

/// Density kernel, evaluated on the squared distance.
pub fn poly6(dist_squared: f32) -> f32 {
    if dist_squared >= H2 {
        return 0.0;
    }

    let diff = H2 - dist_squared;
    POLY6_COEFF * diff * diff * diff
}

/// Scalar factor of the spiky kernel gradient. Multiplying it with the pair
/// offset `p - q` yields the gradient vector pointing from `q` towards `p`.
/// `dist` must be positive - callers bump it by a small epsilon.
pub fn spiky_grad2(dist: f32) -> f32 {
    if dist >= H {
        return 0.0;
    }

    let diff = H - dist;
    SPIKY_GRAD_COEFF * diff * diff / dist
}

/// Laplacian of the viscosity kernel.
pub fn visc_laplacian(dist: f32) -> f32 {
    if dist >= H {
        return 0.0;
    }

    VISC_LAPL_COEFF * (1.0 - dist / H)
}
