// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Stencil
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Charge-assignment stencils and influence-function denominators.
//!
//! The assignment function of order p is the p-fold convolution of the
//! cell-wide top hat (Hockney & Eastwood). On each of its p mesh points it
//! is a polynomial of degree p-1 in the offset `dx` from the nearest mesh
//! point; `rho_coeff` stores those polynomial coefficients.

use ndarray::Array2;
use pppm_types::constants::PPPM_MAX_ORDER;
use pppm_types::error::{PppmError, PppmResult};
use std::f64::consts::PI;

fn check_order(order: usize) -> PppmResult<()> {
    if order == 0 || order > PPPM_MAX_ORDER {
        return Err(PppmError::ConfigError(format!(
            "interpolation order must be in 1..={PPPM_MAX_ORDER}, got {order}"
        )));
    }
    Ok(())
}

/// Polynomial coefficients of the assignment function.
///
/// Shape `(order, order)`: row `l` is the power of `dx`, column `m` the
/// stencil point at offset `m + nlower` from the base mesh point.
pub fn compute_rho_coeff(order: usize) -> PppmResult<Array2<f64>> {
    check_order(order)?;
    let n = order as i64;
    // a[l][k] for k in -order..=order, built by repeated integration.
    let mut a = Array2::<f64>::zeros((order, 2 * order + 1));
    let at = |k: i64| (k + n) as usize;
    a[[0, at(0)]] = 1.0;

    for j in 1..n {
        let mut k = -j;
        while k <= j {
            let mut s = 0.0;
            for l in 0..j as usize {
                let lf = l as f64 + 1.0;
                a[[l + 1, at(k)]] = (a[[l, at(k + 1)]] - a[[l, at(k - 1)]]) / lf;
                s += 0.5f64.powi(l as i32 + 1)
                    * (a[[l, at(k - 1)]] + (-1.0f64).powi(l as i32) * a[[l, at(k + 1)]])
                    / lf;
            }
            a[[0, at(k)]] = s;
            k += 2;
        }
    }

    let mut coeff = Array2::<f64>::zeros((order, order));
    let mut m = 0usize;
    let mut k = -(n - 1);
    while k < n {
        for l in 0..order {
            coeff[[l, m]] = a[[l, at(k)]];
        }
        m += 1;
        k += 2;
    }
    Ok(coeff)
}

/// Coefficients `gf_b` of the aliasing-sum denominator polynomial.
///
/// Σ_m W²(k + 2πm/h) = Σ_l gf_b[l] · sin²(kh/2)^l, so `gf_b[0] == 1`.
pub fn compute_gf_denom(order: usize) -> PppmResult<Vec<f64>> {
    check_order(order)?;
    let mut gf_b = vec![0.0; order];
    gf_b[0] = 1.0;
    for m in 1..order {
        let mf = m as f64;
        for l in (1..=m).rev() {
            let lf = l as f64;
            gf_b[l] = 4.0
                * (gf_b[l] * (lf - mf) * (lf - mf - 0.5)
                    - gf_b[l - 1] * (lf - mf - 1.0) * (lf - mf - 1.0));
        }
        gf_b[0] = 4.0 * (gf_b[0] * (-mf) * (-mf - 0.5));
    }
    let ifact: f64 = (1..2 * order).map(|k| k as f64).product();
    for v in gf_b.iter_mut() {
        *v /= ifact;
    }
    Ok(gf_b)
}

/// Squared product of the per-axis denominator polynomials, evaluated at
/// `x = sin²(π m_x / N_x)` etc.
pub fn gf_denom(gf_b: &[f64], x: f64, y: f64, z: f64) -> f64 {
    let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
    for &b in gf_b.iter().rev() {
        sx = b + sx * x;
        sy = b + sy * y;
        sz = b + sz * z;
    }
    let s = sx * sy * sz;
    s * s
}

/// (sin x / x)^n with the removable singularity at 0.
pub fn powsinxx(x: f64, n: i32) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    (x.sin() / x).powi(n)
}

/// Assignment-function evaluator for one order.
#[derive(Debug, Clone)]
pub struct StencilTable {
    order: usize,
    coeff: Array2<f64>,
}

impl StencilTable {
    pub fn new(order: usize) -> PppmResult<Self> {
        Ok(StencilTable {
            order,
            coeff: compute_rho_coeff(order)?,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn coeff(&self) -> &Array2<f64> {
        &self.coeff
    }

    /// Offset of the first stencil point from the base mesh point.
    pub fn nlower(&self) -> i64 {
        -((self.order as i64 - 1) / 2)
    }

    /// Base mesh point and offset `dx` for a reduced coordinate `u`.
    ///
    /// Odd orders centre on the nearest mesh point, even orders on the
    /// nearest cell centre.
    pub fn locate(&self, u: f64) -> (i64, f64) {
        let (shift, shiftone) = if self.order % 2 == 1 {
            (0.5, 0.0)
        } else {
            (0.0, 0.5)
        };
        let base = (u + shift).floor();
        (base as i64, base + shiftone - u)
    }

    /// Stencil weights for offset `dx`; `out[m]` belongs to point `base + nlower + m`.
    pub fn weights(&self, dx: f64, out: &mut [f64]) {
        for (m, w) in out.iter_mut().enumerate().take(self.order) {
            let mut r = 0.0;
            for l in (0..self.order).rev() {
                r = self.coeff[[l, m]] + r * dx;
            }
            *w = r;
        }
    }
}

/// Deserno–Holm coefficients for the ik-differentiated k-space error,
/// indexed `[order][m]`.
const ACONS: [[f64; 7]; 8] = [
    [0.0; 7],
    [2.0 / 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 50.0, 5.0 / 294.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 588.0, 7.0 / 1440.0, 21.0 / 3872.0, 0.0, 0.0, 0.0, 0.0],
    [
        1.0 / 4320.0,
        3.0 / 1936.0,
        7601.0 / 2271360.0,
        143.0 / 28800.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        1.0 / 23232.0,
        7601.0 / 13628160.0,
        143.0 / 69120.0,
        517231.0 / 106536960.0,
        106640677.0 / 11737571328.0,
        0.0,
        0.0,
    ],
    [
        691.0 / 68140800.0,
        13.0 / 57600.0,
        47021.0 / 35512320.0,
        9694607.0 / 2095994880.0,
        733191589.0 / 59609088000.0,
        326190917.0 / 11700633600.0,
        0.0,
    ],
    [
        1.0 / 345600.0,
        3617.0 / 35512320.0,
        745739.0 / 838397952.0,
        56399353.0 / 12773376000.0,
        25091609.0 / 1560084480.0,
        1755948832039.0 / 36229939200000.0,
        4887769399.0 / 37838389248.0,
    ],
];

/// Estimated RMS k-space force error along one axis.
///
/// `h` mesh spacing, `prd` box length, `natoms` particle count,
/// `q2` sum of squared charges.
pub fn kspace_rms_error(order: usize, kappa: f64, h: f64, prd: f64, natoms: f64, q2: f64) -> f64 {
    if order == 0 || order > PPPM_MAX_ORDER || natoms <= 0.0 {
        return 0.0;
    }
    let hk = h * kappa;
    let sum: f64 = (0..order)
        .map(|m| ACONS[order][m] * hk.powi(2 * m as i32))
        .sum();
    q2 * hk.powi(order as i32) * (kappa * prd * (2.0 * PI).sqrt() * sum / natoms).sqrt()
        / (prd * prd)
}

/// Estimated RMS real-space force error for cutoff `rcut`.
pub fn real_space_rms_error(kappa: f64, rcut: f64, natoms: f64, q2: f64, volume: f64) -> f64 {
    if natoms <= 0.0 || volume <= 0.0 {
        return 0.0;
    }
    2.0 * q2 * (-kappa * kappa * rcut * rcut).exp() / (natoms * rcut * volume).sqrt()
}
