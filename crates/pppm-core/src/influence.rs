// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Influence Function
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Optimal influence function for ik-differentiated PPPM.
//!
//! For every k in the local brick:
//!
//!   G(k) = 4π/|k|² · Σ_n (k·k_n)/|k_n|² · exp(-|k_n|²/4κ²) · U²(k_n)
//!          / [Σ_n U²(k_n)]²
//!
//! with k_n = k + Σ_a n_a N_a b_a running over `images` aliases per axis
//! and U the Fourier transform of the assignment function. The
//! denominator uses the closed-form polynomial in sin²(πm/N).
//!
//! References:
//!   - Hockney & Eastwood, "Computer Simulation Using Particles", Ch. 8
//!   - Deserno & Holm, J. Chem. Phys. 109 (1998) 7678

use ndarray::Array3;
use pppm_math::stencil::{compute_gf_denom, gf_denom, powsinxx};
use pppm_types::error::{PppmError, PppmResult};
use pppm_types::state::Virial;
use pppm_types::vec3::{add, dot, scale, Vec3};
use std::f64::consts::PI;

use crate::mesh::MeshGeometry;

/// Signed Miller index for global mesh index `m` on an axis of `n` points.
pub fn miller_index(m: usize, n: usize) -> i64 {
    let (m, n) = (m as i64, n as i64);
    if m >= n / 2 + n % 2 {
        m - n
    } else {
        m
    }
}

/// Per-k weights for the local brick.
#[derive(Debug, Clone)]
pub struct InfluenceTable {
    green: Array3<f64>,
    kvec: Array3<Vec3>,
    virial: Array3<Virial>,
}

impl InfluenceTable {
    /// Influence weight G(k).
    pub fn green(&self) -> &Array3<f64> {
        &self.green
    }

    /// Wave vector for each brick element.
    pub fn kvec(&self) -> &Array3<Vec3> {
        &self.kvec
    }

    /// Virial weights (xx, xy, xz, yy, yz, zz).
    pub fn virial(&self) -> &Array3<Virial> {
        &self.virial
    }
}

/// Build the influence table for the brick described by `geom`.
pub fn solve_influence(
    geom: &MeshGeometry,
    kappa: f64,
    images: usize,
    short_wave_cutoff: Option<f64>,
) -> PppmResult<InfluenceTable> {
    if !kappa.is_finite() || kappa <= 0.0 {
        return Err(PppmError::ConfigError(format!(
            "kappa must be finite and > 0, got {kappa}"
        )));
    }
    let order = geom.order();
    let gf_b = compute_gf_denom(order)?;
    let recip = geom.simbox().reciprocal_vectors();
    let global = geom.global_dims();
    let offset = geom.offset();
    let local = geom.local_dims();
    let nb = images as i64;
    let two_p = 2 * order as i32;
    let inv_4kappa_sq = 0.25 / (kappa * kappa);

    let shape = (local[0], local[1], local[2]);
    let mut green = Array3::<f64>::zeros(shape);
    let mut kvec = Array3::<Vec3>::from_elem(shape, [0.0; 3]);
    let mut virial = Array3::<Virial>::from_elem(shape, [0.0; 6]);

    for ((i, j, l), g) in green.indexed_iter_mut() {
        let m = [
            miller_index(offset[0] + i, global[0]),
            miller_index(offset[1] + j, global[1]),
            miller_index(offset[2] + l, global[2]),
        ];
        let k = (0..3).fold([0.0; 3], |acc, a| add(acc, scale(recip[a], m[a] as f64)));
        kvec[[i, j, l]] = k;
        let ksq = dot(k, k);
        if ksq == 0.0 || short_wave_cutoff.is_some_and(|q| ksq > q) {
            continue;
        }

        let mut numerator = 0.0;
        for ix in -nb..=nb {
            let mx = (m[0] + ix * global[0] as i64) as f64;
            let wx = powsinxx(PI * mx / global[0] as f64, two_p);
            for iy in -nb..=nb {
                let my = (m[1] + iy * global[1] as i64) as f64;
                let wy = powsinxx(PI * my / global[1] as f64, two_p);
                for iz in -nb..=nb {
                    let mz = (m[2] + iz * global[2] as i64) as f64;
                    let wz = powsinxx(PI * mz / global[2] as f64, two_p);
                    let kn = add(
                        add(scale(recip[0], mx), scale(recip[1], my)),
                        scale(recip[2], mz),
                    );
                    let knsq = dot(kn, kn);
                    numerator += dot(k, kn) / knsq * (-knsq * inv_4kappa_sq).exp() * wx * wy * wz;
                }
            }
        }
        let s = |a: usize| (PI * m[a] as f64 / global[a] as f64).sin().powi(2);
        let denominator = gf_denom(&gf_b, s(0), s(1), s(2));
        *g = 4.0 * PI / ksq * numerator / denominator;

        let vterm = -2.0 * (1.0 / ksq + inv_4kappa_sq);
        virial[[i, j, l]] = [
            1.0 + vterm * k[0] * k[0],
            vterm * k[0] * k[1],
            vterm * k[0] * k[2],
            1.0 + vterm * k[1] * k[1],
            vterm * k[1] * k[2],
            1.0 + vterm * k[2] * k[2],
        ];
    }
    Ok(InfluenceTable {
        green,
        kvec,
        virial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::brick_for_rank;
    use pppm_types::state::SimBox;

    fn host_geometry(n: usize, order: usize, simbox: SimBox) -> MeshGeometry {
        let tile = brick_for_rank([n, n, n], [1, 1, 1], 0).expect("tile");
        MeshGeometry::new(tile, order, 0.0, &simbox).expect("geometry")
    }

    #[test]
    fn test_miller_index_folding() {
        let folded: Vec<i64> = (0..8).map(|m| miller_index(m, 8)).collect();
        assert_eq!(folded, vec![0, 1, 2, 3, -4, -3, -2, -1]);
        let folded: Vec<i64> = (0..5).map(|m| miller_index(m, 5)).collect();
        assert_eq!(folded, vec![0, 1, 2, -2, -1]);
    }

    #[test]
    fn test_zero_mode_has_no_weight() {
        let geom = host_geometry(8, 4, SimBox::cubic(10.0));
        let table = solve_influence(&geom, 0.4, 2, None).expect("influence");
        assert_eq!(table.green()[[0, 0, 0]], 0.0);
        assert!(table.green().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_low_k_is_deconvolved_ewald_kernel() {
        // At the first harmonic of a fine mesh the aliases vanish and G
        // reduces to the Ewald kernel divided by the squared stencil transform.
        let l = 10.0;
        let kappa = 0.3;
        let order = 5;
        let geom = host_geometry(32, order, SimBox::cubic(l));
        let table = solve_influence(&geom, kappa, 2, None).expect("influence");
        let k = 2.0 * PI / l;
        let ewald = 4.0 * PI / (k * k) * (-k * k / (4.0 * kappa * kappa)).exp();
        let u2 = powsinxx(PI / 32.0, 2 * order as i32);
        let g = table.green()[[1, 0, 0]];
        assert!((g * u2 - ewald).abs() / ewald < 1e-6, "G={g} ewald={ewald}");
        assert!(g > ewald);
    }

    #[test]
    fn test_influence_symmetric_under_k_inversion() {
        let geom = host_geometry(8, 3, SimBox::orthorhombic([6.0, 7.0, 9.0]));
        let table = solve_influence(&geom, 0.5, 2, None).expect("influence");
        let g = table.green();
        for ((i, j, l), v) in g.indexed_iter() {
            let mirror = g[[(8 - i) % 8, (8 - j) % 8, (8 - l) % 8]];
            assert!((v - mirror).abs() <= 1e-12 * v.abs().max(1.0));
        }
    }

    #[test]
    fn test_short_wave_cutoff_zeroes_high_k() {
        let l = 8.0;
        let geom = host_geometry(8, 4, SimBox::cubic(l));
        let k1 = 2.0 * PI / l;
        let table = solve_influence(&geom, 0.5, 2, Some(1.5 * k1 * k1)).expect("influence");
        assert!(table.green()[[1, 0, 0]] > 0.0);
        assert_eq!(table.green()[[1, 1, 0]], 0.0);
    }

    #[test]
    fn test_virial_weight_trace() {
        let geom = host_geometry(8, 4, SimBox::cubic(8.0));
        let kappa = 0.5;
        let table = solve_influence(&geom, kappa, 1, None).expect("influence");
        let k = table.kvec()[[2, 1, 0]];
        let ksq = dot(k, k);
        let v = table.virial()[[2, 1, 0]];
        let trace = v[0] + v[3] + v[5];
        let expected = 3.0 - 2.0 * (1.0 + ksq / (4.0 * kappa * kappa));
        assert!((trace - expected).abs() < 1e-12);
    }

    #[test]
    fn test_triclinic_k_vectors_are_reciprocal() {
        let simbox = SimBox::triclinic([5.0, 6.0, 7.0], [0.2, -0.1, 0.3]);
        let geom = host_geometry(4, 2, simbox);
        let table = solve_influence(&geom, 0.6, 1, None).expect("influence");
        let [a1, a2, a3] = simbox.lattice_vectors();
        let k = table.kvec()[[1, 3, 2]];
        // m = (1, -1, -2): k·a_b = 2π m_b
        assert!((dot(k, a1) - 2.0 * PI).abs() < 1e-12);
        assert!((dot(k, a2) + 2.0 * PI).abs() < 1e-12);
        assert!((dot(k, a3) + 4.0 * PI).abs() < 1e-12);
    }
}
