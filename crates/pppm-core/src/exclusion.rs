// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Exclusion Correction
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Removal of the reciprocal-space interaction between excluded pairs.
//!
//! The mesh sum contains the smooth part q_i q_j erf(κr)/r of every pair.
//! For bonded (excluded) pairs that term is subtracted here, together with
//! its force and virial.

use pppm_types::constants::FRAC_1_SQRT_PI;
use pppm_types::error::{PppmError, PppmResult};
use pppm_types::state::{ExclusionList, ParticleGroup, ParticleView, SimBox, Virial};
use pppm_types::vec3::{dot, sub, Vec3};
use statrs::function::erf::erf;

/// Below this separation the r → 0 limit of the pair term is used.
const MIN_PAIR_SEPARATION_SQ: f64 = 1e-24;

/// Energy and virial removed by the exclusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExclusionCorrection {
    pub energy: f64,
    pub virial: Virial,
}

/// Subtract the excluded pairs' smooth interaction.
///
/// A pair's force is applied to each endpoint that is a member of `group`;
/// its energy and virial are counted only where the first index is a
/// member, so a pair split across partitions is counted once.
pub fn correct_exclusions(
    view: &ParticleView<'_>,
    group: &ParticleGroup,
    exclusions: &ExclusionList,
    simbox: &SimBox,
    kappa: f64,
    forces: &mut [Vec3],
) -> PppmResult<ExclusionCorrection> {
    if forces.len() != view.len() {
        return Err(PppmError::PhysicsViolation(format!(
            "force buffer holds {} entries for {} particles",
            forces.len(),
            view.len()
        )));
    }
    let member = |i: usize| group.members().binary_search(&i).is_ok();
    let two_kappa_over_sqrt_pi = 2.0 * kappa * FRAC_1_SQRT_PI;
    let mut out = ExclusionCorrection::default();

    for &(i, j) in exclusions.pairs() {
        if i >= view.len() || j >= view.len() {
            return Err(PppmError::PhysicsViolation(format!(
                "excluded pair ({i}, {j}) out of range for {} particles",
                view.len()
            )));
        }
        let (owns_i, owns_j) = (member(i), member(j));
        if !owns_i && !owns_j {
            continue;
        }
        let qiqj = view.charge[i] * view.charge[j];
        if qiqj == 0.0 {
            continue;
        }
        let dr = simbox.min_image(sub(view.position[i], view.position[j]));
        let rsq = dot(dr, dr);

        let (energy, f_div_r) = if rsq < MIN_PAIR_SEPARATION_SQ {
            (qiqj * two_kappa_over_sqrt_pi, 0.0)
        } else {
            let r = rsq.sqrt();
            let erf_term = erf(kappa * r) / r;
            let gauss = two_kappa_over_sqrt_pi * (-kappa * kappa * rsq).exp();
            (qiqj * erf_term, qiqj * (erf_term - gauss) / rsq)
        };

        if owns_i {
            for a in 0..3 {
                forces[i][a] -= f_div_r * dr[a];
            }
            out.energy -= energy;
            out.virial[0] -= f_div_r * dr[0] * dr[0];
            out.virial[1] -= f_div_r * dr[0] * dr[1];
            out.virial[2] -= f_div_r * dr[0] * dr[2];
            out.virial[3] -= f_div_r * dr[1] * dr[1];
            out.virial[4] -= f_div_r * dr[1] * dr[2];
            out.virial[5] -= f_div_r * dr[2] * dr[2];
        }
        if owns_j {
            for a in 0..3 {
                forces[j][a] += f_div_r * dr[a];
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_run(pos: [Vec3; 2], q: [f64; 2], group: ParticleGroup) -> (ExclusionCorrection, Vec<Vec3>) {
        let view = ParticleView::new(&pos, &q).expect("view");
        let excl = ExclusionList::from_pairs(vec![(0, 1)]).expect("pairs");
        let mut forces = vec![[0.0; 3]; 2];
        let out = correct_exclusions(&view, &group, &excl, &SimBox::cubic(20.0), 0.4, &mut forces)
            .expect("exclusions");
        (out, forces)
    }

    #[test]
    fn test_opposite_charges_lose_attraction() {
        let (out, forces) = pair_run([[1.0, 1.0, 1.0], [2.5, 1.0, 1.0]], [1.0, -1.0], ParticleGroup::all(2));
        // The removed smooth interaction was attractive, so the correction
        // raises the energy and pushes the pair apart.
        assert!(out.energy > 0.0);
        assert!(forces[0][0] < 0.0 && forces[1][0] > 0.0);
        assert!((forces[0][0] + forces[1][0]).abs() < 1e-15);
        assert!(out.virial[0] > 0.0);
        assert_eq!(forces[0][1], 0.0);
    }

    #[test]
    fn test_energy_matches_erf_over_r() {
        let r: f64 = 1.5;
        let (out, _) = pair_run([[0.0; 3], [0.0, r, 0.0]], [2.0, 3.0], ParticleGroup::all(2));
        let expected = -6.0 * erf(0.4 * r) / r;
        assert!((out.energy - expected).abs() < 1e-14);
    }

    #[test]
    fn test_force_is_energy_gradient() {
        let h = 1e-6;
        let e = |x: f64| pair_run([[x, 0.3, 0.0], [1.0, 0.0, 0.2]], [1.0, 2.0], ParticleGroup::all(2)).0.energy;
        let (_, forces) = pair_run([[2.0, 0.3, 0.0], [1.0, 0.0, 0.2]], [1.0, 2.0], ParticleGroup::all(2));
        let numeric = -(e(2.0 + h) - e(2.0 - h)) / (2.0 * h);
        assert!((forces[0][0] - numeric).abs() < 1e-7, "{} vs {numeric}", forces[0][0]);
    }

    #[test]
    fn test_pair_across_periodic_boundary_uses_min_image() {
        let (near, _) = pair_run([[0.5, 5.0, 5.0], [19.5, 5.0, 5.0]], [1.0, 1.0], ParticleGroup::all(2));
        let (direct, _) = pair_run([[0.5, 5.0, 5.0], [1.5, 5.0, 5.0]], [1.0, 1.0], ParticleGroup::all(2));
        assert!((near.energy - direct.energy).abs() < 1e-12);
    }

    #[test]
    fn test_split_pair_counted_once() {
        let pos = [[1.0, 1.0, 1.0], [2.0, 1.5, 1.0]];
        let (first, f_first) = pair_run(pos, [1.0, 1.0], ParticleGroup::from_indices(vec![0]));
        let (second, f_second) = pair_run(pos, [1.0, 1.0], ParticleGroup::from_indices(vec![1]));
        let (both, f_both) = pair_run(pos, [1.0, 1.0], ParticleGroup::all(2));
        assert!((first.energy + second.energy - both.energy).abs() < 1e-15);
        assert_eq!(second.energy, 0.0);
        assert_eq!(f_first[0], f_both[0]);
        assert_eq!(f_second[1], f_both[1]);
    }

    #[test]
    fn test_coincident_pair_uses_limit() {
        let (out, forces) = pair_run([[3.0; 3], [3.0; 3]], [1.0, 1.0], ParticleGroup::all(2));
        assert!((out.energy + 2.0 * 0.4 * FRAC_1_SQRT_PI).abs() < 1e-14);
        assert_eq!(forces[0], [0.0; 3]);
    }
}
