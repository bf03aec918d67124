// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Data consumed from the particle store and handed back to it.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::error::{PppmError, PppmResult};
use crate::vec3::{cross, norm, sub, Vec3};

/// Virial tensor components in (xx, xy, xz, yy, yz, zz) order.
pub type Virial = [f64; 6];

/// Periodic simulation box.
///
/// Lattice vectors:
///   a1 = (Lx, 0, 0)
///   a2 = (xy·Ly, Ly, 0)
///   a3 = (xz·Lz, yz·Lz, Lz)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimBox {
    /// Lower corner.
    pub lo: Vec3,
    /// Edge lengths (Lx, Ly, Lz).
    pub lengths: Vec3,
    /// Tilt factors (xy, xz, yz).
    #[serde(default)]
    pub tilt: Vec3,
}

impl SimBox {
    pub fn cubic(l: f64) -> Self {
        Self::orthorhombic([l, l, l])
    }

    pub fn orthorhombic(lengths: Vec3) -> Self {
        SimBox {
            lo: [0.0; 3],
            lengths,
            tilt: [0.0; 3],
        }
    }

    pub fn triclinic(lengths: Vec3, tilt: Vec3) -> Self {
        SimBox {
            lo: [0.0; 3],
            lengths,
            tilt,
        }
    }

    pub fn validate(&self) -> PppmResult<()> {
        if self.lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(PppmError::ConfigError(format!(
                "box lengths must be finite and > 0, got {:?}",
                self.lengths
            )));
        }
        if self.tilt.iter().any(|t| !t.is_finite()) || self.lo.iter().any(|v| !v.is_finite()) {
            return Err(PppmError::ConfigError(
                "box origin and tilt factors must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lattice_vectors(&self) -> [Vec3; 3] {
        let [lx, ly, lz] = self.lengths;
        let [xy, xz, yz] = self.tilt;
        [[lx, 0.0, 0.0], [xy * ly, ly, 0.0], [xz * lz, yz * lz, lz]]
    }

    /// Box volume (the lattice matrix is upper triangular).
    pub fn volume(&self) -> f64 {
        self.lengths[0] * self.lengths[1] * self.lengths[2]
    }

    /// Reciprocal lattice b_i with a_i · b_j = 2π δ_ij.
    pub fn reciprocal_vectors(&self) -> [Vec3; 3] {
        let [a1, a2, a3] = self.lattice_vectors();
        let v = self.volume();
        let f = TAU / v;
        let b1 = cross(a2, a3);
        let b2 = cross(a3, a1);
        let b3 = cross(a1, a2);
        [
            [b1[0] * f, b1[1] * f, b1[2] * f],
            [b2[0] * f, b2[1] * f, b2[2] * f],
            [b3[0] * f, b3[1] * f, b3[2] * f],
        ]
    }

    /// Fractional coordinates of `r` (0 at `lo`, 1 at the opposite face).
    /// Not wrapped.
    pub fn make_fraction(&self, r: Vec3) -> Vec3 {
        let d = sub(r, self.lo);
        let [lx, ly, lz] = self.lengths;
        let [xy, xz, yz] = self.tilt;
        let f3 = d[2] / lz;
        let f2 = (d[1] - f3 * yz * lz) / ly;
        let f1 = (d[0] - f2 * xy * ly - f3 * xz * lz) / lx;
        [f1, f2, f3]
    }

    /// Minimum-image displacement.
    pub fn min_image(&self, mut d: Vec3) -> Vec3 {
        let [a1, a2, a3] = self.lattice_vectors();
        for (axis, a) in [(2usize, a3), (1, a2), (0, a1)] {
            let n = (d[axis] / self.lengths[axis]).round();
            if n != 0.0 {
                d = [d[0] - n * a[0], d[1] - n * a[1], d[2] - n * a[2]];
            }
        }
        d
    }

    /// Distance between opposite faces along each lattice direction.
    pub fn nearest_plane_distance(&self) -> Vec3 {
        let [a1, a2, a3] = self.lattice_vectors();
        let v = self.volume();
        [
            v / norm(cross(a2, a3)),
            v / norm(cross(a3, a1)),
            v / norm(cross(a1, a2)),
        ]
    }

    /// Whether `other` describes the same periodic cell.
    pub fn same_geometry(&self, other: &SimBox) -> bool {
        self.lengths == other.lengths && self.tilt == other.tilt
    }
}

/// Box-change notification passed into every force evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoxSignal {
    #[default]
    Unchanged,
    /// The box was resized or sheared; carries the new geometry.
    Changed(SimBox),
}

/// Read-only snapshot of the particle store for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ParticleView<'a> {
    pub position: &'a [Vec3],
    pub charge: &'a [f64],
}

impl<'a> ParticleView<'a> {
    pub fn new(position: &'a [Vec3], charge: &'a [f64]) -> PppmResult<Self> {
        if position.len() != charge.len() {
            return Err(PppmError::PhysicsViolation(format!(
                "position/charge length mismatch: {} vs {}",
                position.len(),
                charge.len()
            )));
        }
        Ok(ParticleView { position, charge })
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

/// Indices of the particles the solver acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleGroup {
    members: Vec<usize>,
}

impl ParticleGroup {
    pub fn all(n: usize) -> Self {
        ParticleGroup {
            members: (0..n).collect(),
        }
    }

    pub fn from_indices(mut members: Vec<usize>) -> Self {
        members.sort_unstable();
        members.dedup();
        ParticleGroup { members }
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every member must index into a view of `n` particles.
    pub fn check_bounds(&self, n: usize) -> PppmResult<()> {
        match self.members.last() {
            Some(&last) if last >= n => Err(PppmError::PhysicsViolation(format!(
                "group member {last} out of range for {n} particles"
            ))),
            _ => Ok(()),
        }
    }
}

/// Excluded particle pairs (indices into the particle view).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    pairs: Vec<(usize, usize)>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(usize, usize)>) -> PppmResult<Self> {
        if let Some(&(i, _)) = pairs.iter().find(|(i, j)| i == j) {
            return Err(PppmError::PhysicsViolation(format!(
                "particle {i} excluded from itself"
            )));
        }
        Ok(ExclusionList { pairs })
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
