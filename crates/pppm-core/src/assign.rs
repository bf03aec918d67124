// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Charge Assignment
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Charge assignment onto the mesh and its adjoint, force interpolation.
//!
//! Both directions evaluate the same separable stencil, so the mesh force
//! on a pair of particles is antisymmetric to round-off.

use ndarray::Array3;
use num_complex::Complex64;
use pppm_math::stencil::StencilTable;
use pppm_types::constants::PPPM_MAX_ORDER;
use pppm_types::error::{PppmError, PppmResult};
use pppm_types::state::{ParticleGroup, ParticleView};
use pppm_types::vec3::{is_finite, Vec3};

use crate::mesh::MeshGeometry;

/// Mesh points and weights touched by one particle.
struct Footprint {
    order: usize,
    index: [[usize; PPPM_MAX_ORDER]; 3],
    weight: [[f64; PPPM_MAX_ORDER]; 3],
}

impl Footprint {
    fn locate(geom: &MeshGeometry, stencil: &StencilTable, pos: Vec3, particle: usize) -> PppmResult<Self> {
        if !is_finite(pos) {
            return Err(PppmError::PhysicsViolation(format!(
                "particle {particle} has non-finite position {pos:?}"
            )));
        }
        let order = stencil.order();
        let u = geom.reduced_coordinate(pos);
        let mut fp = Footprint {
            order,
            index: [[0; PPPM_MAX_ORDER]; 3],
            weight: [[0.0; PPPM_MAX_ORDER]; 3],
        };
        let mut base = [0i64; 3];
        for axis in 0..3 {
            let (b, dx) = stencil.locate(u[axis]);
            base[axis] = b;
            stencil.weights(dx, &mut fp.weight[axis][..order]);
        }
        for axis in 0..3 {
            for m in 0..order {
                let idx = base[axis] + stencil.nlower() + m as i64;
                fp.index[axis][m] = geom.resolve_index(axis, idx).ok_or(
                    PppmError::ParticleOutOfBounds {
                        index: particle,
                        cell: base,
                    },
                )?;
            }
        }
        Ok(fp)
    }

    fn points(&self) -> impl Iterator<Item = ([usize; 3], f64)> + '_ {
        let n = self.order;
        (0..n).flat_map(move |a| {
            (0..n).flat_map(move |b| {
                (0..n).map(move |c| {
                    (
                        [self.index[0][a], self.index[1][b], self.index[2][c]],
                        self.weight[0][a] * self.weight[1][b] * self.weight[2][c],
                    )
                })
            })
        })
    }
}

fn check_mesh(geom: &MeshGeometry, mesh: &Array3<Complex64>, label: &str) -> PppmResult<()> {
    let (a, b, c) = mesh.dim();
    if [a, b, c] != geom.grid_dims() {
        return Err(PppmError::PhysicsViolation(format!(
            "{label} mesh shape {:?} does not match padded grid {:?}",
            [a, b, c],
            geom.grid_dims()
        )));
    }
    Ok(())
}

/// Deposit the charge density of every group member onto `mesh`.
///
/// Overwrites the whole padded mesh: real part is charge per cell volume,
/// imaginary part zero.
pub fn assign_charges(
    mesh: &mut Array3<Complex64>,
    geom: &MeshGeometry,
    stencil: &StencilTable,
    view: &ParticleView<'_>,
    group: &ParticleGroup,
) -> PppmResult<()> {
    check_mesh(geom, mesh, "charge")?;
    group.check_bounds(view.len())?;
    mesh.fill(Complex64::new(0.0, 0.0));
    let inv_cell = 1.0 / geom.cell_volume();
    for &i in group.members() {
        let q = view.charge[i];
        if q == 0.0 {
            continue;
        }
        let fp = Footprint::locate(geom, stencil, view.position[i], i)?;
        let density = q * inv_cell;
        for (idx, w) in fp.points() {
            mesh[idx].re += density * w;
        }
    }
    Ok(())
}

/// Interpolate the three field meshes onto group members:
/// `F_i = q_i · Σ W · E`. Non-members are left untouched.
pub fn interpolate_forces(
    fields: &[Array3<Complex64>; 3],
    geom: &MeshGeometry,
    stencil: &StencilTable,
    view: &ParticleView<'_>,
    group: &ParticleGroup,
    forces: &mut [Vec3],
) -> PppmResult<()> {
    for field in fields {
        check_mesh(geom, field, "field")?;
    }
    group.check_bounds(view.len())?;
    if forces.len() != view.len() {
        return Err(PppmError::PhysicsViolation(format!(
            "force buffer holds {} entries for {} particles",
            forces.len(),
            view.len()
        )));
    }
    for &i in group.members() {
        let q = view.charge[i];
        if q == 0.0 {
            forces[i] = [0.0; 3];
            continue;
        }
        let fp = Footprint::locate(geom, stencil, view.position[i], i)?;
        let mut e = [0.0; 3];
        for (idx, w) in fp.points() {
            for axis in 0..3 {
                e[axis] += w * fields[axis][idx].re;
            }
        }
        forces[i] = [q * e[0], q * e[1], q * e[2]];
    }
    Ok(())
}

/// Stencil-weighted average of the real part of `mesh` at `pos`.
pub fn interpolate_scalar(
    mesh: &Array3<Complex64>,
    geom: &MeshGeometry,
    stencil: &StencilTable,
    pos: Vec3,
) -> PppmResult<f64> {
    check_mesh(geom, mesh, "scalar")?;
    let fp = Footprint::locate(geom, stencil, pos, 0)?;
    Ok(fp.points().map(|(idx, w)| w * mesh[idx].re).sum())
}

/// Total charge held by the inner cells of `mesh`.
pub fn deposited_charge(mesh: &Array3<Complex64>, geom: &MeshGeometry) -> f64 {
    geom.inner(mesh).iter().map(|c| c.re).sum::<f64>() * geom.cell_volume()
}
