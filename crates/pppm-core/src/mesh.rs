// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Mesh Geometry
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Local mesh sizing, ghost layout and the box-to-mesh mapping.
//!
//! A partition stores its brick of inner cells padded by `ghost[a]` cells
//! on both faces of every decomposed axis:
//!
//! ```text
//!   [0, g)          lower ghost   (mirrors the lower neighbour's top cells)
//!   [g, g + n)      inner cells   (owned)
//!   [g + n, 2g + n) upper ghost   (mirrors the upper neighbour's bottom cells)
//! ```
//!
//! Axes held by a single partition carry no ghosts; stencil indices wrap
//! periodically there instead.

use ndarray::{s, Array3, ArrayView3, ArrayViewMut3};
use num_complex::Complex64;
use pppm_types::error::{PppmError, PppmResult};
use pppm_types::state::SimBox;
use pppm_types::vec3::Vec3;

use crate::domain::BrickTile;

/// Fold a fractional coordinate into [0, 1).
pub fn wrap_unit(f: f64) -> f64 {
    let w = f - f.floor();
    if w >= 1.0 {
        0.0
    } else {
        w
    }
}

#[derive(Debug, Clone)]
pub struct MeshGeometry {
    tile: BrickTile,
    order: usize,
    ghost: [usize; 3],
    simbox: SimBox,
    ghost_width: Vec3,
    cell_volume: f64,
}

impl MeshGeometry {
    /// Lay out the local mesh for `tile`.
    ///
    /// Decomposed axes get `ceil(order/2)` ghost cells plus enough cells to
    /// cover `ghost_skin / 2` of particle drift. Fails if the ghost layer is
    /// wider than half the local brick.
    pub fn new(tile: BrickTile, order: usize, ghost_skin: f64, simbox: &SimBox) -> PppmResult<Self> {
        simbox.validate()?;
        if order == 0 {
            return Err(PppmError::ConfigError(
                "interpolation order must be >= 1".to_string(),
            ));
        }
        if !ghost_skin.is_finite() || ghost_skin < 0.0 {
            return Err(PppmError::ConfigError(format!(
                "ghost_skin must be finite and >= 0, got {ghost_skin}"
            )));
        }
        let radius = order.div_ceil(2);
        let planes = simbox.nearest_plane_distance();
        let local = tile.local_dims();
        let mut ghost = [0usize; 3];
        let mut ghost_width = [0.0; 3];
        for axis in 0..3 {
            let spacing = planes[axis] / tile.global[axis] as f64;
            if !tile.is_decomposed(axis) {
                continue;
            }
            let skin_cells = (0.5 * ghost_skin / spacing).ceil() as usize;
            ghost[axis] = radius + skin_cells;
            if 2 * ghost[axis] > local[axis] {
                return Err(PppmError::ConfigError(format!(
                    "ghost layer of {} cells exceeds half the local brick ({} cells) on axis {axis}; \
                     use fewer partitions or a finer mesh",
                    ghost[axis], local[axis]
                )));
            }
            ghost_width[axis] = ghost[axis] as f64 * spacing;
        }
        let ncells = (tile.global[0] * tile.global[1] * tile.global[2]) as f64;
        Ok(MeshGeometry {
            cell_volume: simbox.volume() / ncells,
            tile,
            order,
            ghost,
            simbox: *simbox,
            ghost_width,
        })
    }

    pub fn tile(&self) -> &BrickTile {
        &self.tile
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn simbox(&self) -> &SimBox {
        &self.simbox
    }

    pub fn global_dims(&self) -> [usize; 3] {
        self.tile.global
    }

    pub fn local_dims(&self) -> [usize; 3] {
        self.tile.local_dims()
    }

    /// Global index of the first inner cell.
    pub fn offset(&self) -> [usize; 3] {
        self.tile.start
    }

    pub fn ghost_cells(&self) -> [usize; 3] {
        self.ghost
    }

    /// Padded local dimensions: inner plus ghosts on both faces.
    pub fn grid_dims(&self) -> [usize; 3] {
        let n = self.local_dims();
        [
            n[0] + 2 * self.ghost[0],
            n[1] + 2 * self.ghost[1],
            n[2] + 2 * self.ghost[2],
        ]
    }

    /// Physical thickness of the ghost layer along each axis.
    pub fn ghost_width(&self) -> Vec3 {
        self.ghost_width
    }

    /// Box volume divided by the number of global mesh cells.
    pub fn cell_volume(&self) -> f64 {
        self.cell_volume
    }

    pub fn zeroed_mesh(&self) -> Array3<Complex64> {
        let d = self.grid_dims();
        Array3::zeros((d[0], d[1], d[2]))
    }

    pub fn zeroed_inner(&self) -> Array3<Complex64> {
        let d = self.local_dims();
        Array3::zeros((d[0], d[1], d[2]))
    }

    pub fn inner<'a>(&self, mesh: &'a Array3<Complex64>) -> ArrayView3<'a, Complex64> {
        let (g, n) = (self.ghost, self.local_dims());
        mesh.slice(s![g[0]..g[0] + n[0], g[1]..g[1] + n[1], g[2]..g[2] + n[2]])
    }

    pub fn inner_mut<'a>(&self, mesh: &'a mut Array3<Complex64>) -> ArrayViewMut3<'a, Complex64> {
        let (g, n) = (self.ghost, self.local_dims());
        mesh.slice_mut(s![g[0]..g[0] + n[0], g[1]..g[1] + n[1], g[2]..g[2] + n[2]])
    }

    /// Continuous mesh coordinate of `pos` in the padded local frame.
    ///
    /// On decomposed axes the coordinate is taken as the periodic image
    /// nearest to the brick centre, so particles just across the periodic
    /// boundary still land in this partition's ghost layer.
    pub fn reduced_coordinate(&self, pos: Vec3) -> Vec3 {
        let f = self.simbox.make_fraction(pos);
        let local = self.local_dims();
        let mut u = [0.0; 3];
        for axis in 0..3 {
            let n_global = self.tile.global[axis] as f64;
            let ug = wrap_unit(f[axis]) * n_global;
            if !self.tile.is_decomposed(axis) {
                u[axis] = ug;
                continue;
            }
            let half = 0.5 * local[axis] as f64;
            let mut d = ug - (self.tile.start[axis] as f64 + half);
            d -= n_global * (d / n_global).round();
            u[axis] = d + half + self.ghost[axis] as f64;
        }
        u
    }

    /// Map a stencil point index to a storage index along `axis`.
    ///
    /// Wraps on undecomposed axes; `None` if it falls outside the padded
    /// region of a decomposed axis.
    pub fn resolve_index(&self, axis: usize, idx: i64) -> Option<usize> {
        if !self.tile.is_decomposed(axis) {
            return Some(idx.rem_euclid(self.tile.global[axis] as i64) as usize);
        }
        let extent = self.grid_dims()[axis] as i64;
        (0..extent).contains(&idx).then_some(idx as usize)
    }

    /// Global mesh cell holding `pos`.
    pub fn global_cell(&self, pos: Vec3) -> [usize; 3] {
        let f = self.simbox.make_fraction(pos);
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let n = self.tile.global[axis];
            cell[axis] = ((wrap_unit(f[axis]) * n as f64).floor() as usize).min(n - 1);
        }
        cell
    }
}
