// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Ghost Exchange
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Ghost-layer exchange between neighbouring bricks.
//!
//! Axes are processed x, y, z in turn. Each slab spans the full padded
//! extent of the other two axes, so edge and corner ghosts reach diagonal
//! neighbours after the second or third pass.

use ndarray::{Array3, ArrayViewMut3, Axis, Slice};
use num_complex::Complex64;
use pppm_types::error::{PppmError, PppmResult};
use std::ops::Range;

use crate::comm::{CollectiveOp, Communicator};
use crate::mesh::MeshGeometry;

pub(crate) fn pack_slab(mesh: &Array3<Complex64>, axis: usize, range: Range<usize>) -> Vec<Complex64> {
    mesh.slice_axis(Axis(axis), Slice::from(range))
        .iter()
        .copied()
        .collect()
}

fn slab_mut(mesh: &mut Array3<Complex64>, axis: usize, range: Range<usize>) -> ArrayViewMut3<'_, Complex64> {
    mesh.slice_axis_mut(Axis(axis), Slice::from(range))
}

fn check_len(received: &[Complex64], expected: usize, what: &str) -> PppmResult<()> {
    if received.len() != expected {
        return Err(PppmError::PhysicsViolation(format!(
            "{what} slab holds {} values, expected {expected}",
            received.len()
        )));
    }
    Ok(())
}

fn single(mut received: Vec<Vec<Complex64>>) -> PppmResult<Vec<Complex64>> {
    received
        .pop()
        .ok_or_else(|| PppmError::CommFailure("ghost exchange returned no slab".to_string()))
}

/// Sum ghost contributions into the neighbours' inner cells.
///
/// After this call every inner cell holds the full deposited charge,
/// including stencil tails written into ghosts by adjacent partitions.
pub fn reduce_ghosts<C: Communicator>(
    comm: &mut C,
    geom: &MeshGeometry,
    mesh: &mut Array3<Complex64>,
) -> PppmResult<()> {
    let tile = geom.tile().clone();
    let ghost = geom.ghost_cells();
    let local = geom.local_dims();
    for axis in 0..3 {
        if !tile.is_decomposed(axis) {
            continue;
        }
        let (g, n) = (ghost[axis], local[axis]);
        let lower = tile.neighbor_rank(axis, -1);
        let upper = tile.neighbor_rank(axis, 1);
        let op = CollectiveOp::GhostReduce { axis };

        // Lower ghost -> lower neighbour's top inner cells.
        let send = pack_slab(mesh, axis, 0..g);
        let recv = single(comm.exchange(op, vec![(lower, send)], &[upper])?)?;
        let mut dst = slab_mut(mesh, axis, n..n + g);
        check_len(&recv, dst.len(), "ghost-reduce")?;
        dst.iter_mut().zip(&recv).for_each(|(d, r)| *d += r);

        // Upper ghost -> upper neighbour's bottom inner cells.
        let send = pack_slab(mesh, axis, g + n..2 * g + n);
        let recv = single(comm.exchange(op, vec![(upper, send)], &[lower])?)?;
        let mut dst = slab_mut(mesh, axis, g..2 * g);
        check_len(&recv, dst.len(), "ghost-reduce")?;
        dst.iter_mut().zip(&recv).for_each(|(d, r)| *d += r);
    }
    Ok(())
}

/// Overwrite ghost cells with copies of the neighbours' boundary cells.
pub fn fill_ghosts<C: Communicator>(
    comm: &mut C,
    geom: &MeshGeometry,
    mesh: &mut Array3<Complex64>,
) -> PppmResult<()> {
    let tile = geom.tile().clone();
    let ghost = geom.ghost_cells();
    let local = geom.local_dims();
    for axis in 0..3 {
        if !tile.is_decomposed(axis) {
            continue;
        }
        let (g, n) = (ghost[axis], local[axis]);
        let lower = tile.neighbor_rank(axis, -1);
        let upper = tile.neighbor_rank(axis, 1);
        let op = CollectiveOp::GhostFill { axis };

        let send = pack_slab(mesh, axis, g..2 * g);
        let recv = single(comm.exchange(op, vec![(lower, send)], &[upper])?)?;
        let mut dst = slab_mut(mesh, axis, g + n..2 * g + n);
        check_len(&recv, dst.len(), "ghost-fill")?;
        dst.iter_mut().zip(&recv).for_each(|(d, r)| *d = *r);

        let send = pack_slab(mesh, axis, n..n + g);
        let recv = single(comm.exchange(op, vec![(upper, send)], &[lower])?)?;
        let mut dst = slab_mut(mesh, axis, 0..g);
        check_len(&recv, dst.len(), "ghost-fill")?;
        dst.iter_mut().zip(&recv).for_each(|(d, r)| *d = *r);
    }
    Ok(())
}
