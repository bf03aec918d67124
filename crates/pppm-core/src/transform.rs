// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Transform Backends
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Mesh transform and ghost-communication backends.
//!
//! Both backends transform the inner brick of a partition and leave the
//! result in the same brick layout: element `(i, j, k)` of the k-space
//! array is the coefficient for global Miller indices `offset + (i, j, k)`.
//! Neither direction normalises.

use log::debug;
use ndarray::{Array3, Axis};
use num_complex::Complex64;
use pppm_math::fft::{line_plans, transform_axis, Fft3Plan, LinePlan, TransformDirection};
use pppm_types::error::{PppmError, PppmResult};

use crate::comm::{CollectiveOp, Communicator};
use crate::domain::{balanced_split, BrickTile};
use crate::halo;
use crate::mesh::MeshGeometry;

/// Transform, ghost exchange and reduction used by the engine.
///
/// Every method except `initialize` is collective on distributed
/// backends: all partitions must call it the same number of times and in
/// the same order.
pub trait MeshBackend {
    fn rank(&self) -> usize;

    fn nranks(&self) -> usize;

    /// Partitions along (x, y, z).
    fn process_grid(&self) -> [usize; 3];

    /// Build transform plans for the given layout.
    fn initialize(&mut self, geometry: &MeshGeometry) -> PppmResult<()>;

    /// Unnormalised forward transform of the inner brick, e^{-ik·r}.
    fn forward(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()>;

    /// Unnormalised inverse transform of the inner brick, e^{+ik·r}.
    fn inverse(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()>;

    /// Additive ghost reduction after charge assignment.
    fn reduce_ghosts(&mut self, mesh: &mut Array3<Complex64>) -> PppmResult<()>;

    /// Ghost copy before force interpolation.
    fn fill_ghosts(&mut self, mesh: &mut Array3<Complex64>) -> PppmResult<()>;

    /// Global element-wise sum.
    fn all_reduce_sum(&mut self, values: &mut [f64]) -> PppmResult<()>;
}

fn not_initialized() -> PppmError {
    PppmError::ConfigError("transform backend used before initialize".to_string())
}

/// Single-partition backend: plain 3D FFT, periodic wrap instead of ghosts.
#[derive(Default)]
pub struct HostBackend {
    plan: Option<Fft3Plan>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeshBackend for HostBackend {
    fn rank(&self) -> usize {
        0
    }

    fn nranks(&self) -> usize {
        1
    }

    fn process_grid(&self) -> [usize; 3] {
        [1, 1, 1]
    }

    fn initialize(&mut self, geometry: &MeshGeometry) -> PppmResult<()> {
        let dims = geometry.global_dims();
        if self.plan.as_ref().map(Fft3Plan::dims) != Some(dims) {
            debug!("planning host FFT for mesh {dims:?}");
            self.plan = Some(Fft3Plan::new(dims)?);
        }
        Ok(())
    }

    fn forward(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()> {
        self.plan.as_ref().ok_or_else(not_initialized)?.forward(inner)
    }

    fn inverse(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()> {
        self.plan.as_ref().ok_or_else(not_initialized)?.inverse(inner)
    }

    fn reduce_ghosts(&mut self, _mesh: &mut Array3<Complex64>) -> PppmResult<()> {
        Ok(())
    }

    fn fill_ghosts(&mut self, _mesh: &mut Array3<Complex64>) -> PppmResult<()> {
        Ok(())
    }

    fn all_reduce_sum(&mut self, _values: &mut [f64]) -> PppmResult<()> {
        Ok(())
    }
}

/// Brick-decomposed backend over a [`Communicator`].
///
/// Along each decomposed axis the partitions of one line group trade lane
/// segments so that each holds complete lines for a share of the lanes,
/// run the 1D transforms, and trade the results back.
pub struct DistributedBackend<C: Communicator> {
    comm: C,
    pgrid: [usize; 3],
    geometry: Option<MeshGeometry>,
    lines: Option<[LinePlan; 3]>,
}

impl<C: Communicator> DistributedBackend<C> {
    pub fn new(comm: C, pgrid: [usize; 3]) -> PppmResult<Self> {
        let nranks: usize = pgrid.iter().product();
        if nranks != comm.size() {
            return Err(PppmError::ConfigError(format!(
                "process grid {pgrid:?} needs {nranks} ranks, communicator has {}",
                comm.size()
            )));
        }
        Ok(DistributedBackend {
            comm,
            pgrid,
            geometry: None,
            lines: None,
        })
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    fn execute(&mut self, inner: &mut Array3<Complex64>, direction: TransformDirection) -> PppmResult<()> {
        let geometry = self.geometry.as_ref().ok_or_else(not_initialized)?;
        let lines = self.lines.as_ref().ok_or_else(not_initialized)?;
        let (nx, ny, nz) = inner.dim();
        if [nx, ny, nz] != geometry.local_dims() {
            return Err(PppmError::PhysicsViolation(format!(
                "brick shape {:?} does not match local mesh {:?}",
                [nx, ny, nz],
                geometry.local_dims()
            )));
        }
        for axis in [2, 1, 0] {
            if geometry.tile().is_decomposed(axis) {
                pencil_axis(&mut self.comm, geometry.tile(), inner, axis, &lines[axis], direction)?;
            } else {
                transform_axis(inner, axis, &lines[axis], direction)?;
            }
        }
        Ok(())
    }
}

/// Transform one decomposed axis of a brick via two all-to-all rounds.
fn pencil_axis<C: Communicator>(
    comm: &mut C,
    tile: &BrickTile,
    data: &mut Array3<Complex64>,
    axis: usize,
    plan: &LinePlan,
    direction: TransformDirection,
) -> PppmResult<()> {
    let group = tile.line_group(axis);
    let p = group.len();
    let me = tile.coords[axis];
    let seg = data.len_of(Axis(axis));
    let full = seg * p;
    if plan.len() != full {
        return Err(PppmError::PhysicsViolation(format!(
            "axis {axis} plan expects {} points, line group spans {full}",
            plan.len()
        )));
    }

    let segments: Vec<Complex64> = data
        .lanes(Axis(axis))
        .into_iter()
        .flat_map(|lane| lane.to_vec())
        .collect();
    let nlanes = segments.len() / seg;
    let counts = balanced_split(nlanes, p);
    let starts: Vec<usize> = counts
        .iter()
        .scan(0, |acc, &c| {
            let s = *acc;
            *acc += c;
            Some(s)
        })
        .collect();
    let op = CollectiveOp::Transpose { axis };

    // Round 1: lane chunk j goes to member j.
    let outgoing = (0..p)
        .map(|j| {
            let range = starts[j] * seg..(starts[j] + counts[j]) * seg;
            (group[j], segments[range].to_vec())
        })
        .collect();
    let pieces = comm.exchange(op, outgoing, &group)?;
    let mine = counts[me];
    for (c, piece) in pieces.iter().enumerate() {
        if piece.len() != mine * seg {
            return Err(PppmError::CollectiveProtocol {
                rank: tile.rank,
                expected: format!("{op} chunk of {} values", mine * seg),
                found: format!("{} values from group member {c}", piece.len()),
            });
        }
    }
    let mut lines = vec![Complex64::new(0.0, 0.0); mine * full];
    for (c, piece) in pieces.iter().enumerate() {
        for l in 0..mine {
            lines[l * full + c * seg..l * full + (c + 1) * seg]
                .copy_from_slice(&piece[l * seg..(l + 1) * seg]);
        }
    }
    plan.process(direction, &mut lines)?;

    // Round 2: segment c of every line returns to member c.
    let outgoing = (0..p)
        .map(|c| {
            let mut back = Vec::with_capacity(mine * seg);
            for l in 0..mine {
                back.extend_from_slice(&lines[l * full + c * seg..l * full + (c + 1) * seg]);
            }
            (group[c], back)
        })
        .collect();
    let returned = comm.exchange(op, outgoing, &group)?;
    for (j, piece) in returned.iter().enumerate() {
        if piece.len() != counts[j] * seg {
            return Err(PppmError::CollectiveProtocol {
                rank: tile.rank,
                expected: format!("{op} return of {} values", counts[j] * seg),
                found: format!("{} values from group member {j}", piece.len()),
            });
        }
    }
    let mut chunk = 0usize;
    for (lane_idx, mut lane) in data.lanes_mut(Axis(axis)).into_iter().enumerate() {
        while lane_idx >= starts[chunk] + counts[chunk] {
            chunk += 1;
        }
        let at = (lane_idx - starts[chunk]) * seg;
        for (dst, src) in lane.iter_mut().zip(&returned[chunk][at..at + seg]) {
            *dst = *src;
        }
    }
    Ok(())
}

impl<C: Communicator> MeshBackend for DistributedBackend<C> {
    fn rank(&self) -> usize {
        self.comm.rank()
    }

    fn nranks(&self) -> usize {
        self.comm.size()
    }

    fn process_grid(&self) -> [usize; 3] {
        self.pgrid
    }

    fn initialize(&mut self, geometry: &MeshGeometry) -> PppmResult<()> {
        if geometry.tile().pgrid != self.pgrid || geometry.tile().rank != self.comm.rank() {
            return Err(PppmError::ConfigError(format!(
                "mesh brick for rank {} on grid {:?} handed to rank {} on grid {:?}",
                geometry.tile().rank,
                geometry.tile().pgrid,
                self.comm.rank(),
                self.pgrid
            )));
        }
        let dims = geometry.global_dims();
        self.lines = Some(line_plans(dims)?);
        debug!(
            "rank {}: distributed FFT for mesh {dims:?} over grid {:?}",
            self.comm.rank(),
            self.pgrid
        );
        self.geometry = Some(geometry.clone());
        Ok(())
    }

    fn forward(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()> {
        self.execute(inner, TransformDirection::Forward)
    }

    fn inverse(&mut self, inner: &mut Array3<Complex64>) -> PppmResult<()> {
        self.execute(inner, TransformDirection::Inverse)
    }

    fn reduce_ghosts(&mut self, mesh: &mut Array3<Complex64>) -> PppmResult<()> {
        let geometry = self.geometry.as_ref().ok_or_else(not_initialized)?;
        halo::reduce_ghosts(&mut self.comm, geometry, mesh)
    }

    fn fill_ghosts(&mut self, mesh: &mut Array3<Complex64>) -> PppmResult<()> {
        let geometry = self.geometry.as_ref().ok_or_else(not_initialized)?;
        halo::fill_ghosts(&mut self.comm, geometry, mesh)
    }

    fn all_reduce_sum(&mut self, values: &mut [f64]) -> PppmResult<()> {
        self.comm.all_reduce_sum(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{run_partitions, ThreadComm};
    use crate::domain::brick_for_rank;
    use pppm_math::fft::fft3;
    use pppm_types::state::SimBox;

    fn sample(cell: [usize; 3]) -> Complex64 {
        let [i, j, k] = cell.map(|c| c as f64);
        Complex64::new((0.3 * i + 0.7 * j).sin() + 0.1 * k, (0.2 * k - 0.5 * i).cos())
    }

    fn distributed_spectrum(global: [usize; 3], pgrid: [usize; 3]) -> Vec<(BrickTile, Array3<Complex64>)> {
        let nranks = pgrid.iter().product();
        run_partitions(nranks, |comm: ThreadComm| {
            let rank = comm.rank();
            let tile = brick_for_rank(global, pgrid, rank)?;
            let geom = MeshGeometry::new(tile.clone(), 1, 0.0, &SimBox::cubic(4.0))?;
            let mut backend = DistributedBackend::new(comm, pgrid)?;
            backend.initialize(&geom)?;
            let mut brick = geom.zeroed_inner();
            let off = geom.offset();
            for ((i, j, k), v) in brick.indexed_iter_mut() {
                *v = sample([off[0] + i, off[1] + j, off[2] + k]);
            }
            backend.forward(&mut brick)?;
            Ok((tile, brick))
        })
        .expect("partitions")
    }

    #[test]
    fn test_distributed_forward_matches_host() {
        let global = [8, 6, 4];
        let reference = fft3(&Array3::from_shape_fn((8, 6, 4), |(i, j, k)| sample([i, j, k])))
            .expect("host fft");
        for pgrid in [[2, 1, 1], [2, 3, 1], [1, 2, 2]] {
            for (tile, brick) in distributed_spectrum(global, pgrid) {
                for ((i, j, k), v) in brick.indexed_iter() {
                    let g = [tile.start[0] + i, tile.start[1] + j, tile.start[2] + k];
                    let diff = (v - reference[[g[0], g[1], g[2]]]).norm();
                    assert!(diff < 1e-10, "pgrid {pgrid:?} mode {g:?} off by {diff}");
                }
            }
        }
    }

    #[test]
    fn test_distributed_roundtrip() {
        let global = [4, 8, 4];
        let pgrid = [1, 2, 2];
        let out = run_partitions(4, |comm: ThreadComm| {
            let tile = brick_for_rank(global, pgrid, comm.rank())?;
            let geom = MeshGeometry::new(tile.clone(), 1, 0.0, &SimBox::cubic(4.0))?;
            let mut backend = DistributedBackend::new(comm, pgrid)?;
            backend.initialize(&geom)?;
            let original = Array3::from_shape_fn((4, 4, 2), |(i, j, k)| {
                sample([i, tile.start[1] + j, tile.start[2] + k])
            });
            let mut work = original.clone();
            backend.forward(&mut work)?;
            backend.inverse(&mut work)?;
            let scale = 1.0 / 128.0;
            Ok(work
                .iter()
                .zip(original.iter())
                .map(|(a, b)| (*a * scale - *b).norm())
                .fold(0.0, f64::max))
        })
        .expect("partitions");
        for err in out {
            assert!(err < 1e-12, "roundtrip error {err}");
        }
    }

    #[test]
    fn test_grid_must_match_communicator() {
        let comms = ThreadComm::create(2).expect("comm");
        let comm = comms.into_iter().next().expect("rank 0");
        assert!(DistributedBackend::new(comm, [2, 2, 1]).is_err());
    }

    #[test]
    fn test_host_backend_requires_initialize() {
        let mut backend = HostBackend::new();
        let mut data = Array3::zeros((2, 2, 2));
        assert!(matches!(
            backend.forward(&mut data),
            Err(PppmError::ConfigError(_))
        ));
    }
}
