// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Domain Decomposition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 3D Cartesian brick decomposition of the global mesh.
//!
//! The global (Nx × Ny × Nz) mesh is split over a (px × py × pz) process
//! grid. Every rank owns one contiguous brick; neighbours are periodic in
//! all three directions because the simulation box is.

use pppm_types::error::{PppmError, PppmResult};

/// Brick descriptor — one per rank in a (px × py × pz) topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickTile {
    /// Linear rank index (0 .. px*py*pz - 1).
    pub rank: usize,
    /// Position of this brick in the process grid.
    pub coords: [usize; 3],
    /// Process-grid extents.
    pub pgrid: [usize; 3],
    /// Global mesh dimensions.
    pub global: [usize; 3],
    /// Owned range [start, end) per axis in global mesh indexing.
    pub start: [usize; 3],
    pub end: [usize; 3],
}

impl BrickTile {
    /// Owned mesh points per axis (excluding ghosts).
    pub fn local_dims(&self) -> [usize; 3] {
        [
            self.end[0] - self.start[0],
            self.end[1] - self.start[1],
            self.end[2] - self.start[2],
        ]
    }

    /// Whether more than one rank shares this axis.
    pub fn is_decomposed(&self, axis: usize) -> bool {
        self.pgrid[axis] > 1
    }

    /// Rank of the periodic neighbour `delta` bricks away along `axis`.
    pub fn neighbor_rank(&self, axis: usize, delta: i64) -> usize {
        let p = self.pgrid[axis] as i64;
        let mut coords = self.coords;
        coords[axis] = (self.coords[axis] as i64 + delta).rem_euclid(p) as usize;
        rank_of(coords, self.pgrid)
    }

    /// Ranks sharing every coordinate but `axis`, ordered along `axis`.
    pub fn line_group(&self, axis: usize) -> Vec<usize> {
        (0..self.pgrid[axis])
            .map(|c| {
                let mut coords = self.coords;
                coords[axis] = c;
                rank_of(coords, self.pgrid)
            })
            .collect()
    }

    /// Whether the global mesh cell lies in this brick.
    pub fn owns_cell(&self, cell: [usize; 3]) -> bool {
        (0..3).all(|a| cell[a] >= self.start[a] && cell[a] < self.end[a])
    }
}

/// Linear rank of process-grid coordinates (x slowest, z fastest).
pub fn rank_of(coords: [usize; 3], pgrid: [usize; 3]) -> usize {
    (coords[0] * pgrid[1] + coords[1]) * pgrid[2] + coords[2]
}

/// Inverse of [`rank_of`].
pub fn coords_of(rank: usize, pgrid: [usize; 3]) -> [usize; 3] {
    let cz = rank % pgrid[2];
    let cy = (rank / pgrid[2]) % pgrid[1];
    let cx = rank / (pgrid[2] * pgrid[1]);
    [cx, cy, cz]
}

fn check_process_grid(global: [usize; 3], pgrid: [usize; 3]) -> PppmResult<()> {
    if pgrid.iter().any(|&p| p == 0) {
        return Err(PppmError::ConfigError(format!(
            "process grid extents must be >= 1, got {pgrid:?}"
        )));
    }
    if global.iter().any(|&n| n == 0) {
        return Err(PppmError::ConfigError(format!(
            "mesh dimensions must be positive, got {global:?}"
        )));
    }
    for axis in 0..3 {
        if global[axis] % pgrid[axis] != 0 {
            return Err(PppmError::ConfigError(format!(
                "mesh[{axis}]={} is not divisible by process_grid[{axis}]={}",
                global[axis], pgrid[axis]
            )));
        }
    }
    Ok(())
}

/// Decompose the global mesh into (px × py × pz) bricks.
///
/// Returns tiles in rank order. Every mesh dimension must be divisible by
/// the matching process-grid extent so that all bricks share one shape.
pub fn decompose_3d(global: [usize; 3], pgrid: [usize; 3]) -> PppmResult<Vec<BrickTile>> {
    check_process_grid(global, pgrid)?;
    let nranks = pgrid[0] * pgrid[1] * pgrid[2];
    (0..nranks).map(|rank| brick_for_rank(global, pgrid, rank)).collect()
}

/// The brick owned by a single rank.
pub fn brick_for_rank(global: [usize; 3], pgrid: [usize; 3], rank: usize) -> PppmResult<BrickTile> {
    check_process_grid(global, pgrid)?;
    let nranks = pgrid[0] * pgrid[1] * pgrid[2];
    if rank >= nranks {
        return Err(PppmError::ConfigError(format!(
            "rank {rank} outside process grid {pgrid:?}"
        )));
    }
    let coords = coords_of(rank, pgrid);
    let mut start = [0usize; 3];
    let mut end = [0usize; 3];
    for axis in 0..3 {
        let splits = balanced_split(global[axis], pgrid[axis]);
        start[axis] = splits[..coords[axis]].iter().sum();
        end[axis] = start[axis] + splits[coords[axis]];
    }
    Ok(BrickTile {
        rank,
        coords,
        pgrid,
        global,
        start,
        end,
    })
}

/// Split `n` items across `k` buckets as evenly as possible.
pub(crate) fn balanced_split(n: usize, k: usize) -> Vec<usize> {
    let base = n / k;
    let rem = n % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}

/// Process grid for `nranks` ranks that minimises the ghost surface per
/// brick volume among the factorisations dividing `mesh`.
pub fn optimal_process_grid(mesh: [usize; 3], nranks: usize) -> PppmResult<[usize; 3]> {
    if nranks == 0 {
        return Err(PppmError::ConfigError("nranks must be >= 1".to_string()));
    }
    let mut best: Option<([usize; 3], f64)> = None;
    for px in (1..=nranks).filter(|p| nranks % p == 0) {
        let rest = nranks / px;
        for py in (1..=rest).filter(|p| rest % p == 0) {
            let pgrid = [px, py, rest / py];
            if (0..3).any(|a| mesh[a] % pgrid[a] != 0) {
                continue;
            }
            // Surface-to-volume proxy: Σ 1/l_a over brick edge lengths.
            let cost: f64 = (0..3)
                .map(|a| pgrid[a] as f64 / mesh[a] as f64)
                .sum();
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((pgrid, cost));
            }
        }
    }
    best.map(|(pgrid, _)| pgrid).ok_or_else(|| {
        PppmError::ConfigError(format!(
            "no process grid of {nranks} ranks divides mesh {mesh:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_3d_covers_full_domain() {
        let tiles = decompose_3d([16, 12, 8], [2, 3, 1]).expect("decompose");
        assert_eq!(tiles.len(), 6);
        let covered: usize = tiles
            .iter()
            .map(|t| t.local_dims().iter().product::<usize>())
            .sum();
        assert_eq!(covered, 16 * 12 * 8);
        for (rank, tile) in tiles.iter().enumerate() {
            assert_eq!(tile.rank, rank);
            assert_eq!(tile.local_dims(), [8, 4, 8]);
        }
        assert_eq!(tiles[5].start, [8, 8, 0]);
        assert_eq!(tiles[5].end, [16, 12, 8]);
    }

    #[test]
    fn test_rank_coords_roundtrip() {
        let pgrid = [3, 2, 4];
        for rank in 0..24 {
            assert_eq!(rank_of(coords_of(rank, pgrid), pgrid), rank);
        }
    }

    #[test]
    fn test_neighbor_rank_is_periodic() {
        let tile = brick_for_rank([8, 8, 8], [2, 2, 2], 0).expect("tile");
        assert_eq!(tile.neighbor_rank(0, -1), 4);
        assert_eq!(tile.neighbor_rank(0, 1), 4);
        assert_eq!(tile.neighbor_rank(1, 1), 2);
        assert_eq!(tile.neighbor_rank(2, -1), 1);
        let tile = brick_for_rank([12, 4, 4], [3, 1, 1], 2).expect("tile");
        assert_eq!(tile.neighbor_rank(0, 1), 0);
        assert_eq!(tile.neighbor_rank(0, -1), 1);
        assert_eq!(tile.neighbor_rank(1, 1), 2);
    }

    #[test]
    fn test_line_group_orders_along_axis() {
        let tile = brick_for_rank([8, 8, 8], [2, 2, 2], 3).expect("tile");
        assert_eq!(tile.coords, [0, 1, 1]);
        assert_eq!(tile.line_group(0), vec![3, 7]);
        assert_eq!(tile.line_group(1), vec![1, 3]);
        assert_eq!(tile.line_group(2), vec![2, 3]);
    }

    #[test]
    fn test_decompose_rejects_indivisible_mesh() {
        let err = decompose_3d([10, 8, 8], [4, 1, 1]).expect_err("10 % 4 != 0");
        match err {
            PppmError::ConfigError(msg) => assert!(msg.contains("not divisible")),
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(decompose_3d([8, 8, 8], [0, 1, 1]).is_err());
        assert!(brick_for_rank([8, 8, 8], [2, 1, 1], 2).is_err());
    }

    #[test]
    fn test_optimal_process_grid_cube() {
        assert_eq!(optimal_process_grid([32, 32, 32], 8).expect("grid"), [2, 2, 2]);
        assert_eq!(optimal_process_grid([32, 32, 32], 1).expect("grid"), [1, 1, 1]);
    }

    #[test]
    fn test_optimal_process_grid_flat_box() {
        assert_eq!(optimal_process_grid([64, 64, 16], 4).expect("grid"), [2, 2, 1]);
        assert!(optimal_process_grid([7, 7, 7], 2).is_err());
    }

    #[test]
    fn test_owns_cell() {
        let tile = brick_for_rank([8, 8, 8], [2, 1, 1], 1).expect("tile");
        assert!(tile.owns_cell([4, 0, 7]));
        assert!(!tile.owns_cell([3, 0, 0]));
    }
}
