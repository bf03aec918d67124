// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — FFT
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 3D complex FFT wrappers around rustfft.
//!
//! Convention:
//! - Forward: X(k) = Σ x(n) exp(-2πi k·n/N), unnormalized
//! - Inverse: x(n) = Σ X(k) exp(+2πi k·n/N), also unnormalized
//!
//! A forward/inverse pair therefore scales the data by Nx·Ny·Nz; callers
//! divide explicitly.

use ndarray::{Array3, Axis};
use num_complex::Complex64;
use pppm_types::error::{PppmError, PppmResult};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    Forward,
    Inverse,
}

/// Forward and inverse 1D plans for one line length.
#[derive(Clone)]
pub struct LinePlan {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl LinePlan {
    pub fn new(planner: &mut FftPlanner<f64>, len: usize) -> PppmResult<Self> {
        if len == 0 {
            return Err(PppmError::ConfigError(
                "FFT line length must be >= 1".to_string(),
            ));
        }
        Ok(LinePlan {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Transform every consecutive `len`-long line of `lines` in place.
    pub fn process(&self, direction: TransformDirection, lines: &mut [Complex64]) -> PppmResult<()> {
        if lines.len() % self.len != 0 {
            return Err(PppmError::PhysicsViolation(format!(
                "buffer of {} values is not a whole number of {}-point lines",
                lines.len(),
                self.len
            )));
        }
        if lines.is_empty() {
            return Ok(());
        }
        match direction {
            TransformDirection::Forward => self.forward.process(lines),
            TransformDirection::Inverse => self.inverse.process(lines),
        }
        Ok(())
    }
}

/// Transform `data` along one axis with a matching line plan.
///
/// Lanes are gathered into one contiguous buffer so rustfft can batch them.
pub fn transform_axis(
    data: &mut Array3<Complex64>,
    axis: usize,
    plan: &LinePlan,
    direction: TransformDirection,
) -> PppmResult<()> {
    let n = data.len_of(Axis(axis));
    if n != plan.len() {
        return Err(PppmError::PhysicsViolation(format!(
            "axis {axis} has {n} points but the plan expects {}",
            plan.len()
        )));
    }
    let mut buf: Vec<Complex64> = Vec::with_capacity(data.len());
    for lane in data.lanes(Axis(axis)) {
        buf.extend(lane.iter().copied());
    }
    plan.process(direction, &mut buf)?;
    for (mut lane, chunk) in data.lanes_mut(Axis(axis)).into_iter().zip(buf.chunks(n)) {
        for (dst, src) in lane.iter_mut().zip(chunk) {
            *dst = *src;
        }
    }
    Ok(())
}

/// One line plan per axis, sharing a planner.
pub fn line_plans(dims: [usize; 3]) -> PppmResult<[LinePlan; 3]> {
    let mut planner = FftPlanner::new();
    Ok([
        LinePlan::new(&mut planner, dims[0])?,
        LinePlan::new(&mut planner, dims[1])?,
        LinePlan::new(&mut planner, dims[2])?,
    ])
}

/// Cached plans for a full-box 3D transform.
#[derive(Clone)]
pub struct Fft3Plan {
    dims: [usize; 3],
    lines: [LinePlan; 3],
}

impl Fft3Plan {
    pub fn new(dims: [usize; 3]) -> PppmResult<Self> {
        Ok(Fft3Plan {
            dims,
            lines: line_plans(dims)?,
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn forward(&self, data: &mut Array3<Complex64>) -> PppmResult<()> {
        self.execute(data, TransformDirection::Forward)
    }

    pub fn inverse(&self, data: &mut Array3<Complex64>) -> PppmResult<()> {
        self.execute(data, TransformDirection::Inverse)
    }

    fn execute(&self, data: &mut Array3<Complex64>, direction: TransformDirection) -> PppmResult<()> {
        let (nx, ny, nz) = data.dim();
        if [nx, ny, nz] != self.dims {
            return Err(PppmError::PhysicsViolation(format!(
                "mesh shape {:?} does not match FFT plan {:?}",
                [nx, ny, nz],
                self.dims
            )));
        }
        // z is contiguous in standard layout; do it first while the data is hot.
        for axis in [2, 1, 0] {
            transform_axis(data, axis, &self.lines[axis], direction)?;
        }
        Ok(())
    }
}

/// One-shot forward 3D FFT.
pub fn fft3(input: &Array3<Complex64>) -> PppmResult<Array3<Complex64>> {
    let (nx, ny, nz) = input.dim();
    let plan = Fft3Plan::new([nx, ny, nz])?;
    let mut data = input.clone();
    plan.forward(&mut data)?;
    Ok(data)
}

/// One-shot inverse 3D FFT (unnormalized).
pub fn ifft3(input: &Array3<Complex64>) -> PppmResult<Array3<Complex64>> {
    let (nx, ny, nz) = input.dim();
    let plan = Fft3Plan::new([nx, ny, nz])?;
    let mut data = input.clone();
    plan.inverse(&mut data)?;
    Ok(data)
}
