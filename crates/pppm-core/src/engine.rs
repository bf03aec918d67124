// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Reciprocal-Space Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! PppmEngine — the reciprocal-space force evaluation.
//!
//! Per call to [`PppmEngine::compute_forces`]:
//! 1. Apply the box signal; a changed box rebuilds the mesh layout and
//!    marks the influence function stale.
//! 2. Reduce Q, Q² and N over all partitions; a step with Q² = 0 is skipped.
//! 3. Re-solve the influence function if stale.
//! 4. Assign charges, reduce ghosts, forward transform.
//! 5. Accumulate energy and virial from |ρ̂(k)|² G(k).
//! 6. For each axis: multiply by -i k_a G, inverse transform, fill ghosts.
//! 7. Interpolate forces onto the group and add them to the caller's buffer.
//! 8. Subtract excluded-pair interactions, reduce the scalars, and apply
//!    the self-energy and neutralising-background terms.

use log::{debug, info, warn};
use ndarray::{Array3, Zip};
use num_complex::Complex64;
use pppm_math::stencil::{kspace_rms_error, real_space_rms_error, StencilTable};
use pppm_types::config::{validate_params, PppmConfig};
use pppm_types::constants::{
    DEFAULT_ALIASING_IMAGES, FRAC_1_SQRT_PI, LOG_PPPM_ENERGY, LOG_PPPM_RMS_ERROR,
    RMS_ERROR_WARN_THRESHOLD,
};
use pppm_types::error::{PppmError, PppmResult};
use pppm_types::state::{
    BoxSignal, ExclusionList, ParticleGroup, ParticleView, SimBox, Virial,
};
use pppm_types::vec3::Vec3;
use std::f64::consts::PI;

use crate::assign::{assign_charges, interpolate_forces};
use crate::domain::brick_for_rank;
use crate::exclusion::correct_exclusions;
use crate::influence::{solve_influence, InfluenceTable};
use crate::mesh::MeshGeometry;
use crate::transform::MeshBackend;

const LOG_QUANTITIES: [&str; 2] = [LOG_PPPM_ENERGY, LOG_PPPM_RMS_ERROR];

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineState {
    Uninitialized,
    MeshReady,
    TransformReady,
    InfluenceValid,
    Computed,
}

/// Scalars published for one evaluated timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PppmScalars {
    pub timestep: u64,
    pub energy: f64,
    pub virial: Virial,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Computed(PppmScalars),
    /// Q² was zero; forces and scalars were left untouched.
    Skipped,
}

#[derive(Debug, Clone)]
struct SolverParams {
    mesh: [usize; 3],
    order: usize,
    kappa: f64,
    rcut: f64,
    ghost_skin: f64,
    short_wave_cutoff: Option<f64>,
    aliasing_images: usize,
}

/// Mesh-sized work arrays, reallocated with the layout.
struct MeshBuffers {
    density: Array3<Complex64>,
    rho_k: Array3<Complex64>,
    work: Array3<Complex64>,
    fields: [Array3<Complex64>; 3],
}

impl MeshBuffers {
    fn allocate(geom: &MeshGeometry) -> Self {
        MeshBuffers {
            density: geom.zeroed_mesh(),
            rho_k: geom.zeroed_inner(),
            work: geom.zeroed_inner(),
            fields: [geom.zeroed_mesh(), geom.zeroed_mesh(), geom.zeroed_mesh()],
        }
    }
}

fn params_not_set() -> PppmError {
    PppmError::ConfigError("PPPM parameters not set; call set_params first".to_string())
}

fn require_charge(q2: f64) -> PppmResult<()> {
    if q2 == 0.0 {
        return Err(PppmError::NumericalDegeneracy(
            "total squared charge is zero".to_string(),
        ));
    }
    Ok(())
}

/// Reciprocal-space PPPM solver for one partition.
pub struct PppmEngine<B: MeshBackend> {
    backend: B,
    simbox: SimBox,
    system_name: String,
    params: Option<SolverParams>,
    state: EngineState,
    geometry: Option<MeshGeometry>,
    stencil: Option<StencilTable>,
    buffers: Option<MeshBuffers>,
    influence: Option<InfluenceTable>,
    force_scratch: Vec<Vec3>,
    rms_pending: bool,
    rms_error: Option<f64>,
    q_sum: f64,
    q2_sum: f64,
    last: Option<PppmScalars>,
    influence_solves: usize,
}

impl<B: MeshBackend> PppmEngine<B> {
    pub fn new(backend: B, simbox: SimBox) -> PppmResult<Self> {
        simbox.validate()?;
        Ok(PppmEngine {
            backend,
            simbox,
            system_name: "unnamed".to_string(),
            params: None,
            state: EngineState::Uninitialized,
            geometry: None,
            stencil: None,
            buffers: None,
            influence: None,
            force_scratch: Vec::new(),
            rms_pending: false,
            rms_error: None,
            q_sum: 0.0,
            q2_sum: 0.0,
            last: None,
            influence_solves: 0,
        })
    }

    /// Configure mesh resolution, order, κ and the real-space cutoff.
    ///
    /// Rebuilds the mesh layout and transform plans and marks the
    /// influence function stale. Invalid values are rejected before the
    /// current layout is touched; a failed mesh or transform setup leaves
    /// the engine uninitialized.
    pub fn set_params(
        &mut self,
        nx: usize,
        ny: usize,
        nz: usize,
        order: usize,
        kappa: f64,
        rcut: f64,
    ) -> PppmResult<()> {
        let mesh = [nx, ny, nz];
        validate_params(mesh, order, kappa, rcut)?;
        let (ghost_skin, short_wave_cutoff, aliasing_images) = match &self.params {
            Some(p) => (p.ghost_skin, p.short_wave_cutoff, p.aliasing_images),
            None => (0.0, None, DEFAULT_ALIASING_IMAGES),
        };
        self.install(SolverParams {
            mesh,
            order,
            kappa,
            rcut,
            ghost_skin,
            short_wave_cutoff,
            aliasing_images,
        })
    }

    /// Configure from a validated [`PppmConfig`].
    pub fn apply_config(&mut self, config: &PppmConfig) -> PppmResult<()> {
        config.validate()?;
        let wanted = config.process_grid.unwrap_or([1, 1, 1]);
        if wanted != self.backend.process_grid() {
            return Err(PppmError::ConfigError(format!(
                "config '{}' asks for process grid {wanted:?}, backend runs {:?}",
                config.system_name,
                self.backend.process_grid()
            )));
        }
        self.system_name = config.system_name.clone();
        self.install(SolverParams {
            mesh: config.mesh,
            order: config.order,
            kappa: config.kappa,
            rcut: config.rcut,
            ghost_skin: config.ghost_skin,
            short_wave_cutoff: config.short_wave_cutoff,
            aliasing_images: config.solver.aliasing_images,
        })
    }

    fn install(&mut self, params: SolverParams) -> PppmResult<()> {
        self.params = None;
        self.influence = None;
        self.state = EngineState::Uninitialized;
        self.setup_mesh(&params)?;
        self.params = Some(params);
        self.rms_pending = true;
        Ok(())
    }

    fn setup_mesh(&mut self, params: &SolverParams) -> PppmResult<()> {
        self.geometry = None;
        self.buffers = None;

        let pgrid = self.backend.process_grid();
        let tile = brick_for_rank(params.mesh, pgrid, self.backend.rank())?;
        let geom = MeshGeometry::new(tile, params.order, params.ghost_skin, &self.simbox)?;
        self.stencil = Some(StencilTable::new(params.order)?);
        self.buffers = Some(MeshBuffers::allocate(&geom));
        info!(
            "{}: rank {} mesh {:?} order {} local {:?} ghost {:?}",
            self.system_name,
            self.backend.rank(),
            params.mesh,
            params.order,
            geom.local_dims(),
            geom.ghost_cells()
        );
        self.state = EngineState::MeshReady;

        self.backend.initialize(&geom)?;
        self.geometry = Some(geom);
        self.state = EngineState::TransformReady;
        Ok(())
    }

    fn apply_box_signal(&mut self, signal: BoxSignal) -> PppmResult<()> {
        let BoxSignal::Changed(simbox) = signal else {
            return Ok(());
        };
        simbox.validate()?;
        if simbox == self.simbox {
            return Ok(());
        }
        // A pure origin shift moves the mesh but leaves k-space untouched.
        let reshaped = !simbox.same_geometry(&self.simbox);
        self.simbox = simbox;
        let Some(params) = self.params.clone() else {
            return Ok(());
        };
        if let Err(e) = self.setup_mesh(&params) {
            self.params = None;
            self.influence = None;
            self.state = EngineState::Uninitialized;
            return Err(e);
        }
        if reshaped {
            debug!("{}: box reshaped, influence function stale", self.system_name);
            self.influence = None;
            self.rms_pending = true;
        } else if self.influence.is_some() {
            self.state = EngineState::InfluenceValid;
        }
        Ok(())
    }

    /// Particles whose mesh cell is owned by this partition.
    pub fn local_group(&self, view: &ParticleView<'_>) -> PppmResult<ParticleGroup> {
        let geom = self.geometry.as_ref().ok_or_else(params_not_set)?;
        let members = view
            .position
            .iter()
            .enumerate()
            .filter(|&(_, &pos)| geom.tile().owns_cell(geom.global_cell(pos)))
            .map(|(i, _)| i)
            .collect();
        Ok(ParticleGroup::from_indices(members))
    }

    /// Evaluate reciprocal-space forces for `group` and add them to `forces`.
    ///
    /// Collective on distributed backends. Each partition passes the
    /// particles it owns as `group`; `forces` is indexed like `view`.
    pub fn compute_forces(
        &mut self,
        timestep: u64,
        view: &ParticleView<'_>,
        group: &ParticleGroup,
        exclusions: &ExclusionList,
        signal: BoxSignal,
        forces: &mut [Vec3],
    ) -> PppmResult<StepOutcome> {
        self.apply_box_signal(signal)?;
        if self.state < EngineState::TransformReady {
            return Err(params_not_set());
        }
        group.check_bounds(view.len())?;
        if forces.len() != view.len() {
            return Err(PppmError::PhysicsViolation(format!(
                "force buffer holds {} entries for {} particles",
                forces.len(),
                view.len()
            )));
        }
        if let Some(&i) = group.members().iter().find(|&&i| !view.charge[i].is_finite()) {
            return Err(PppmError::PhysicsViolation(format!(
                "particle {i} has non-finite charge {}",
                view.charge[i]
            )));
        }

        let mut moments = [0.0; 3];
        for &i in group.members() {
            let q = view.charge[i];
            moments[0] += q;
            moments[1] += q * q;
            moments[2] += 1.0;
        }
        self.backend.all_reduce_sum(&mut moments)?;
        let [q_sum, q2_sum, natoms] = moments;
        self.q_sum = q_sum;
        self.q2_sum = q2_sum;
        match require_charge(q2_sum) {
            Ok(()) => {}
            Err(PppmError::NumericalDegeneracy(msg)) => {
                info!("{}: step {timestep} skipped: {msg}", self.system_name);
                return Ok(StepOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        let params = self.params.clone().ok_or_else(params_not_set)?;
        if self.rms_pending {
            self.estimate_rms_error(&params, natoms, q2_sum);
            self.rms_pending = false;
        }

        let geom = self.geometry.as_ref().ok_or_else(params_not_set)?;
        let stencil = self.stencil.as_ref().ok_or_else(params_not_set)?;
        let buffers = self.buffers.as_mut().ok_or_else(params_not_set)?;

        if self.influence.is_none() {
            let start = std::time::Instant::now();
            self.influence = Some(solve_influence(
                geom,
                params.kappa,
                params.aliasing_images,
                params.short_wave_cutoff,
            )?);
            self.influence_solves += 1;
            info!(
                "{}: influence function solved in {:.1} ms",
                self.system_name,
                start.elapsed().as_secs_f64() * 1e3
            );
            self.state = EngineState::InfluenceValid;
        }
        let table = self.influence.as_ref().ok_or_else(params_not_set)?;

        assign_charges(&mut buffers.density, geom, stencil, view, group)?;
        self.backend.reduce_ghosts(&mut buffers.density)?;
        buffers.rho_k.assign(&geom.inner(&buffers.density));
        self.backend.forward(&mut buffers.rho_k)?;

        let global = geom.global_dims();
        let s = 1.0 / (global[0] * global[1] * global[2]) as f64;
        let volume = self.simbox.volume();

        // [energy, virial xx, xy, xz, yy, yz, zz]
        let mut scalars = [0.0; 7];
        Zip::from(&buffers.rho_k)
            .and(table.green())
            .and(table.virial())
            .for_each(|rho, &g, vg| {
                let e = g * rho.norm_sqr();
                scalars[0] += e;
                for c in 0..6 {
                    scalars[c + 1] += e * vg[c];
                }
            });
        let prefactor = 0.5 * volume * s * s;
        scalars.iter_mut().for_each(|v| *v *= prefactor);

        for axis in 0..3 {
            Zip::from(&mut buffers.work)
                .and(&buffers.rho_k)
                .and(table.green())
                .and(table.kvec())
                .for_each(|w, &rho, &g, k| {
                    let phi = rho * (s * g);
                    *w = Complex64::new(k[axis] * phi.im, -k[axis] * phi.re);
                });
            self.backend.inverse(&mut buffers.work)?;
            let field = &mut buffers.fields[axis];
            geom.inner_mut(field).assign(&buffers.work);
            self.backend.fill_ghosts(field)?;
        }

        self.force_scratch.clear();
        self.force_scratch.resize(view.len(), [0.0; 3]);
        interpolate_forces(&buffers.fields, geom, stencil, view, group, &mut self.force_scratch)?;
        for &i in group.members() {
            for a in 0..3 {
                forces[i][a] += self.force_scratch[i][a];
            }
        }

        let correction = correct_exclusions(view, group, exclusions, &self.simbox, params.kappa, forces)?;
        scalars[0] += correction.energy;
        for c in 0..6 {
            scalars[c + 1] += correction.virial[c];
        }
        self.backend.all_reduce_sum(&mut scalars)?;

        let self_energy = params.kappa * FRAC_1_SQRT_PI * q2_sum;
        let background = PI * q_sum * q_sum / (2.0 * params.kappa * params.kappa * volume);
        let energy = scalars[0] - self_energy - background;
        let mut virial = [0.0; 6];
        virial.copy_from_slice(&scalars[1..]);
        for c in [0, 3, 5] {
            virial[c] -= background;
        }
        if !energy.is_finite() || virial.iter().any(|v| !v.is_finite()) {
            return Err(PppmError::PhysicsViolation(format!(
                "non-finite PPPM energy {energy} at step {timestep}"
            )));
        }

        let out = PppmScalars {
            timestep,
            energy,
            virial,
        };
        self.last = Some(out);
        self.state = EngineState::Computed;
        debug!("{}: step {timestep} E_k = {energy:.10e}", self.system_name);
        Ok(StepOutcome::Computed(out))
    }

    fn estimate_rms_error(&mut self, params: &SolverParams, natoms: f64, q2: f64) {
        let planes = self.simbox.nearest_plane_distance();
        let lpr = (0..3)
            .map(|a| {
                let h = planes[a] / params.mesh[a] as f64;
                kspace_rms_error(params.order, params.kappa, h, planes[a], natoms, q2).powi(2)
            })
            .sum::<f64>()
            .sqrt()
            / 3f64.sqrt();
        let spr = real_space_rms_error(params.kappa, params.rcut, natoms, q2, self.simbox.volume());
        let rms = lpr.max(spr);
        self.rms_error = Some(rms);
        info!(
            "{}: estimated RMS force error {rms:.3e} (k-space {lpr:.3e}, real-space {spr:.3e})",
            self.system_name
        );
        if rms > RMS_ERROR_WARN_THRESHOLD {
            warn!(
                "{}: RMS error {rms:.3e} exceeds {RMS_ERROR_WARN_THRESHOLD}; \
                 mesh, order, kappa and rcut may not be a valid combination",
                self.system_name
            );
        }
    }

    pub fn provided_log_quantities(&self) -> &'static [&'static str] {
        &LOG_QUANTITIES
    }

    /// Named diagnostic for `timestep`; `None` if that step was not computed.
    pub fn log_value(&self, name: &str, timestep: u64) -> PppmResult<Option<f64>> {
        let at_step = self.last.filter(|s| s.timestep == timestep);
        match name {
            LOG_PPPM_ENERGY => Ok(at_step.map(|s| s.energy)),
            LOG_PPPM_RMS_ERROR => Ok(at_step.and(self.rms_error)),
            _ => Err(PppmError::ConfigError(format!(
                "unknown log quantity '{name}'"
            ))),
        }
    }

    /// Energy of the last computed step.
    pub fn energy(&self) -> f64 {
        self.last.map_or(0.0, |s| s.energy)
    }

    /// Virial (xx, xy, xz, yy, yz, zz) of the last computed step.
    pub fn virial(&self) -> Virial {
        self.last.map_or([0.0; 6], |s| s.virial)
    }

    /// Global Σq from the most recent evaluation.
    pub fn q_sum(&self) -> f64 {
        self.q_sum
    }

    /// Global Σq² from the most recent evaluation.
    pub fn q2_sum(&self) -> f64 {
        self.q2_sum
    }

    pub fn rms_error(&self) -> Option<f64> {
        self.rms_error
    }

    /// How many times the influence function has been solved.
    pub fn influence_solves(&self) -> usize {
        self.influence_solves
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn geometry(&self) -> Option<&MeshGeometry> {
        self.geometry.as_ref()
    }

    pub fn simbox(&self) -> &SimBox {
        &self.simbox
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::HostBackend;

    fn pair_system() -> (Vec<Vec3>, Vec<f64>) {
        (vec![[1.0, 2.0, 3.0], [4.0, 4.5, 1.5]], vec![1.0, -1.0])
    }

    fn engine(l: f64) -> PppmEngine<HostBackend> {
        let mut engine = PppmEngine::new(HostBackend::new(), SimBox::cubic(l)).expect("engine");
        engine.set_params(16, 16, 16, 5, 0.5, 4.0).expect("params");
        engine
    }

    fn step(engine: &mut PppmEngine<HostBackend>, t: u64, signal: BoxSignal) -> (StepOutcome, Vec<Vec3>) {
        let (pos, q) = pair_system();
        let view = ParticleView::new(&pos, &q).expect("view");
        let mut forces = vec![[0.0; 3]; 2];
        let out = engine
            .compute_forces(t, &view, &ParticleGroup::all(2), &ExclusionList::new(), signal, &mut forces)
            .expect("compute");
        (out, forces)
    }

    #[test]
    fn test_compute_before_params_is_config_error() {
        let mut engine = PppmEngine::new(HostBackend::new(), SimBox::cubic(8.0)).expect("engine");
        assert_eq!(engine.state(), EngineState::Uninitialized);
        let (pos, q) = pair_system();
        let view = ParticleView::new(&pos, &q).expect("view");
        let mut forces = vec![[0.0; 3]; 2];
        let err = engine
            .compute_forces(0, &view, &ParticleGroup::all(2), &ExclusionList::new(), BoxSignal::Unchanged, &mut forces)
            .expect_err("no params");
        assert!(matches!(err, PppmError::ConfigError(_)));
    }

    #[test]
    fn test_state_walks_to_computed() {
        let mut engine = engine(8.0);
        assert_eq!(engine.state(), EngineState::TransformReady);
        let (out, forces) = step(&mut engine, 3, BoxSignal::Unchanged);
        assert_eq!(engine.state(), EngineState::Computed);
        let StepOutcome::Computed(scalars) = out else {
            panic!("expected a computed step");
        };
        assert_eq!(scalars.timestep, 3);
        assert!(scalars.energy < 0.0);
        // ik differentiation leaves only a small self-force.
        let scale = forces[0].iter().map(|f| f.abs()).fold(0.0, f64::max);
        assert!(scale > 0.0);
        for a in 0..3 {
            assert!((forces[0][a] + forces[1][a]).abs() < 1e-3 * scale);
        }
    }

    #[test]
    fn test_forces_accumulate_into_buffer() {
        let mut engine = engine(8.0);
        let (pos, q) = pair_system();
        let view = ParticleView::new(&pos, &q).expect("view");
        let group = ParticleGroup::all(2);
        let mut fresh = vec![[0.0; 3]; 2];
        engine
            .compute_forces(0, &view, &group, &ExclusionList::new(), BoxSignal::Unchanged, &mut fresh)
            .expect("compute");
        let mut offset = vec![[1.0, -2.0, 0.5]; 2];
        engine
            .compute_forces(1, &view, &group, &ExclusionList::new(), BoxSignal::Unchanged, &mut offset)
            .expect("compute");
        for i in 0..2 {
            assert!((offset[i][0] - 1.0 - fresh[i][0]).abs() < 1e-12);
            assert!((offset[i][1] + 2.0 - fresh[i][1]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_influence_cached_until_invalidated() {
        let mut engine = engine(8.0);
        step(&mut engine, 0, BoxSignal::Unchanged);
        step(&mut engine, 1, BoxSignal::Unchanged);
        assert_eq!(engine.influence_solves(), 1);

        step(&mut engine, 2, BoxSignal::Changed(SimBox::cubic(8.0)));
        assert_eq!(engine.influence_solves(), 1, "identical box is not a change");

        step(&mut engine, 3, BoxSignal::Changed(SimBox::cubic(8.5)));
        assert_eq!(engine.influence_solves(), 2);

        engine.set_params(16, 16, 16, 4, 0.5, 4.0).expect("params");
        step(&mut engine, 4, BoxSignal::Unchanged);
        step(&mut engine, 5, BoxSignal::Unchanged);
        assert_eq!(engine.influence_solves(), 3);
    }

    #[test]
    fn test_neutral_free_step_is_skipped() {
        let mut engine = engine(8.0);
        let pos = vec![[1.0; 3], [2.0; 3]];
        let q = vec![0.0, 0.0];
        let view = ParticleView::new(&pos, &q).expect("view");
        let mut forces = vec![[0.25; 3]; 2];
        let out = engine
            .compute_forces(9, &view, &ParticleGroup::all(2), &ExclusionList::new(), BoxSignal::Unchanged, &mut forces)
            .expect("compute");
        assert_eq!(out, StepOutcome::Skipped);
        assert_eq!(forces, vec![[0.25; 3]; 2]);
        assert_eq!(engine.influence_solves(), 0);
        assert_eq!(engine.log_value(LOG_PPPM_ENERGY, 9).expect("known"), None);
    }

    #[test]
    fn test_single_ion_matches_ewald_with_background() {
        let (l, kappa) = (8.0, 0.5);
        let pos = vec![[2.0, 2.0, 2.0]];
        let q = vec![1.0];
        let view = ParticleView::new(&pos, &q).expect("view");
        let mut engine = PppmEngine::new(HostBackend::new(), SimBox::cubic(l)).expect("engine");
        engine.set_params(32, 32, 32, 5, kappa, 4.0).expect("params");
        let mut forces = vec![[0.0; 3]];
        engine
            .compute_forces(0, &view, &ParticleGroup::all(1), &ExclusionList::new(), BoxSignal::Unchanged, &mut forces)
            .expect("compute");
        assert_eq!(engine.q_sum(), 1.0);

        let volume = l * l * l;
        let k0 = 2.0 * PI / l;
        let mut lattice = 0.0;
        for mx in -8i32..=8 {
            for my in -8i32..=8 {
                for mz in -8i32..=8 {
                    let ksq = k0 * k0 * (mx * mx + my * my + mz * mz) as f64;
                    if ksq > 0.0 {
                        lattice += 2.0 * PI / (volume * ksq) * (-ksq / (4.0 * kappa * kappa)).exp();
                    }
                }
            }
        }
        let background = PI / (2.0 * kappa * kappa * volume);
        let expected = lattice - kappa * FRAC_1_SQRT_PI - background;
        assert!((engine.energy() - expected).abs() < 1e-5, "{} vs {expected}", engine.energy());
        // Cubic symmetry about a mesh point: no shear, equal diagonal.
        let w = engine.virial();
        assert!(w[1].abs() < 1e-8 && w[2].abs() < 1e-8 && w[4].abs() < 1e-8);
        assert!((w[0] - w[3]).abs() < 1e-8 && (w[0] - w[5]).abs() < 1e-8);
        assert!(forces[0].iter().all(|f| f.abs() < 1e-8));
    }

    #[test]
    fn test_log_quantities() {
        let mut engine = engine(8.0);
        assert_eq!(engine.provided_log_quantities(), &[LOG_PPPM_ENERGY, LOG_PPPM_RMS_ERROR]);
        step(&mut engine, 7, BoxSignal::Unchanged);
        let e = engine.log_value(LOG_PPPM_ENERGY, 7).expect("known");
        assert_eq!(e, Some(engine.energy()));
        assert!(engine.log_value(LOG_PPPM_RMS_ERROR, 7).expect("known").is_some());
        assert_eq!(engine.log_value(LOG_PPPM_ENERGY, 8).expect("known"), None);
        assert!(matches!(
            engine.log_value("pppm_temperature", 7),
            Err(PppmError::ConfigError(_))
        ));
    }

    #[test]
    fn test_coarse_parameters_give_large_rms_estimate() {
        let mut fine = engine(8.0);
        step(&mut fine, 0, BoxSignal::Unchanged);
        let mut coarse = PppmEngine::new(HostBackend::new(), SimBox::cubic(8.0)).expect("engine");
        coarse.set_params(4, 4, 4, 1, 2.0, 0.5).expect("params");
        step(&mut coarse, 0, BoxSignal::Unchanged);
        let (f, c) = (fine.rms_error().expect("fine"), coarse.rms_error().expect("coarse"));
        assert!(c > f && c > RMS_ERROR_WARN_THRESHOLD, "fine {f} coarse {c}");
    }

    #[test]
    fn test_apply_config_checks_process_grid() {
        let mut engine = PppmEngine::new(HostBackend::new(), SimBox::cubic(10.0)).expect("engine");
        let mut config = PppmConfig::new([8, 8, 8], 3, 0.4, 4.0);
        config.system_name = "host".to_string();
        engine.apply_config(&config).expect("host config");
        assert_eq!(engine.system_name(), "host");
        config.process_grid = Some([2, 1, 1]);
        assert!(matches!(
            engine.apply_config(&config),
            Err(PppmError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejected_params_keep_previous_layout() {
        let mut engine = engine(8.0);
        assert!(engine.set_params(16, 16, 16, 9, 0.5, 4.0).is_err());
        // Order 9 is rejected before the old layout is touched.
        assert_eq!(engine.state(), EngineState::TransformReady);
        assert!(engine.set_params(0, 16, 16, 5, 0.5, 4.0).is_err());
        assert!(engine.geometry().is_some());
    }
}
