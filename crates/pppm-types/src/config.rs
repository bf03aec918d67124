// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_ALIASING_IMAGES, DEFAULT_COMM_TIMEOUT_SECS, PPPM_MAX_ORDER};
use crate::error::{PppmError, PppmResult};

/// Top-level PPPM configuration.
/// Maps 1:1 to the JSON files under `configs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PppmConfig {
    #[serde(default = "default_system_name")]
    pub system_name: String,
    /// Global mesh points along (x, y, z).
    pub mesh: [usize; 3],
    /// Charge-assignment order, 1..=7.
    pub order: usize,
    /// Ewald screening parameter κ.
    pub kappa: f64,
    /// Real-space cutoff of the short-range partner solver.
    pub rcut: f64,
    /// Extra layer (length units) for particles drifting outside their partition.
    #[serde(default)]
    pub ghost_skin: f64,
    /// Squared k cut-off; harmonics above it receive zero weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_wave_cutoff: Option<f64>,
    /// Partitions along (x, y, z). Absent means single partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_grid: Option<[usize; 3]>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Periodic images per axis in the influence-function aliasing sum (default: 2)
    #[serde(default = "default_aliasing_images")]
    pub aliasing_images: usize,
    /// Receive timeout for in-process partitions, in seconds (default: 10)
    #[serde(default = "default_comm_timeout_s")]
    pub comm_timeout_s: f64,
}

fn default_system_name() -> String {
    "unnamed".to_string()
}
fn default_aliasing_images() -> usize {
    DEFAULT_ALIASING_IMAGES
}
fn default_comm_timeout_s() -> f64 {
    DEFAULT_COMM_TIMEOUT_SECS as f64
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            aliasing_images: default_aliasing_images(),
            comm_timeout_s: default_comm_timeout_s(),
        }
    }
}

impl SolverConfig {
    /// Receive timeout as a [`Duration`].
    pub fn comm_timeout(&self) -> PppmResult<Duration> {
        if self.comm_timeout_s <= 0.0 {
            return Err(PppmError::ConfigError(format!(
                "comm_timeout_s must be > 0, got {}",
                self.comm_timeout_s
            )));
        }
        Duration::try_from_secs_f64(self.comm_timeout_s).map_err(|e| {
            PppmError::ConfigError(format!("comm_timeout_s = {}: {e}", self.comm_timeout_s))
        })
    }
}

impl PppmConfig {
    /// Minimal configuration with defaults for every optional field.
    pub fn new(mesh: [usize; 3], order: usize, kappa: f64, rcut: f64) -> Self {
        PppmConfig {
            system_name: default_system_name(),
            mesh,
            order,
            kappa,
            rcut,
            ghost_skin: 0.0,
            short_wave_cutoff: None,
            process_grid: None,
            solver: SolverConfig::default(),
        }
    }

    /// Load from JSON file.
    pub fn from_file(path: &str) -> PppmResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PppmResult<()> {
        validate_params(self.mesh, self.order, self.kappa, self.rcut)?;
        if !self.ghost_skin.is_finite() || self.ghost_skin < 0.0 {
            return Err(PppmError::ConfigError(format!(
                "ghost_skin must be finite and >= 0, got {}",
                self.ghost_skin
            )));
        }
        if let Some(q) = self.short_wave_cutoff {
            if !q.is_finite() || q <= 0.0 {
                return Err(PppmError::ConfigError(format!(
                    "short_wave_cutoff must be finite and > 0, got {q}"
                )));
            }
        }
        if let Some(grid) = self.process_grid {
            for axis in 0..3 {
                if grid[axis] == 0 {
                    return Err(PppmError::ConfigError(
                        "process_grid extents must be >= 1".to_string(),
                    ));
                }
                if self.mesh[axis] % grid[axis] != 0 {
                    return Err(PppmError::ConfigError(format!(
                        "mesh[{axis}]={} is not divisible by process_grid[{axis}]={}",
                        self.mesh[axis], grid[axis]
                    )));
                }
            }
        }
        if self.solver.aliasing_images == 0 {
            return Err(PppmError::ConfigError(
                "aliasing_images must be >= 1".to_string(),
            ));
        }
        self.solver.comm_timeout()?;
        Ok(())
    }
}

/// Checks shared by `PppmConfig::validate` and the engine's `set_params`.
pub fn validate_params(mesh: [usize; 3], order: usize, kappa: f64, rcut: f64) -> PppmResult<()> {
    if mesh.iter().any(|&n| n == 0) {
        return Err(PppmError::ConfigError(format!(
            "mesh dimensions must be positive, got {mesh:?}"
        )));
    }
    if order == 0 || order > PPPM_MAX_ORDER {
        return Err(PppmError::ConfigError(format!(
            "interpolation order must be in 1..={PPPM_MAX_ORDER}, got {order}"
        )));
    }
    if !kappa.is_finite() || kappa <= 0.0 {
        return Err(PppmError::ConfigError(format!(
            "kappa must be finite and > 0, got {kappa}"
        )));
    }
    if !rcut.is_finite() || rcut <= 0.0 {
        return Err(PppmError::ConfigError(format!(
            "rcut must be finite and > 0, got {rcut}"
        )));
    }
    Ok(())
}
