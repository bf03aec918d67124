// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PppmError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("Collective protocol violated on rank {rank}: expected {expected}, found {found}")]
    CollectiveProtocol {
        rank: usize,
        expected: String,
        found: String,
    },

    #[error("Communicator failure: {0}")]
    CommFailure(String),

    #[error("Particle {index} out of local mesh bounds: cell={cell:?}")]
    ParticleOutOfBounds { index: usize, cell: [i64; 3] },

    #[error("Physics constraint violated: {0}")]
    PhysicsViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PppmResult<T> = Result<T, PppmError>;
