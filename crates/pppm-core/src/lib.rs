// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Library Root
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reciprocal-space PPPM electrostatics.
//!
//! Layout and decomposition: domain, mesh, comm, halo
//! Numerics: assign, transform, influence, exclusion
//! Orchestration: engine

pub mod assign;
pub mod comm;
pub mod domain;
pub mod engine;
pub mod exclusion;
pub mod halo;
pub mod influence;
pub mod mesh;
pub mod transform;
