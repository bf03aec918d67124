// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Highest supported charge-assignment order.
pub const PPPM_MAX_ORDER: usize = 7;

/// Periodic images per axis in the influence-function aliasing sum.
pub const DEFAULT_ALIASING_IMAGES: usize = 2;

/// Seconds a partition waits on a peer before declaring it lost.
pub const DEFAULT_COMM_TIMEOUT_SECS: u64 = 10;

/// RMS force error above which the parameter set is flagged.
pub const RMS_ERROR_WARN_THRESHOLD: f64 = 0.1;

/// Log quantity: reciprocal-space energy of the last evaluation.
pub const LOG_PPPM_ENERGY: &str = "pppm_energy";

/// Log quantity: estimated RMS force error for the current parameters.
pub const LOG_PPPM_RMS_ERROR: &str = "pppm_rms_error";

/// 1/√π
pub const FRAC_1_SQRT_PI: f64 = 0.564_189_583_547_756_3;
