// ─────────────────────────────────────────────────────────────────────
// SCPN PPPM Core — Property-Based Tests (proptest) for pppm-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for pppm-types using proptest.
//!
//! Covers: box fractional coordinates, minimum image, volume, configuration
//! serialization roundtrip.

use pppm_types::config::PppmConfig;
use pppm_types::state::SimBox;
use pppm_types::vec3::{cross, dot, norm};
use proptest::prelude::*;

// ── SimBox Invariants ────────────────────────────────────────────────

proptest! {
    /// Fractional coordinates map back onto the original position.
    #[test]
    fn fraction_reconstructs_position(
        lx in 2.0f64..20.0, ly in 2.0f64..20.0, lz in 2.0f64..20.0,
        xy in -0.5f64..0.5, xz in -0.5f64..0.5, yz in -0.5f64..0.5,
        x in -30.0f64..30.0, y in -30.0f64..30.0, z in -30.0f64..30.0,
    ) {
        let b = SimBox::triclinic([lx, ly, lz], [xy, xz, yz]);
        let f = b.make_fraction([x, y, z]);
        let a = b.lattice_vectors();
        let mut r = b.lo;
        for i in 0..3 {
            for c in 0..3 {
                r[c] += f[i] * a[i][c];
            }
        }
        prop_assert!((r[0] - x).abs() < 1e-9);
        prop_assert!((r[1] - y).abs() < 1e-9);
        prop_assert!((r[2] - z).abs() < 1e-9);
    }

    /// Volume equals the triple product of the lattice vectors.
    #[test]
    fn volume_is_triple_product(
        lx in 1.0f64..20.0, ly in 1.0f64..20.0, lz in 1.0f64..20.0,
        xy in -1.0f64..1.0, xz in -1.0f64..1.0, yz in -1.0f64..1.0,
    ) {
        let b = SimBox::triclinic([lx, ly, lz], [xy, xz, yz]);
        let [a1, a2, a3] = b.lattice_vectors();
        let triple = dot(a1, cross(a2, a3));
        prop_assert!((triple - b.volume()).abs() < 1e-9 * b.volume());
    }

    /// Minimum image of an orthorhombic displacement stays inside half the box.
    #[test]
    fn min_image_within_half_box(
        lx in 2.0f64..20.0, ly in 2.0f64..20.0, lz in 2.0f64..20.0,
        dx in -50.0f64..50.0, dy in -50.0f64..50.0, dz in -50.0f64..50.0,
    ) {
        let b = SimBox::orthorhombic([lx, ly, lz]);
        let d = b.min_image([dx, dy, dz]);
        prop_assert!(d[0].abs() <= 0.5 * lx + 1e-9);
        prop_assert!(d[1].abs() <= 0.5 * ly + 1e-9);
        prop_assert!(d[2].abs() <= 0.5 * lz + 1e-9);
        prop_assert!(norm(d) <= norm([dx, dy, dz]) + 1e-9);
    }
}

// ── Config Serialization ─────────────────────────────────────────────

proptest! {
    /// Any valid config survives a JSON roundtrip unchanged.
    #[test]
    fn config_json_roundtrip(
        nx in 1usize..64, ny in 1usize..64, nz in 1usize..64,
        order in 1usize..=7,
        kappa in 0.01f64..5.0,
        rcut in 0.5f64..20.0,
    ) {
        let cfg = PppmConfig::new([nx, ny, nz], order, kappa, rcut);
        prop_assert!(cfg.validate().is_ok());
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: PppmConfig = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(back.mesh, cfg.mesh);
        prop_assert_eq!(back.order, cfg.order);
        // Float parsing may land one ulp away; the tolerance scales with the value.
        prop_assert!((back.kappa - cfg.kappa).abs() <= 4.0 * f64::EPSILON * cfg.kappa.abs());
        prop_assert!((back.rcut - cfg.rcut).abs() <= 4.0 * f64::EPSILON * cfg.rcut.abs());
        prop_assert_eq!(back.solver.comm_timeout_s, cfg.solver.comm_timeout_s);
    }
}
