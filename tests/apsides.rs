extern crate erebus;

use erebus::ephemeris::{
    AdaptiveStepIntegratorId, AdaptiveStepParameters, Ephemeris, FixedStepIntegratorId,
    FixedStepParameters, UNLIMITED_MAX_EPHEMERIS_STEPS,
};
use erebus::linalg::Vector3;
use erebus::prelude::*;
use erebus::time::{Epoch, Unit};
use std::f64::consts::PI;

const GM_EARTH: f64 = 398_600.4415; // km³/s²

/// On a bounded Keplerian orbit the detected apsides alternate strictly and
/// sit at the radii of the conic.
#[test]
fn apsides_of_an_elliptic_orbit_alternate() {
    let t0 = Epoch::from_gregorian_utc_at_midnight(2010, 1, 1);
    let mut ephemeris = Ephemeris::new(
        vec![MassiveBody::spherical(GM_EARTH)],
        &[DegreesOfFreedom::origin()],
        t0,
        1e-6,
        FixedStepParameters::new(
            FixedStepIntegratorId::McLachlanAtela1992Order5Optimal,
            300.0 * Unit::Second,
        ),
    );

    // Start at periapsis with 1.1 times the circular speed: e = 0.21.
    let periapsis_radius = 8_000.0;
    let speed = 1.1 * (GM_EARTH / periapsis_radius).sqrt();
    let eccentricity = 1.1 * 1.1 - 1.0;
    let semi_major_axis = periapsis_radius / (1.0 - eccentricity);
    let apoapsis_radius = semi_major_axis * (1.0 + eccentricity);
    let period_s = 2.0 * PI * (semi_major_axis.powi(3) / GM_EARTH).sqrt();

    let mut probe = DiscreteTrajectory::new();
    probe.append(
        ForkId::ROOT,
        t0,
        DegreesOfFreedom::new(
            Vector3::new(periapsis_radius, 0.0, 0.0),
            Vector3::new(0.0, speed, 0.0),
        ),
    );
    let parameters = AdaptiveStepParameters::new(
        AdaptiveStepIntegratorId::DormandPrince54,
        1_000_000,
        1e-6,
        1e-9,
    );
    let reached = ephemeris.flow_with_adaptive_step(
        &mut probe,
        ForkId::ROOT,
        None,
        t0 + 3.2 * period_s * Unit::Second,
        &parameters,
        UNLIMITED_MAX_EPHEMERIS_STEPS,
    );
    assert!(reached);

    let mut apoapsides = DiscreteTrajectory::new();
    let mut periapsides = DiscreteTrajectory::new();
    ephemeris.compute_apsides(
        0,
        probe.iter(ForkId::ROOT),
        &mut apoapsides,
        &mut periapsides,
    );

    // 3.2 periods starting at periapsis: apoapsides near 0.5, 1.5, 2.5 T
    // and periapsides near 1, 2, 3 T.
    assert_eq!(apoapsides.len(ForkId::ROOT), 3);
    assert_eq!(periapsides.len(ForkId::ROOT), 3);

    for (time, dof) in apoapsides.iter(ForkId::ROOT) {
        let radius = dof.position_km.norm();
        assert!(
            (radius - apoapsis_radius).abs() < 1.0,
            "apoapsis radius {radius} at {time}"
        );
        // At an apsis the radial velocity vanishes.
        assert!(dof.position_km.dot(&dof.velocity_km_s).abs() / radius < 1e-3);
    }
    for (_, dof) in periapsides.iter(ForkId::ROOT) {
        let radius = dof.position_km.norm();
        assert!(
            (radius - periapsis_radius).abs() < 1.0,
            "periapsis radius {radius}"
        );
    }

    // Merge and check strict alternation.
    let mut apsides: Vec<(Epoch, bool)> = apoapsides
        .iter(ForkId::ROOT)
        .map(|(time, _)| (time, true))
        .chain(periapsides.iter(ForkId::ROOT).map(|(time, _)| (time, false)))
        .collect();
    apsides.sort_by_key(|(time, _)| *time);
    for pair in apsides.windows(2) {
        assert_ne!(pair[0].1, pair[1].1, "apsides must alternate");
        let gap_s = (pair[1].0 - pair[0].0).to_seconds();
        assert!((gap_s - period_s / 2.0).abs() < 0.01 * period_s);
    }
}
