extern crate erebus;

use erebus::cosmic::STD_GRAVITY;
use erebus::ephemeris::{
    AdaptiveStepIntegratorId, AdaptiveStepParameters, Ephemeris, FixedStepIntegratorId,
    FixedStepParameters,
};
use erebus::io::{read_flight_plan_from_record, FlightPlanRecord};
use erebus::linalg::Vector3;
use erebus::prelude::*;
use erebus::time::{Epoch, Unit};

const GM_EARTH: f64 = 398_600.4415; // km³/s²
const LEO_RADIUS_KM: f64 = 7_000.0;

fn epoch() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2010, 1, 1)
}

fn adaptive_parameters() -> AdaptiveStepParameters {
    AdaptiveStepParameters::new(AdaptiveStepIntegratorId::DormandPrince54, 10_000, 1e-6, 1e-9)
}

fn leo_setup() -> (Ephemeris, DiscreteTrajectory, Epoch) {
    let t0 = epoch();
    let ephemeris = Ephemeris::new(
        vec![MassiveBody::spherical(GM_EARTH)],
        &[DegreesOfFreedom::origin()],
        t0,
        1e-6,
        FixedStepParameters::new(
            FixedStepIntegratorId::McLachlanAtela1992Order5Optimal,
            60.0 * Unit::Second,
        ),
    );
    let speed = (GM_EARTH / LEO_RADIUS_KM).sqrt();
    let mut root = DiscreteTrajectory::new();
    root.append(
        ForkId::ROOT,
        t0,
        DegreesOfFreedom::new(
            Vector3::new(LEO_RADIUS_KM, 0.0, 0.0),
            Vector3::new(0.0, speed, 0.0),
        ),
    );
    (ephemeris, root, t0)
}

fn prograde_burn(initial_time: Epoch, delta_v_km_s: f64) -> Burn {
    Burn {
        thruster: Thruster {
            thrust_n: 1_000.0,
            isp_s: 300.0,
        },
        initial_time,
        delta_v_km_s: Vector3::new(delta_v_km_s, 0.0, 0.0),
        frame: BurnFrame::VelocityNormalBinormal,
    }
}

/// One 10 m/s prograde burn at the start of the plan: three segments, and
/// the mass ratio of the rocket equation.
#[test]
fn single_burn_plan() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 3_600.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    assert_eq!(plan.number_of_segments(), 1);
    assert_eq!(plan.number_of_manoeuvres(), 0);

    assert!(plan.append(prograde_burn(t0, 0.01)));
    assert_eq!(plan.number_of_segments(), 3);
    assert_eq!(plan.number_of_manoeuvres(), 1);

    let manoeuvre = plan.get_manoeuvre(0);
    let exhaust_velocity = 300.0 * STD_GRAVITY;
    let expected_final_mass = 1_000.0 * (-10.0 / exhaust_velocity).exp();
    assert!(manoeuvre.final_mass_kg() < 1_000.0);
    assert!((manoeuvre.final_mass_kg() - expected_final_mass).abs() < 1e-9);

    // The whole plan extends to the final time.
    let (last_time, _) = plan.get_all_segments().last().unwrap();
    assert_eq!(last_time, t0 + 3_600.0 * Unit::Second);
}

/// Segment boundaries share their time and degrees of freedom (the fork
/// point of each segment is the last sample of the previous one).
#[test]
fn segment_boundaries_are_continuous() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 5_400.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    assert!(plan.append(prograde_burn(t0 + 2_400.0 * Unit::Second, 0.005)));
    assert_eq!(plan.number_of_segments(), 5);

    for index in 0..plan.number_of_segments() - 1 {
        let last_of_segment = plan.get_segment(index).last().unwrap();
        let first_of_next = plan.get_segment(index + 1).next().unwrap();
        assert_eq!(last_of_segment.0, first_of_next.0);
        assert_eq!(last_of_segment.1, first_of_next.1);
    }

    // The unified view of the plan is strictly monotonic in time.
    let mut previous: Option<Epoch> = None;
    for (time, _) in plan.get_all_segments() {
        if let Some(previous) = previous {
            assert!(time > previous);
        }
        previous = Some(time);
    }
}

/// The segment count invariant 2K+1 holds through appends, replacements
/// and removals.
#[test]
fn segment_count_invariant() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 5_400.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    let check = |plan: &FlightPlan| {
        assert_eq!(
            plan.number_of_segments(),
            2 * plan.number_of_manoeuvres() + 1
        );
    };
    check(&plan);

    assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    check(&plan);
    assert!(plan.append(prograde_burn(t0 + 2_400.0 * Unit::Second, 0.005)));
    check(&plan);

    assert!(plan.replace_last(prograde_burn(t0 + 2_700.0 * Unit::Second, 0.002)));
    check(&plan);
    assert_eq!(plan.number_of_manoeuvres(), 2);
    assert_eq!(
        plan.get_manoeuvre(1).initial_time(),
        t0 + 2_700.0 * Unit::Second
    );

    plan.remove_last();
    check(&plan);
    plan.remove_last();
    check(&plan);
    assert_eq!(plan.number_of_segments(), 1);

    // After removals the single coast still reaches the final time.
    let (last_time, _) = plan.get_all_segments().last().unwrap();
    assert_eq!(last_time, t0 + 5_400.0 * Unit::Second);
}

/// Appending a burn that starts before the start of the last coast fails
/// and leaves the plan unchanged.
#[test]
fn append_before_last_coast_fails_without_side_effects() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 3_600.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    let record_before = plan.write_to_record();

    // The last coast starts at the end of the first burn, after t0 + 600 s.
    assert!(!plan.append(prograde_burn(t0 + 300.0 * Unit::Second, 0.01)));
    assert_eq!(plan.write_to_record(), record_before);
    assert_eq!(plan.number_of_segments(), 3);

    // A burn which does not end before the final time is rejected too.
    assert!(!plan.append(prograde_burn(t0 + 3_599.0 * Unit::Second, 1.0)));
    assert_eq!(plan.write_to_record(), record_before);

    // A singular burn (no thrust) is rejected.
    let mut singular = prograde_burn(t0 + 1_200.0 * Unit::Second, 0.01);
    singular.thruster.thrust_n = 0.0;
    assert!(!plan.append(singular));
    assert_eq!(plan.write_to_record(), record_before);
}

/// Unreachable adaptive parameters are rejected and the previous ones are
/// restored, segments recomputed.
#[test]
fn set_adaptive_step_parameters_is_atomic() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 3_600.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    let original = *plan.adaptive_step_parameters();

    // Five steps cannot coast ten minutes at millimeter tolerances.
    let unreachable = AdaptiveStepParameters::new(
        AdaptiveStepIntegratorId::DormandPrince54,
        5,
        1e-13,
        1e-16,
    );
    assert!(!plan.set_adaptive_step_parameters(unreachable));
    assert_eq!(plan.adaptive_step_parameters(), &original);
    assert!(!plan.is_anomalous());
    assert_eq!(plan.number_of_segments(), 3);

    // The restored plan remains editable.
    assert!(plan.set_final_time(t0 + 4_200.0 * Unit::Second));
    let (last_time, _) = plan.get_all_segments().last().unwrap();
    assert_eq!(last_time, t0 + 4_200.0 * Unit::Second);
}

#[test]
fn set_final_time_before_last_coast_fails() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let mut plan = FlightPlan::new(
        &mut root,
        t0,
        t0 + 3_600.0 * Unit::Second,
        1_000.0,
        &mut ephemeris,
        adaptive_parameters(),
    );
    assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    let start_of_last_coast = plan.get_manoeuvre(0).final_time();
    assert!(!plan.set_final_time(start_of_last_coast - 1.0 * Unit::Second));
    assert_eq!(plan.final_time(), t0 + 3_600.0 * Unit::Second);

    // Truncating to a legal time works and shortens the plan.
    assert!(plan.set_final_time(t0 + 1_800.0 * Unit::Second));
    let (last_time, _) = plan.get_all_segments().last().unwrap();
    assert_eq!(last_time, t0 + 1_800.0 * Unit::Second);
}

/// Dropping the plan removes every fork from the root trajectory.
#[test]
fn dropping_the_plan_cleans_the_root() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    {
        let mut plan = FlightPlan::new(
            &mut root,
            t0,
            t0 + 3_600.0 * Unit::Second,
            1_000.0,
            &mut ephemeris,
            adaptive_parameters(),
        );
        assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
    }
    assert_eq!(root.fork_ids_in_record_order(), vec![ForkId::ROOT]);
    assert_eq!(root.len(ForkId::ROOT), 1);
}

#[test]
fn flight_plan_record_round_trips() {
    let (mut ephemeris, mut root, t0) = leo_setup();
    let record = {
        let mut plan = FlightPlan::new(
            &mut root,
            t0,
            t0 + 3_600.0 * Unit::Second,
            1_000.0,
            &mut ephemeris,
            adaptive_parameters(),
        );
        assert!(plan.append(prograde_burn(t0 + 600.0 * Unit::Second, 0.01)));
        plan.write_to_record()
    };

    let reread = read_flight_plan_from_record(&record, &mut root, &[], &mut ephemeris).unwrap();
    assert_eq!(reread.number_of_manoeuvres(), 1);
    assert_eq!(reread.number_of_segments(), 3);
    assert_eq!(reread.write_to_record(), record);
}

/// Legacy records carry explicit segment pointers and bare adaptive
/// settings; reading one adopts the segments and recomputes them.
#[test]
fn pre_buniakovski_flight_plan_is_recomputed() {
    let (mut ephemeris, mut root, t0) = leo_setup();

    // A legacy save: three chained (empty) segment forks in the root, and
    // the manœuvre they were computed from.
    let coast0 = root.new_fork_without_copy_at(ForkId::ROOT, t0);
    let burn0 = root.new_fork_at_last(coast0);
    let coast1 = root.new_fork_at_last(burn0);
    let fork_ids = root.fork_ids_in_record_order();
    let index_of = |id: ForkId| fork_ids.iter().position(|other| *other == id).unwrap();

    let manoeuvre = NavigationManoeuvre::new(prograde_burn(t0 + 600.0 * Unit::Second, 0.01), 1_000.0);
    let record = FlightPlanRecord {
        initial_time: t0,
        final_time: t0 + 3_600.0 * Unit::Second,
        initial_mass_kg: 1_000.0,
        adaptive_step_parameters: None,
        manoeuvres: vec![manoeuvre],
        segments: vec![index_of(coast0), index_of(burn0), index_of(coast1)],
        integrator: Some(AdaptiveStepIntegratorId::DormandPrince54),
        length_integration_tolerance_km: Some(1e-6),
        speed_integration_tolerance_km_s: Some(1e-9),
    };

    let plan = read_flight_plan_from_record(&record, &mut root, &fork_ids, &mut ephemeris).unwrap();
    assert_eq!(plan.number_of_segments(), 3);
    assert_eq!(plan.number_of_manoeuvres(), 1);
    assert_eq!(plan.adaptive_step_parameters().max_steps(), 1000);
    let (last_time, _) = plan.get_all_segments().last().unwrap();
    assert_eq!(last_time, t0 + 3_600.0 * Unit::Second);
}
