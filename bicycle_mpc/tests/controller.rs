use std::time::{Duration, Instant};

use bicycle_mpc::{
    BoundsSet, ControlError, HorizonFormulation, HorizonNlp, MpcConfig, MpcController, NlpSolver,
    ReferencePolynomial, SolveStatus, SqpSolver, VehicleState64,
};
use named_vec_ops::NamedVecOps;

/// Canonical tuning with a budget generous enough for unoptimised test builds.
fn config() -> MpcConfig {
    let mut config = MpcConfig::default();
    config.solver.time_budget_s = 60.0;
    config
}

fn straight_line_state() -> VehicleState64 {
    VehicleState64 {
        v: 10.0,
        ..VehicleState64::zeros()
    }
}

/// On the bundled S-bend, half a metre off and slightly misaligned.
fn s_bend() -> (VehicleState64, ReferencePolynomial) {
    let reference = ReferencePolynomial::new(vec![0.0, 0.0, 2.0e-3, -2.0e-5]);
    let (x, y, psi) = (30.0, 1.0, 0.05);
    let state = VehicleState64 {
        x,
        y,
        psi,
        v: 20.0,
        cte: reference.eval(x) - y,
        epsi: psi - reference.desired_heading(x),
    };
    (state, reference)
}

#[test]
fn straight_line_drives_straight_and_accelerates() {
    let mut mpc = MpcController::new(&config()).unwrap();
    let out = mpc
        .step(&straight_line_state(), &ReferencePolynomial::new(vec![0.0, 0.0]))
        .unwrap();

    assert!(out.actuation.delta.abs() < 1e-6, "steering {}", out.actuation.delta);
    assert!(out.actuation.a > 0.0, "acceleration {}", out.actuation.a);
    assert!(out.actuation.a <= 1.0 + 1e-6);

    assert_eq!(out.predicted.xs.len(), 15);
    assert!(out.predicted.ys.iter().all(|y| y.abs() < 1e-6), "{:?}", out.predicted.ys);
    assert!(
        out.predicted.xs.windows(2).all(|w| w[1] > w[0]),
        "{:?}",
        out.predicted.xs
    );
    assert!(out.cost.is_finite());
}

#[test]
fn standing_still_on_a_flat_reference_does_not_steer() {
    let mut mpc = MpcController::new(&config()).unwrap();
    let state = VehicleState64::zeros();
    let out = mpc.step(&state, &ReferencePolynomial::new(vec![0.0])).unwrap();

    assert!(out.actuation.delta.abs() < 1e-6, "steering {}", out.actuation.delta);
    assert!(out.actuation.a > 0.0);
}

#[test]
fn offset_from_path_steers_towards_it() {
    // Path one metre to the left.
    let reference = ReferencePolynomial::new(vec![1.0]);
    let state = VehicleState64 {
        x: 0.0,
        y: 0.0,
        psi: 0.0,
        v: 10.0,
        cte: 1.0,
        epsi: 0.0,
    };

    let mut mpc = MpcController::new(&config()).unwrap();
    let out = mpc.step(&state, &reference).unwrap();

    assert!(out.actuation.delta > 0.0, "steering {}", out.actuation.delta);
    assert!(out.actuation.delta <= 0.436332 + 1e-6);
    assert!(out.predicted.ys.last().unwrap() > &0.0);
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let reference = ReferencePolynomial::new(vec![0.5, 0.05, -0.002]);
    let state = VehicleState64 {
        x: 0.0,
        y: 0.0,
        psi: 0.05,
        v: 15.0,
        cte: 0.5,
        epsi: -0.1,
    };

    let mut first = MpcController::new(&config()).unwrap();
    let mut second = MpcController::new(&config()).unwrap();

    let a = first.step(&state, &reference).unwrap();
    let b = first.step(&state, &reference).unwrap();
    let c = second.step(&state, &reference).unwrap();

    for other in [&b, &c] {
        assert_eq!(a.actuation, other.actuation);
        assert_eq!(a.predicted, other.predicted);
        assert_eq!(a.cost, other.cost);
    }
}

#[test]
fn zero_budget_is_a_timeout() {
    let mut config = config();
    config.solver.time_budget_s = 0.0;
    let mut mpc = MpcController::new(&config).unwrap();

    let err = mpc
        .step(&straight_line_state(), &ReferencePolynomial::default())
        .unwrap_err();
    assert!(matches!(err, ControlError::Timeout { budget, .. } if budget == Duration::ZERO));
}

#[test]
fn solution_satisfies_the_dynamics() {
    let config = config();
    let formulation = HorizonFormulation::from_config(&config).unwrap();
    let layout = *formulation.layout();
    let reference = ReferencePolynomial::new(vec![-0.3, 0.1, 0.01]);
    let state = VehicleState64 {
        x: 0.0,
        y: 0.0,
        psi: 0.0,
        v: 5.0,
        cte: -0.3,
        epsi: -0.1,
    };

    let bounds = BoundsSet::generate(&layout, &config.bounds, &state);
    let guess = formulation.initial_guess(&state);
    let result = SqpSolver::new(config.solver.sqp_settings())
        .solve(
            &HorizonNlp::new(&formulation, &reference),
            &bounds,
            &guess,
            Duration::from_secs(60),
        )
        .unwrap();

    assert_eq!(result.status, SolveStatus::Success);
    assert!(result.constraint_violation < 1e-6);

    let (_, residuals) = formulation.residuals(&reference, &result.x);
    for (i, r) in residuals.iter().enumerate().skip(6) {
        assert!(r.abs() < 1e-6, "residual {i} = {r}");
    }
    let pinned = layout.read_state(&result.x, 0).to_svector() - state.to_svector();
    assert!(pinned.amax() < 1e-6, "{pinned:?}");
    for (i, x) in result.x.iter().enumerate() {
        assert!(*x >= bounds.var_lower[i] - 1e-6 && *x <= bounds.var_upper[i] + 1e-6);
    }
}

#[test]
fn default_budget_is_enough_for_one_cycle() {
    let config = MpcConfig::default();
    assert_eq!(config.solver.time_budget_s, 0.5);
    let (state, reference) = s_bend();

    let mut mpc = MpcController::new(&config).unwrap();
    let out = mpc.step(&state, &reference).unwrap();

    assert!(out.solve_time < Duration::from_millis(500));
    assert!(out.actuation.delta.abs() <= 0.436332 + 1e-6);
}

#[test]
fn long_horizon_stops_shortly_after_its_budget() {
    let mut config = MpcConfig::default();
    config.horizon.steps = 120;
    config.solver.time_budget_s = 0.1;
    let (state, reference) = s_bend();
    let mut mpc = MpcController::new(&config).unwrap();

    let start = Instant::now();
    let result = mpc.step(&state, &reference);
    let wall = start.elapsed();

    assert!(
        matches!(result, Ok(_) | Err(ControlError::Timeout { .. })),
        "{result:?}"
    );
    assert!(wall < Duration::from_secs(1), "budget 100ms, wall {wall:?}");
}
