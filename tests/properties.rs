use float_cmp::approx_eq;
use mass_spring::{MassSpringSystem, Obstacle, Plane, SimulationDriver, SimulationParameters, Sphere, Vector};
use nalgebra::vector;
use test_case::test_case;

fn weightless(time_step: f64) -> SimulationParameters<3> {
    SimulationParameters {
        time_step,
        gravity: Vector::<3>::zeros(),
        ..SimulationParameters::default()
    }
}

fn momentum_is_zero(system: &MassSpringSystem<3>) -> bool {
    system.linear_momentum().iter().all(|p| p.abs() < 1e-9)
}

#[test]
fn momentum_is_conserved_without_external_forces() {
    let system = MassSpringSystem::new(
        vec![vector![0.0, 0.0, 0.0], vector![1.2, 0.3, -0.4]],
        vec![1.0, 2.0],
        vec![[0, 1]],
        50.0,
        0.0,
    )
    .unwrap()
    .with_rest_lengths(vec![0.8])
    .unwrap()
    .with_velocities(vec![vector![0.2, 0.0, 0.0], vector![-0.1, 0.0, 0.0]])
    .unwrap();
    assert!(momentum_is_zero(&system));

    let mut driver = SimulationDriver::new(system, Vec::new(), weightless(1e-4)).unwrap();
    for _ in 0..5000 {
        driver.advance_one_step_explicit_integration().unwrap();
        assert!(momentum_is_zero(driver.system()));
    }
    // the spring has actually been oscillating
    assert!(driver.system().positions()[1] != vector![1.2, 0.3, -0.4]);
}

#[test]
fn spring_at_rest_length_stays_put() {
    let positions = vec![vector![0.3, -1.0, 2.0], vector![1.1, 0.5, 2.0]];
    let system = MassSpringSystem::new(positions.clone(), vec![1.0, 1.0], vec![[0, 1]], 100.0, 3.0).unwrap();

    let forces = system.evaluate_spring_forces().unwrap();
    assert!(forces.iter().all(|f| *f == Vector::<3>::zeros()));

    let mut driver = SimulationDriver::new(system, Vec::new(), weightless(1e-4)).unwrap();
    for _ in 0..1000 {
        driver.advance_one_step_explicit_integration().unwrap();
    }
    assert_eq!(driver.system().positions(), positions.as_slice());
    assert!(driver.system().velocities().iter().all(|v| *v == Vector::<3>::zeros()));
}

#[test_case(vector![0.0, 0.0, 0.0], vector![1.5, 0.0, 0.0], 1.0 ; "stretched along x")]
#[test_case(vector![0.1, 0.2, 0.3], vector![0.4, -0.7, 0.9], 2.0 ; "compressed skew")]
#[test_case(vector![-3.0, 1e-3, 7.0], vector![-3.0, 2e-3, 7.0], 0.5 ; "tiny segment")]
fn endpoint_forces_are_antisymmetric(a: Vector<3>, b: Vector<3>, rest_length: f64) {
    let system = MassSpringSystem::new(vec![a, b], vec![1.0, 3.0], vec![[0, 1]], 75.0, 1.5)
        .unwrap()
        .with_rest_lengths(vec![rest_length])
        .unwrap()
        .with_velocities(vec![vector![1.0, -2.0, 0.5], vector![0.0, 4.0, -1.0]])
        .unwrap();

    let spring = system.evaluate_spring_forces().unwrap();
    assert_eq!(spring[0], -spring[1]);
    assert!(spring[0].norm() > 0.0);

    let damping = system.evaluate_damping_forces().unwrap();
    assert_eq!(damping[0], -damping[1]);
}

#[test]
fn shared_nodes_sum_contributions() {
    // node 1 sits in the middle of two equally stretched springs
    let system = MassSpringSystem::new(
        vec![vector![0.0, 0.0, 0.0], vector![1.0, 0.0, 0.0], vector![2.0, 0.0, 0.0]],
        vec![1.0; 3],
        vec![[0, 1], [1, 2]],
        10.0,
        0.0,
    )
    .unwrap()
    .with_rest_lengths(vec![0.5, 0.5])
    .unwrap();

    let forces = system.evaluate_spring_forces().unwrap();
    assert!(approx_eq!(f64, forces[1].norm(), 0.0, epsilon = 1e-12));
    assert!(approx_eq!(f64, forces[0][0], 10.0, epsilon = 1e-12));
    assert!(approx_eq!(f64, forces[2][0], -10.0, epsilon = 1e-12));
}

#[test]
fn fixed_nodes_never_move() {
    let mut system = MassSpringSystem::new(
        vec![vector![0.4, 0.5, 0.4], vector![0.4, 0.9, 0.4], vector![0.9, 0.9, 0.4]],
        vec![0.1; 3],
        vec![[0, 1], [1, 2], [0, 2]],
        200.0,
        0.5,
    )
    .unwrap()
    .with_rest_lengths(vec![0.2, 0.3, 0.4])
    .unwrap()
    .with_velocities(vec![vector![3.0, 0.0, 0.0], vector![0.0, 1.0, 0.0], vector![0.0, 0.0, 0.0]])
    .unwrap();
    system.set_fixed(0, true).unwrap();

    // node 0 sits inside the sphere, so it also receives a collision force
    let sphere = Sphere::new(5e3, vector![0.4, 0.4, 0.4], 0.25).unwrap();
    let parameters = SimulationParameters {
        time_step: 1e-4,
        ..SimulationParameters::default()
    };
    let mut driver = SimulationDriver::new(system, vec![Obstacle::Sphere(sphere)], parameters).unwrap();

    for _ in 0..500 {
        driver.advance_one_step_explicit_integration().unwrap();
        assert_eq!(driver.system().positions()[0], vector![0.4, 0.5, 0.4]);
        assert_eq!(driver.system().velocities()[0], Vector::<3>::zeros());
    }
    assert!(driver.system().positions()[2] != vector![0.9, 0.9, 0.4]);
}

#[test]
fn releasing_a_fixed_node_starts_from_rest() {
    let mut system = MassSpringSystem::<2>::new(
        vec![vector![0.0, 0.0], vector![1.0, 0.0]],
        vec![1.0; 2],
        vec![[0, 1]],
        1.0,
        0.0,
    )
    .unwrap()
    .with_velocities(vec![vector![2.0, 2.0], vector![0.0, 0.0]])
    .unwrap();
    system.set_fixed(0, true).unwrap();

    let parameters = SimulationParameters {
        time_step: 1e-3,
        gravity: vector![0.0, 0.0],
        ..SimulationParameters::default()
    };
    let mut driver = SimulationDriver::new(system, Vec::new(), parameters).unwrap();
    driver.advance_one_step_explicit_integration().unwrap();

    let mut system = driver.into_system();
    assert_eq!(system.velocities()[0], vector![0.0, 0.0]);

    // the stale initial velocity was discarded while fixed
    system.set_fixed(0, false).unwrap();
    let parameters = SimulationParameters {
        time_step: 1e-3,
        gravity: vector![0.0, 0.0],
        ..SimulationParameters::default()
    };
    let mut driver = SimulationDriver::new(system, Vec::new(), parameters).unwrap();
    driver.advance_one_step_explicit_integration().unwrap();
    assert_eq!(driver.system().positions()[0], vector![0.0, 0.0]);
}

#[test_case(vector![0.45, 0.35, 0.5] ; "inside")]
#[test_case(vector![0.4, 0.64, 0.4] ; "just under the surface")]
fn sphere_repels_inside_points(point: Vector<3>) {
    let center = vector![0.4, 0.4, 0.4];
    let obstacle = Obstacle::Sphere(Sphere::new(5e3, center, 0.25).unwrap());

    let f = obstacle.resolve_collision(&point);
    assert!(f.norm() > 0.0);
    assert!(f.dot(&(point - center)) > 0.0);
}

#[test_case(vector![0.4, 0.66, 0.4] ; "just above the surface")]
#[test_case(vector![-2.0, 5.0, 1.0] ; "far away")]
fn sphere_ignores_outside_points(point: Vector<3>) {
    let obstacle = Obstacle::Sphere(Sphere::new(5e3, vector![0.4, 0.4, 0.4], 0.25).unwrap());
    assert_eq!(obstacle.resolve_collision(&point), Vector::<3>::zeros());
}

#[test]
fn ground_plane_catches_a_falling_node() {
    let system = MassSpringSystem::<2>::new(vec![vector![0.0, 0.1]], vec![1.0], Vec::new(), 0.0, 0.0).unwrap();
    let ground = Plane::new(1e4, vector![0.0, 0.0], vector![0.0, 1.0]).unwrap();
    let parameters = SimulationParameters {
        time_step: 1e-4,
        ..SimulationParameters::default()
    };
    let mut driver = SimulationDriver::new(system, vec![ground.into()], parameters).unwrap();

    let mut lowest = f64::MAX;
    for _ in 0..5000 {
        driver.advance_one_step_explicit_integration().unwrap();
        lowest = lowest.min(driver.system().positions()[0][1]);
    }

    assert!(lowest < 0.0, "node never reached the ground");
    assert!(lowest > -0.05, "node fell through the ground to {lowest}");
}
