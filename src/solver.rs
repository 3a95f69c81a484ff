use indicatif::ProgressBar;

use crate::{
    datatypes::{SimulationParameters, Vector},
    error::SimulationError,
    geometry::Obstacle,
    mass_spring::MassSpringSystem,
    post_processor::SnapshotSink,
};

/// Relative deviation from an integer tolerated when deriving substeps
const SUBSTEP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Running { frame: usize, substep: usize },
    Completed,
}

/// Derives how many integration steps make up one output frame
///
/// # Arguments
/// * `time_step` - The integration step size
/// * `target_frame_rate` - Output frames per simulated second
///
/// # Returns
/// The rounded number of substeps per frame. Fails if it rounds below one.
pub fn compute_substeps_per_frame(
    time_step: f64,
    target_frame_rate: f64,
) -> Result<usize, SimulationError> {
    if !time_step.is_finite() || time_step <= 0.0 {
        return Err(SimulationError::Input(format!(
            "Time step must be positive and finite, got {time_step}"
        )));
    }
    if !target_frame_rate.is_finite() || target_frame_rate <= 0.0 {
        return Err(SimulationError::Input(format!(
            "Target frame rate must be positive and finite, got {target_frame_rate}"
        )));
    }

    let exact = (1.0 / target_frame_rate) / time_step;
    let rounded = exact.round();

    if rounded < 1.0 {
        return Err(SimulationError::Input(format!(
            "Time step {time_step} is longer than one frame at {target_frame_rate} fps"
        )));
    }
    if (exact - rounded).abs() > SUBSTEP_TOLERANCE * exact {
        ftlog::warn!(
            "frame duration is not a whole number of time steps ({exact:.6} steps); using {rounded} substeps per frame"
        );
    }

    Ok(rounded as usize)
}

/// Advances a mass spring system through time with explicit integration and
/// emits one snapshot per frame
pub struct SimulationDriver<const D: usize> {
    system: MassSpringSystem<D>,
    obstacles: Vec<Obstacle<D>>,
    parameters: SimulationParameters<D>,
    substeps_per_frame: usize,
    state: DriverState,
}

impl<const D: usize> SimulationDriver<D> {
    /// Creates a driver, validating the run parameters
    ///
    /// # Arguments
    /// * `system` - The mass spring system to simulate. Owned for the run.
    /// * `obstacles` - Static collision shapes
    /// * `parameters` - Time step, gravity, frame rate and frame count
    pub fn new(
        system: MassSpringSystem<D>,
        obstacles: Vec<Obstacle<D>>,
        parameters: SimulationParameters<D>,
    ) -> Result<SimulationDriver<D>, SimulationError> {
        if !parameters.gravity.iter().all(|g| g.is_finite()) {
            return Err(SimulationError::Input(
                "Gravity must be finite".to_owned(),
            ));
        }
        if parameters.max_frame < 1 {
            return Err(SimulationError::Input(
                "max_frame must be at least 1".to_owned(),
            ));
        }
        let substeps_per_frame =
            compute_substeps_per_frame(parameters.time_step, parameters.target_frame_rate)?;

        Ok(SimulationDriver {
            system,
            obstacles,
            parameters,
            substeps_per_frame,
            state: DriverState::NotStarted,
        })
    }

    pub fn system(&self) -> &MassSpringSystem<D> {
        &self.system
    }

    pub fn into_system(self) -> MassSpringSystem<D> {
        self.system
    }

    pub fn obstacles(&self) -> &[Obstacle<D>] {
        &self.obstacles
    }

    pub fn parameters(&self) -> &SimulationParameters<D> {
        &self.parameters
    }

    pub fn substeps_per_frame(&self) -> usize {
        self.substeps_per_frame
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Advances every node by one time step.
    ///
    /// Forces are evaluated once from the current state. Free nodes then take
    /// a semi-implicit Euler step: velocity from the old forces, position from
    /// the new velocity. Fixed nodes have their velocity zeroed and stay put.
    pub fn advance_one_step_explicit_integration(&mut self) -> Result<(), SimulationError> {
        let f_spring = self.system.evaluate_spring_forces()?;
        let f_damping = self.system.evaluate_damping_forces()?;

        let dt = self.parameters.time_step;
        let gravity = self.parameters.gravity;
        let obstacles = &self.obstacles;
        let nodes = self.system.nodes_mut();

        for p in 0..nodes.positions.len() {
            if nodes.node_is_fixed[p] {
                nodes.velocities[p] = Vector::<D>::zeros();
                continue;
            }

            let f_collision = obstacles
                .iter()
                .fold(Vector::<D>::zeros(), |acc, obstacle| {
                    acc + obstacle.resolve_collision(&nodes.positions[p])
                });

            let acceleration = (f_spring[p] + f_damping[p] + f_collision) / nodes.masses[p] + gravity;
            nodes.velocities[p] += acceleration * dt;
            let velocity = nodes.velocities[p];
            nodes.positions[p] += velocity * dt;

            let finite = nodes.velocities[p].iter().all(|c| c.is_finite())
                && nodes.positions[p].iter().all(|c| c.is_finite());
            if !finite {
                return Err(SimulationError::Solver(format!(
                    "Node {p} reached a non-finite state. Try a smaller time step"
                )));
            }
        }

        Ok(())
    }

    /// Simulates frames `1..max_frame`, handing each finished frame to `sink`
    ///
    /// # Arguments
    /// * `sink` - Receives the system after each frame's substeps
    pub fn run<S: SnapshotSink<D>>(&mut self, sink: &mut S) -> Result<(), SimulationError> {
        if self.state != DriverState::NotStarted {
            return Err(SimulationError::Solver(format!(
                "Simulation cannot be started from state {:?}",
                self.state
            )));
        }

        let max_frame = self.parameters.max_frame;
        ftlog::info!(
            "simulating {} frames with {} nodes, {} segments and {} obstacles ({} substeps per frame)",
            max_frame.saturating_sub(1),
            self.system.node_count(),
            self.system.segment_count(),
            self.obstacles.len(),
            self.substeps_per_frame
        );

        let start = std::time::Instant::now();
        let bar = ProgressBar::new(max_frame.saturating_sub(1) as u64);

        for frame in 1..max_frame {
            for substep in 1..=self.substeps_per_frame {
                self.state = DriverState::Running { frame, substep };
                self.advance_one_step_explicit_integration()?;
            }

            sink.write_frame(frame, &self.system)?;

            ftlog::debug!(
                "frame {frame}: kinetic energy {:.6e}, elastic energy {:.6e}, momentum {:?}",
                self.system.kinetic_energy(),
                self.system.elastic_energy(),
                self.system.linear_momentum().as_slice()
            );
            bar.inc(1);
        }
        bar.finish_and_clear();

        self.state = DriverState::Completed;

        let elapsed = start.elapsed().as_secs_f32();
        ftlog::info!("simulation complete in {:.3} seconds", elapsed);

        Ok(())
    }
}
