use nalgebra::SVector;

/// A point, velocity, or force in `D`-dimensional space
pub type Vector<const D: usize> = SVector<f64, D>;

pub const DEFAULT_TIME_STEP: f64 = 1e-5;
pub const DEFAULT_GRAVITY: f64 = -9.8;
pub const DEFAULT_COLLISION_STIFFNESS: f64 = 5e3;
pub const DEFAULT_TARGET_FRAME_RATE: f64 = 24.0;
pub const DEFAULT_MAX_FRAME: usize = 120;

/// Run parameters consumed by the driver. Constant for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters<const D: usize> {
    pub time_step: f64,
    pub gravity: Vector<D>,
    /// Stiffness given to obstacles that don't specify their own
    pub collision_stiffness: f64,
    pub target_frame_rate: f64,
    pub max_frame: usize,
}

impl<const D: usize> Default for SimulationParameters<D> {
    fn default() -> Self {
        let mut gravity = Vector::<D>::zeros();
        if D > 1 {
            gravity[1] = DEFAULT_GRAVITY;
        }

        SimulationParameters {
            time_step: DEFAULT_TIME_STEP,
            gravity,
            collision_stiffness: DEFAULT_COLLISION_STIFFNESS,
            target_frame_rate: DEFAULT_TARGET_FRAME_RATE,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

/// Axis-aligned box selecting nodes. Bounds are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRegion<const D: usize> {
    pub min: Vector<D>,
    pub max: Vector<D>,
}

impl<const D: usize> BoundaryRegion<D> {
    pub fn unbounded() -> Self {
        BoundaryRegion {
            min: Vector::<D>::repeat(f64::MIN),
            max: Vector::<D>::repeat(f64::MAX),
        }
    }

    pub fn contains(&self, point: &Vector<D>) -> bool {
        (0..D).all(|i| point[i] > self.min[i] && point[i] < self.max[i])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryTarget<const D: usize> {
    pub fixed: Option<bool>,
    pub velocity: Option<Vector<D>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule<const D: usize> {
    pub name: String,
    pub region: BoundaryRegion<D>,
    pub target: BoundaryTarget<D>,
}
