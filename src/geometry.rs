use crate::{datatypes::Vector, error::SimulationError};

/// Distance outside the surface that penetrating points are pulled to, so
/// they don't re-enter on the next step
pub const COLLISION_MARGIN: f64 = 1e-5;

fn check_stiffness(stiffness: f64) -> Result<(), SimulationError> {
    if !stiffness.is_finite() || stiffness < 0.0 {
        return Err(SimulationError::Input(format!(
            "Obstacle stiffness must be finite and non-negative, got {stiffness}"
        )));
    }
    Ok(())
}

/// Zero rest length spring pulling `point` to `target`
fn zero_length_spring<const D: usize>(stiffness: f64, point: &Vector<D>, target: &Vector<D>) -> Vector<D> {
    (point - target) * -stiffness
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sphere<const D: usize> {
    stiffness: f64,
    center: Vector<D>,
    radius: f64,
}

impl<const D: usize> Sphere<D> {
    pub fn new(stiffness: f64, center: Vector<D>, radius: f64) -> Result<Sphere<D>, SimulationError> {
        check_stiffness(stiffness)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(SimulationError::Input(format!(
                "Sphere radius must be positive, got {radius}"
            )));
        }
        if !center.iter().all(|c| c.is_finite()) {
            return Err(SimulationError::Input(
                "Sphere center must be finite".to_owned(),
            ));
        }

        Ok(Sphere {
            stiffness,
            center,
            radius,
        })
    }

    pub fn center(&self) -> &Vector<D> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Pushes a point inside the sphere radially out to just past the surface.
    /// Points outside (or on) the surface get no force.
    pub fn point_collision(&self, point: &Vector<D>) -> Vector<D> {
        let d = point - self.center;
        let distance_sq = d.norm_squared();

        if distance_sq >= self.radius * self.radius {
            return Vector::<D>::zeros();
        }

        let distance = distance_sq.sqrt();
        // no radial direction at the center, fall back to the first axis
        let direction = if distance > 0.0 {
            d / distance
        } else {
            let mut e0 = Vector::<D>::zeros();
            e0[0] = 1.0;
            e0
        };
        let target = self.center + direction * (self.radius + COLLISION_MARGIN);

        zero_length_spring(self.stiffness, point, &target)
    }
}

/// Half-space boundary. The normal points to the free side.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<const D: usize> {
    stiffness: f64,
    origin: Vector<D>,
    normal: Vector<D>,
}

impl<const D: usize> Plane<D> {
    /// Creates a plane through `origin`. The normal does not need to be unit
    /// length, but it must not be zero.
    pub fn new(stiffness: f64, origin: Vector<D>, normal: Vector<D>) -> Result<Plane<D>, SimulationError> {
        check_stiffness(stiffness)?;
        if !origin.iter().all(|c| c.is_finite()) {
            return Err(SimulationError::Input(
                "Plane origin must be finite".to_owned(),
            ));
        }
        let length = normal.norm();
        if !length.is_finite() || length == 0.0 {
            return Err(SimulationError::Input(format!(
                "Plane normal must be finite and non-zero, got length {length}"
            )));
        }

        Ok(Plane {
            stiffness,
            origin,
            normal: normal / length,
        })
    }

    pub fn origin(&self) -> &Vector<D> {
        &self.origin
    }

    pub fn normal(&self) -> &Vector<D> {
        &self.normal
    }

    pub fn signed_distance(&self, point: &Vector<D>) -> f64 {
        (point - self.origin).dot(&self.normal)
    }

    /// Pushes a point behind the plane back along the normal to just past
    /// the surface
    pub fn point_collision(&self, point: &Vector<D>) -> Vector<D> {
        let s = self.signed_distance(point);

        if s >= 0.0 {
            return Vector::<D>::zeros();
        }

        let target = point + self.normal * (COLLISION_MARGIN - s);

        zero_length_spring(self.stiffness, point, &target)
    }
}

/// Static collision shapes. Consulted every substep, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Obstacle<const D: usize> {
    Sphere(Sphere<D>),
    Plane(Plane<D>),
}

impl<const D: usize> Obstacle<D> {
    /// Computes the repulsive force on a point
    ///
    /// # Arguments
    /// * `point` - The query position
    ///
    /// # Returns
    /// The collision force, exactly zero when the point does not penetrate
    pub fn resolve_collision(&self, point: &Vector<D>) -> Vector<D> {
        match self {
            Obstacle::Sphere(sphere) => sphere.point_collision(point),
            Obstacle::Plane(plane) => plane.point_collision(point),
        }
    }

    pub fn stiffness(&self) -> f64 {
        match self {
            Obstacle::Sphere(sphere) => sphere.stiffness,
            Obstacle::Plane(plane) => plane.stiffness,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Obstacle::Sphere(_) => "sphere",
            Obstacle::Plane(_) => "plane",
        }
    }
}

impl<const D: usize> From<Sphere<D>> for Obstacle<D> {
    fn from(sphere: Sphere<D>) -> Self {
        Obstacle::Sphere(sphere)
    }
}

impl<const D: usize> From<Plane<D>> for Obstacle<D> {
    fn from(plane: Plane<D>) -> Self {
        Obstacle::Plane(plane)
    }
}
