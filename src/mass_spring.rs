use crate::{datatypes::Vector, error::SimulationError};

/// Point masses connected by damped springs, stored as parallel arrays
/// indexed by node (and by segment for the rest lengths).
///
/// Node and segment counts are fixed once the system is built; only the
/// per-node state changes while simulating.
#[derive(Debug, Clone)]
pub struct MassSpringSystem<const D: usize> {
    segments: Vec<[usize; 2]>,
    masses: Vec<f64>,
    positions: Vec<Vector<D>>,
    velocities: Vec<Vector<D>>,
    node_is_fixed: Vec<bool>,
    rest_lengths: Vec<f64>,
    youngs_modulus: f64,
    damping_coeff: f64,
}

/// Mutable view over the per-node state handed to the integrator
pub struct NodesMut<'a, const D: usize> {
    pub positions: &'a mut [Vector<D>],
    pub velocities: &'a mut [Vector<D>],
    pub masses: &'a [f64],
    pub node_is_fixed: &'a [bool],
}

fn is_finite<const D: usize>(v: &Vector<D>) -> bool {
    v.iter().all(|c| c.is_finite())
}

impl<const D: usize> MassSpringSystem<D> {
    /// Builds a system at rest. Rest lengths are taken from the initial
    /// segment lengths, every node starts free with zero velocity.
    ///
    /// # Arguments
    /// * `positions` - Initial node positions
    /// * `masses` - Node masses, one per position
    /// * `segments` - Pairs of node indices joined by a spring
    /// * `youngs_modulus` - Spring stiffness shared by every segment
    /// * `damping_coeff` - Axial damping coefficient shared by every segment
    ///
    /// # Returns
    /// The validated system, or a Mesh error describing the first problem found
    pub fn new(
        positions: Vec<Vector<D>>,
        masses: Vec<f64>,
        segments: Vec<[usize; 2]>,
        youngs_modulus: f64,
        damping_coeff: f64,
    ) -> Result<MassSpringSystem<D>, SimulationError> {
        if positions.is_empty() {
            return Err(SimulationError::Mesh(
                "Mass spring system needs at least one node".to_owned(),
            ));
        }
        if masses.len() != positions.len() {
            return Err(SimulationError::Mesh(format!(
                "Got {} masses for {} nodes",
                masses.len(),
                positions.len()
            )));
        }
        if !youngs_modulus.is_finite() || youngs_modulus < 0.0 {
            return Err(SimulationError::Mesh(format!(
                "Youngs modulus must be finite and non-negative, got {youngs_modulus}"
            )));
        }
        if !damping_coeff.is_finite() || damping_coeff < 0.0 {
            return Err(SimulationError::Mesh(format!(
                "Damping coefficient must be finite and non-negative, got {damping_coeff}"
            )));
        }
        for (i, m) in masses.iter().enumerate() {
            if !m.is_finite() || *m <= 0.0 {
                return Err(SimulationError::Mesh(format!(
                    "Node {i} has invalid mass {m}. Masses must be positive and finite"
                )));
            }
        }
        for (i, x) in positions.iter().enumerate() {
            if !is_finite(x) {
                return Err(SimulationError::Mesh(format!(
                    "Node {i} has a non-finite position"
                )));
            }
        }
        for (i, [a, b]) in segments.iter().enumerate() {
            if *a >= positions.len() || *b >= positions.len() {
                return Err(SimulationError::Mesh(format!(
                    "Segment {i} references node ({a}, {b}) but there are only {} nodes",
                    positions.len()
                )));
            }
            if a == b {
                return Err(SimulationError::Mesh(format!(
                    "Segment {i} connects node {a} to itself"
                )));
            }
        }

        let rest_lengths = segments
            .iter()
            .map(|[a, b]| (positions[*a] - positions[*b]).norm())
            .collect();

        let node_count = positions.len();
        let system = MassSpringSystem {
            segments,
            masses,
            positions,
            velocities: vec![Vector::<D>::zeros(); node_count],
            node_is_fixed: vec![false; node_count],
            rest_lengths,
            youngs_modulus,
            damping_coeff,
        };
        system.validate_rest_lengths()?;

        Ok(system)
    }

    /// Replaces the rest lengths derived from the initial positions
    pub fn with_rest_lengths(mut self, rest_lengths: Vec<f64>) -> Result<Self, SimulationError> {
        if rest_lengths.len() != self.segments.len() {
            return Err(SimulationError::Mesh(format!(
                "Got {} rest lengths for {} segments",
                rest_lengths.len(),
                self.segments.len()
            )));
        }
        self.rest_lengths = rest_lengths;
        self.validate_rest_lengths()?;

        Ok(self)
    }

    /// Replaces the initial (zero) velocities
    pub fn with_velocities(mut self, velocities: Vec<Vector<D>>) -> Result<Self, SimulationError> {
        if velocities.len() != self.positions.len() {
            return Err(SimulationError::Mesh(format!(
                "Got {} velocities for {} nodes",
                velocities.len(),
                self.positions.len()
            )));
        }
        if let Some(i) = velocities.iter().position(|v| !is_finite(v)) {
            return Err(SimulationError::Mesh(format!(
                "Node {i} has a non-finite velocity"
            )));
        }
        self.velocities = velocities;

        Ok(self)
    }

    fn validate_rest_lengths(&self) -> Result<(), SimulationError> {
        for (i, l) in self.rest_lengths.iter().enumerate() {
            if !l.is_finite() || *l <= 0.0 {
                let [a, b] = self.segments[i];
                return Err(SimulationError::Mesh(format!(
                    "Segment {i} ({a}, {b}) has invalid rest length {l}. Rest lengths must be positive"
                )));
            }
        }
        Ok(())
    }

    fn check_node(&self, node: usize) -> Result<(), SimulationError> {
        if node >= self.positions.len() {
            return Err(SimulationError::Mesh(format!(
                "Node index {node} out of bounds (count: {})",
                self.positions.len()
            )));
        }
        Ok(())
    }

    /// Pins or releases a node
    pub fn set_fixed(&mut self, node: usize, fixed: bool) -> Result<(), SimulationError> {
        self.check_node(node)?;
        self.node_is_fixed[node] = fixed;
        Ok(())
    }

    pub fn set_velocity(&mut self, node: usize, velocity: Vector<D>) -> Result<(), SimulationError> {
        self.check_node(node)?;
        if !is_finite(&velocity) {
            return Err(SimulationError::Mesh(format!(
                "Node {node} was given a non-finite velocity"
            )));
        }
        self.velocities[node] = velocity;
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn positions(&self) -> &[Vector<D>] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector<D>] {
        &self.velocities
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn node_is_fixed(&self) -> &[bool] {
        &self.node_is_fixed
    }

    pub fn segments(&self) -> &[[usize; 2]] {
        &self.segments
    }

    pub fn rest_lengths(&self) -> &[f64] {
        &self.rest_lengths
    }

    pub fn youngs_modulus(&self) -> f64 {
        self.youngs_modulus
    }

    pub fn damping_coeff(&self) -> f64 {
        self.damping_coeff
    }

    pub(crate) fn nodes_mut(&mut self) -> NodesMut<'_, D> {
        NodesMut {
            positions: &mut self.positions,
            velocities: &mut self.velocities,
            masses: &self.masses,
            node_is_fixed: &self.node_is_fixed,
        }
    }

    /// Current length of a segment and the unit vector pointing from its
    /// second endpoint to its first
    ///
    /// # Arguments
    /// * `segment` - Index of the target segment
    ///
    /// # Returns
    /// A tuple of the direction and the length, in that order. Fails when the
    /// endpoints coincide, since the direction is undefined.
    fn segment_axis(&self, segment: usize) -> Result<(Vector<D>, f64), SimulationError> {
        let [a, b] = self.segments[segment];
        let d = self.positions[a] - self.positions[b];
        let l = d.norm();

        if l == 0.0 || !l.is_finite() {
            return Err(SimulationError::Solver(format!(
                "Segment {segment} has degenerate length {l} between nodes {a} and {b}"
            )));
        }

        Ok((d / l, l))
    }

    /// Computes the elastic force on every node
    ///
    /// # Returns
    /// A vector of forces, one per node. A node shared by several segments
    /// receives the sum of their contributions.
    pub fn evaluate_spring_forces(&self) -> Result<Vec<Vector<D>>, SimulationError> {
        let mut f = vec![Vector::<D>::zeros(); self.positions.len()];

        for (i, [a, b]) in self.segments.iter().enumerate() {
            let (n12, l) = self.segment_axis(i)?;
            let f1 = n12 * (-self.youngs_modulus * (l / self.rest_lengths[i] - 1.0));
            f[*a] += f1;
            f[*b] -= f1;
        }

        Ok(f)
    }

    /// Computes the damping force on every node. Only the component of the
    /// relative velocity along each segment is damped.
    pub fn evaluate_damping_forces(&self) -> Result<Vec<Vector<D>>, SimulationError> {
        let mut f = vec![Vector::<D>::zeros(); self.positions.len()];

        for (i, [a, b]) in self.segments.iter().enumerate() {
            let (n12, _) = self.segment_axis(i)?;
            let relative_velocity = self.velocities[*a] - self.velocities[*b];
            // (n n^T) v without building the matrix
            let f1 = n12 * (-self.damping_coeff * n12.dot(&relative_velocity));
            f[*a] += f1;
            f[*b] -= f1;
        }

        Ok(f)
    }

    pub fn linear_momentum(&self) -> Vector<D> {
        self.velocities
            .iter()
            .zip(&self.masses)
            .fold(Vector::<D>::zeros(), |acc, (v, m)| acc + v * *m)
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.velocities
            .iter()
            .zip(&self.masses)
            .map(|(v, m)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Potential energy stored in the springs. Its negative gradient is the
    /// force from `evaluate_spring_forces`.
    pub fn elastic_energy(&self) -> f64 {
        self.segments
            .iter()
            .zip(&self.rest_lengths)
            .map(|([a, b], rest)| {
                let strain = (self.positions[*a] - self.positions[*b]).norm() / rest - 1.0;
                0.5 * self.youngs_modulus * rest * strain * strain
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use nalgebra::vector;

    use super::*;

    fn stretched_pair(damping_coeff: f64) -> MassSpringSystem<3> {
        MassSpringSystem::new(
            vec![vector![0.0, 0.0, 0.0], vector![1.0, 0.0, 0.0]],
            vec![1.0, 1.0],
            vec![[0, 1]],
            100.0,
            damping_coeff,
        )
        .unwrap()
        .with_rest_lengths(vec![0.5])
        .unwrap()
    }

    #[test]
    fn rest_lengths_default_to_initial_lengths() {
        let system = MassSpringSystem::<2>::new(
            vec![vector![0.0, 0.0], vector![3.0, 4.0], vector![3.0, 0.0]],
            vec![1.0; 3],
            vec![[0, 1], [1, 2]],
            1.0,
            0.0,
        )
        .unwrap();

        assert_eq!(system.rest_lengths(), &[5.0, 4.0]);
        assert!(system.node_is_fixed().iter().all(|f| !f));
        assert!(system.velocities().iter().all(|v| *v == Vector::<2>::zeros()));
    }

    #[test]
    fn stretched_spring_pulls_endpoints_together() {
        let system = stretched_pair(0.0);
        let f = system.evaluate_spring_forces().unwrap();

        // l / L - 1 = 1, so |f| = k
        assert!(approx_eq!(f64, f[0][0], 100.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, f[1][0], -100.0, epsilon = 1e-12));
        assert_eq!(f[0][1], 0.0);
    }

    #[test]
    fn damping_ignores_tangential_velocity() {
        let system = stretched_pair(2.0)
            .with_velocities(vec![vector![0.0, 3.0, 0.0], vector![0.0, 0.0, -1.0]])
            .unwrap();

        let f = system.evaluate_damping_forces().unwrap();
        assert_eq!(f[0], Vector::<3>::zeros());
        assert_eq!(f[1], Vector::<3>::zeros());
    }

    #[test]
    fn damping_opposes_axial_separation() {
        let system = stretched_pair(2.0)
            .with_velocities(vec![vector![-1.0, 1.0, 0.0], vector![1.0, 0.0, 0.0]])
            .unwrap();

        // relative velocity along the axis (b -> a is -x) is +2
        let f = system.evaluate_damping_forces().unwrap();
        assert!(approx_eq!(f64, f[0][0], 4.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, f[1][0], -4.0, epsilon = 1e-12));
        assert_eq!(f[0][1], 0.0);
    }

    #[test]
    fn coincident_endpoints_fail_fast() {
        let mut system = stretched_pair(0.0);
        system.nodes_mut().positions[1] = vector![0.0, 0.0, 0.0];

        assert!(matches!(
            system.evaluate_spring_forces(),
            Err(SimulationError::Solver(_))
        ));
        assert!(matches!(
            system.evaluate_damping_forces(),
            Err(SimulationError::Solver(_))
        ));
    }

    #[test]
    fn rejects_invalid_topology() {
        let positions = vec![vector![0.0, 0.0], vector![1.0, 0.0]];

        let out_of_range =
            MassSpringSystem::<2>::new(positions.clone(), vec![1.0; 2], vec![[0, 2]], 1.0, 0.0);
        assert!(matches!(out_of_range, Err(SimulationError::Mesh(_))));

        let self_loop =
            MassSpringSystem::<2>::new(positions.clone(), vec![1.0; 2], vec![[1, 1]], 1.0, 0.0);
        assert!(matches!(self_loop, Err(SimulationError::Mesh(_))));

        let bad_mass =
            MassSpringSystem::<2>::new(positions.clone(), vec![1.0, 0.0], vec![[0, 1]], 1.0, 0.0);
        assert!(matches!(bad_mass, Err(SimulationError::Mesh(_))));

        let mismatched =
            MassSpringSystem::<2>::new(positions.clone(), vec![1.0], vec![[0, 1]], 1.0, 0.0);
        assert!(matches!(mismatched, Err(SimulationError::Mesh(_))));

        let coincident = MassSpringSystem::<2>::new(
            vec![vector![1.0, 1.0], vector![1.0, 1.0]],
            vec![1.0; 2],
            vec![[0, 1]],
            1.0,
            0.0,
        );
        assert!(matches!(coincident, Err(SimulationError::Mesh(_))));

        let zero_rest = MassSpringSystem::<2>::new(positions, vec![1.0; 2], vec![[0, 1]], 1.0, 0.0)
            .unwrap()
            .with_rest_lengths(vec![0.0]);
        assert!(matches!(zero_rest, Err(SimulationError::Mesh(_))));
    }

    #[test]
    fn node_setters_check_bounds() {
        let mut system = stretched_pair(0.0);
        assert!(system.set_fixed(1, true).is_ok());
        assert!(system.node_is_fixed()[1]);
        assert!(system.set_fixed(2, true).is_err());
        assert!(system.set_velocity(5, vector![1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn energies_and_momentum() {
        let system = stretched_pair(0.0)
            .with_velocities(vec![vector![1.0, 0.0, 0.0], vector![-3.0, 0.0, 0.0]])
            .unwrap();

        assert_eq!(system.linear_momentum(), vector![-2.0, 0.0, 0.0]);
        assert!(approx_eq!(f64, system.kinetic_energy(), 5.0, epsilon = 1e-12));
        // 0.5 * 100 * 0.5 * 1^2
        assert!(approx_eq!(f64, system.elastic_energy(), 25.0, epsilon = 1e-12));
    }
}
