use std::path::Path;

use json::JsonValue;

use crate::{
    datatypes::{
        BoundaryRegion, BoundaryRule, BoundaryTarget, SimulationParameters, Vector,
    },
    error::SimulationError,
    geometry::{Obstacle, Plane, Sphere},
    mass_spring::MassSpringSystem,
};

const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

/// Everything needed to start a driver, loaded from the input json
#[derive(Debug, Clone)]
pub struct SimulationSetup<const D: usize> {
    pub system: MassSpringSystem<D>,
    pub obstacles: Vec<Obstacle<D>>,
    pub parameters: SimulationParameters<D>,
}

/// Parses the input file into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
pub fn load_input_file<P: AsRef<Path>>(input_file: P) -> Result<JsonValue, SimulationError> {
    let input_file = input_file.as_ref();
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(SimulationError::Input(format!(
                "Unable to open input file {:?}: {err}",
                input_file
            )))
        }
    };

    parse_input(&file_string)
}

/// Parses input json text and checks the required sections exist
pub fn parse_input(contents: &str) -> Result<JsonValue, SimulationError> {
    let input_json = match json::parse(contents) {
        Ok(f) => f,
        Err(err) => {
            return Err(SimulationError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.has_key("metadata") {
        return Err(SimulationError::Input(
            "Input json missing metadata field".to_string(),
        ));
    }
    if !input_json.has_key("mesh") {
        return Err(SimulationError::Input(
            "Input json missing mesh field".to_string(),
        ));
    }
    if !input_json["metadata"].has_key("time_step") {
        return Err(SimulationError::Input(
            "Input json missing time_step field in metadata section".to_string(),
        ));
    }
    if !input_json["metadata"].has_key("youngs_modulus") {
        return Err(SimulationError::Input(
            "Input json missing youngs_modulus field in metadata section".to_string(),
        ));
    }

    Ok(input_json)
}

/// Reads the spatial dimension of the run. Defaults to 3.
pub fn read_dimension(input_json: &JsonValue) -> Result<usize, SimulationError> {
    let value = &input_json["metadata"]["dimension"];
    if value.is_null() {
        return Ok(3);
    }

    match value.as_usize() {
        Some(d) if d == 2 || d == 3 => Ok(d),
        _ => Err(SimulationError::Input(format!(
            "dimension must be 2 or 3, got {value}"
        ))),
    }
}

fn read_f64(value: &JsonValue, name: &str) -> Result<f64, SimulationError> {
    match value.as_f64() {
        Some(v) => Ok(v),
        None => Err(SimulationError::Input(format!(
            "Expected a number for {name}, got {value}"
        ))),
    }
}

fn read_usize(value: &JsonValue, name: &str) -> Result<usize, SimulationError> {
    match value.as_usize() {
        Some(v) => Ok(v),
        None => Err(SimulationError::Input(format!(
            "Expected a non-negative integer for {name}, got {value}"
        ))),
    }
}

fn read_optional_f64(value: &JsonValue, name: &str, default: f64) -> Result<f64, SimulationError> {
    if value.is_null() {
        return Ok(default);
    }
    read_f64(value, name)
}

/// Reads a json array of exactly `D` numbers
fn read_vector<const D: usize>(value: &JsonValue, name: &str) -> Result<Vector<D>, SimulationError> {
    if !value.is_array() || value.len() != D {
        return Err(SimulationError::Input(format!(
            "Expected {name} to be an array of {D} numbers, got {value}"
        )));
    }

    let mut v = Vector::<D>::zeros();
    for (i, member) in value.members().enumerate() {
        v[i] = read_f64(member, name)?;
    }

    Ok(v)
}

fn read_array<'a>(value: &'a JsonValue, name: &str) -> Result<json::iterators::Members<'a>, SimulationError> {
    if !value.is_array() {
        return Err(SimulationError::Input(format!(
            "Expected {name} to be an array, got {value}"
        )));
    }
    Ok(value.members())
}

/// Parses run parameters from the metadata section
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A SimulationParameters instance. Missing optional fields take defaults.
pub fn parse_input_metadata<const D: usize>(
    input_json: &JsonValue,
) -> Result<SimulationParameters<D>, SimulationError> {
    let metadata = &input_json["metadata"];
    let defaults = SimulationParameters::<D>::default();

    let gravity = if metadata["gravity"].is_null() {
        defaults.gravity
    } else {
        read_vector(&metadata["gravity"], "gravity")?
    };

    let max_frame = if metadata["max_frame"].is_null() {
        defaults.max_frame
    } else {
        read_usize(&metadata["max_frame"], "max_frame")?
    };

    Ok(SimulationParameters {
        time_step: read_f64(&metadata["time_step"], "time_step")?,
        gravity,
        collision_stiffness: read_optional_f64(
            &metadata["collision_stiffness"],
            "collision_stiffness",
            defaults.collision_stiffness,
        )?,
        target_frame_rate: read_optional_f64(
            &metadata["target_frame_rate"],
            "target_frame_rate",
            defaults.target_frame_rate,
        )?,
        max_frame,
    })
}

/// Builds a rectangular grid of nodes joined by structural springs
///
/// # Arguments
/// * `origin` - Position of the first node
/// * `rows` - Node count along the second axis
/// * `cols` - Node count along the first axis
/// * `spacing` - Distance between neighbouring nodes
/// * `axes` - The two coordinate axes the grid spans
/// * `shear_springs` - Also connect both diagonals of every cell
///
/// # Returns
/// The node positions and segments, in that order. Node `r * cols + c` sits at
/// row `r`, column `c`.
pub fn build_grid<const D: usize>(
    origin: Vector<D>,
    rows: usize,
    cols: usize,
    spacing: f64,
    axes: [usize; 2],
    shear_springs: bool,
) -> Result<(Vec<Vector<D>>, Vec<[usize; 2]>), SimulationError> {
    if rows * cols < 2 {
        return Err(SimulationError::Input(format!(
            "Grid of {rows}x{cols} needs at least two nodes"
        )));
    }
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(SimulationError::Input(format!(
            "Grid spacing must be positive, got {spacing}"
        )));
    }
    if axes[0] >= D || axes[1] >= D || axes[0] == axes[1] {
        return Err(SimulationError::Input(format!(
            "Grid axes {axes:?} must be two distinct axes below {D}"
        )));
    }

    let mut positions: Vec<Vector<D>> = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let mut x = origin;
            x[axes[0]] += c as f64 * spacing;
            x[axes[1]] += r as f64 * spacing;
            positions.push(x);
        }
    }

    let index = |r: usize, c: usize| r * cols + c;
    let mut segments: Vec<[usize; 2]> = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                segments.push([index(r, c), index(r, c + 1)]);
            }
            if r + 1 < rows {
                segments.push([index(r, c), index(r + 1, c)]);
            }
            if shear_springs && r + 1 < rows && c + 1 < cols {
                segments.push([index(r, c), index(r + 1, c + 1)]);
                segments.push([index(r, c + 1), index(r + 1, c)]);
            }
        }
    }

    Ok((positions, segments))
}

fn parse_grid<const D: usize>(grid: &JsonValue) -> Result<(Vec<Vector<D>>, Vec<[usize; 2]>), SimulationError> {
    let axes = if grid["axes"].is_null() {
        [0, D - 1]
    } else {
        let axes: Vec<usize> = read_array(&grid["axes"], "grid axes")?
            .map(|a| read_usize(a, "grid axes"))
            .collect::<Result<_, _>>()?;
        if axes.len() != 2 {
            return Err(SimulationError::Input(format!(
                "Grid axes must have two entries, got {}",
                axes.len()
            )));
        }
        [axes[0], axes[1]]
    };

    let shear_springs = if grid["shear_springs"].is_null() {
        false
    } else {
        match grid["shear_springs"].as_bool() {
            Some(b) => b,
            None => {
                return Err(SimulationError::Input(
                    "grid shear_springs must be a boolean".to_owned(),
                ))
            }
        }
    };

    build_grid(
        read_vector(&grid["origin"], "grid origin")?,
        read_usize(&grid["rows"], "grid rows")?,
        read_usize(&grid["cols"], "grid cols")?,
        read_f64(&grid["spacing"], "grid spacing")?,
        axes,
        shear_springs,
    )
}

fn parse_segments(value: &JsonValue) -> Result<Vec<[usize; 2]>, SimulationError> {
    let mut segments: Vec<[usize; 2]> = Vec::new();
    for (i, segment) in read_array(value, "segments")?.enumerate() {
        if !segment.is_array() || segment.len() != 2 {
            return Err(SimulationError::Input(format!(
                "Segment {i} must be a pair of node indices, got {segment}"
            )));
        }
        segments.push([
            read_usize(&segment[0], "segment endpoint")?,
            read_usize(&segment[1], "segment endpoint")?,
        ]);
    }
    Ok(segments)
}

/// Builds the mass spring system from the mesh section
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A validated MassSpringSystem with all nodes free and at rest
pub fn parse_mesh<const D: usize>(input_json: &JsonValue) -> Result<MassSpringSystem<D>, SimulationError> {
    let mesh = &input_json["mesh"];
    let metadata = &input_json["metadata"];

    let (positions, segments) = if mesh.has_key("grid") {
        parse_grid(&mesh["grid"])?
    } else {
        if !mesh.has_key("nodes") || !mesh.has_key("segments") {
            return Err(SimulationError::Input(
                "Mesh needs either a grid or both nodes and segments".to_owned(),
            ));
        }
        let positions: Vec<Vector<D>> = read_array(&mesh["nodes"], "nodes")?
            .map(|node| read_vector(node, "node position"))
            .collect::<Result<_, _>>()?;
        (positions, parse_segments(&mesh["segments"])?)
    };

    let node_mass = if mesh.has_key("grid") {
        &mesh["grid"]["node_mass"]
    } else {
        &mesh["node_mass"]
    };
    let masses: Vec<f64> = if mesh.has_key("masses") {
        read_array(&mesh["masses"], "masses")?
            .map(|m| read_f64(m, "mass"))
            .collect::<Result<_, _>>()?
    } else if !node_mass.is_null() {
        vec![read_f64(node_mass, "node_mass")?; positions.len()]
    } else {
        return Err(SimulationError::Input(
            "Mesh is missing masses or node_mass".to_owned(),
        ));
    };

    let system = MassSpringSystem::new(
        positions,
        masses,
        segments,
        read_f64(&metadata["youngs_modulus"], "youngs_modulus")?,
        read_optional_f64(&metadata["damping_coeff"], "damping_coeff", 0.0)?,
    )?;

    if mesh.has_key("rest_lengths") {
        let rest_lengths: Vec<f64> = read_array(&mesh["rest_lengths"], "rest_lengths")?
            .map(|l| read_f64(l, "rest length"))
            .collect::<Result<_, _>>()?;
        return system.with_rest_lengths(rest_lengths);
    }

    Ok(system)
}

/// Parses the obstacle list. Obstacles without a stiffness use the shared
/// collision stiffness.
pub fn parse_obstacles<const D: usize>(
    input_json: &JsonValue,
    collision_stiffness: f64,
) -> Result<Vec<Obstacle<D>>, SimulationError> {
    let mut obstacles: Vec<Obstacle<D>> = Vec::new();
    if input_json["obstacles"].is_null() {
        return Ok(obstacles);
    }

    for (i, obstacle_json) in read_array(&input_json["obstacles"], "obstacles")?.enumerate() {
        let stiffness = read_optional_f64(
            &obstacle_json["stiffness"],
            "obstacle stiffness",
            collision_stiffness,
        )?;

        let obstacle: Obstacle<D> = match obstacle_json["shape"].as_str() {
            Some("sphere") => Sphere::new(
                stiffness,
                read_vector(&obstacle_json["center"], "sphere center")?,
                read_f64(&obstacle_json["radius"], "sphere radius")?,
            )?
            .into(),
            Some("plane") => Plane::new(
                stiffness,
                read_vector(&obstacle_json["origin"], "plane origin")?,
                read_vector(&obstacle_json["normal"], "plane normal")?,
            )?
            .into(),
            Some(other) => {
                return Err(SimulationError::Input(format!(
                    "Obstacle {i} has unknown shape '{other}'. Supports sphere and plane"
                )))
            }
            None => {
                return Err(SimulationError::Input(format!(
                    "Obstacle {i} is missing its shape"
                )))
            }
        };
        obstacles.push(obstacle);
    }

    ftlog::info!("loaded {} obstacles from input file", obstacles.len());

    Ok(obstacles)
}

/// Reads the boundary rules from the input json
pub fn parse_boundary_rules<const D: usize>(
    input_json: &JsonValue,
) -> Result<Vec<BoundaryRule<D>>, SimulationError> {
    let mut rules: Vec<BoundaryRule<D>> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("region") {
            return Err(SimulationError::Input(format!(
                "Boundary rule {name} is missing region field"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(SimulationError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        // Register region
        let mut region = BoundaryRegion::<D>::unbounded();
        for (axis, axis_name) in AXIS_NAMES.iter().enumerate().take(D) {
            let min_key = format!("{axis_name}_min");
            let max_key = format!("{axis_name}_max");
            if rule_json["region"].has_key(&min_key) {
                region.min[axis] = read_f64(&rule_json["region"][min_key.as_str()], &min_key)?;
            }
            if rule_json["region"].has_key(&max_key) {
                region.max[axis] = read_f64(&rule_json["region"][max_key.as_str()], &max_key)?;
            }
            if region.min[axis] > region.max[axis] {
                return Err(SimulationError::Input(format!(
                    "Boundary '{name}' has {min_key} greater than {max_key}"
                )));
            }
        }

        // Register target
        let targets = &rule_json["targets"];
        let fixed = if targets["fixed"].is_null() {
            None
        } else {
            match targets["fixed"].as_bool() {
                Some(b) => Some(b),
                None => {
                    return Err(SimulationError::Input(format!(
                        "Boundary '{name}' has a non-boolean fixed target"
                    )))
                }
            }
        };
        let velocity = if targets["velocity"].is_null() {
            None
        } else {
            Some(read_vector(&targets["velocity"], "boundary velocity")?)
        };

        if fixed.is_none() && velocity.is_none() {
            return Err(SimulationError::Input(format!(
                "Boundary '{name}' has no targets"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_string(),
            region,
            target: BoundaryTarget { fixed, velocity },
        })
    }
    ftlog::info!("loaded {} boundary rules from input file", rules.len());

    Ok(rules)
}

/// Applies boundary rules to the nodes inside their regions. Later rules
/// override earlier ones.
///
/// # Arguments
/// * `rules` - The rules to apply, in order
/// * `system` - A mutable reference to the mass spring system
pub fn apply_boundary_conditions<const D: usize>(
    rules: &[BoundaryRule<D>],
    system: &mut MassSpringSystem<D>,
) -> Result<(), SimulationError> {
    for rule in rules {
        let targets: Vec<usize> = system
            .positions()
            .iter()
            .enumerate()
            .filter(|(_, x)| rule.region.contains(x))
            .map(|(i, _)| i)
            .collect();

        if targets.is_empty() {
            ftlog::warn!("boundary '{}' does not contain any nodes", rule.name);
            continue;
        }

        for node in &targets {
            if let Some(fixed) = rule.target.fixed {
                system.set_fixed(*node, fixed)?;
            }
            if let Some(velocity) = rule.target.velocity {
                system.set_velocity(*node, velocity)?;
            }
        }
        ftlog::debug!("boundary '{}' applied to {} nodes", rule.name, targets.len());
    }

    Ok(())
}

/// Builds the system, obstacles and run parameters from the input json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object. Its dimension must be `D`.
pub fn run<const D: usize>(input_json: &JsonValue) -> Result<SimulationSetup<D>, SimulationError> {
    let dimension = read_dimension(input_json)?;
    if dimension != D {
        return Err(SimulationError::Input(format!(
            "Input describes a {dimension}D system, expected {D}D"
        )));
    }

    let parameters = parse_input_metadata::<D>(input_json)?;
    let mut system = parse_mesh::<D>(input_json)?;
    let obstacles = parse_obstacles::<D>(input_json, parameters.collision_stiffness)?;
    let rules = parse_boundary_rules::<D>(input_json)?;
    apply_boundary_conditions(&rules, &mut system)?;

    ftlog::info!(
        "loaded {} nodes and {} segments",
        system.node_count(),
        system.segment_count()
    );

    Ok(SimulationSetup {
        system,
        obstacles,
        parameters,
    })
}
