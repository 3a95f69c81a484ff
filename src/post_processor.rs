use std::{
    io::Write,
    path::{Path, PathBuf},
};

use nalgebra::Vector3;

use crate::{datatypes::Vector, error::SimulationError, mass_spring::MassSpringSystem};

/// Consumer of per-frame snapshots
pub trait SnapshotSink<const D: usize> {
    /// Called once after every completed frame
    ///
    /// # Arguments
    /// * `frame` - The 1-based frame number
    /// * `system` - The system state at the end of the frame
    fn write_frame(&mut self, frame: usize, system: &MassSpringSystem<D>) -> Result<(), SimulationError>;
}

/// Writes positions and segments in .poly format
///
/// Points are padded with zeros up to three coordinates. Indices in the file
/// are 1-based.
///
/// # Arguments
/// * `writer` - The destination
/// * `positions` - Node positions
/// * `segments` - 0-based node index pairs
pub fn write_poly<W: Write, const D: usize>(
    writer: &mut W,
    positions: &[Vector<D>],
    segments: &[[usize; 2]],
) -> std::io::Result<()> {
    writeln!(writer, "POINTS")?;
    for (i, x) in positions.iter().enumerate() {
        write!(writer, "{}:", i + 1)?;
        for c in x.iter() {
            write!(writer, " {}", c)?;
        }
        for _ in D..3 {
            write!(writer, " 0")?;
        }
        writeln!(writer)?;
    }

    writeln!(writer, "POLYS")?;
    for (i, [a, b]) in segments.iter().enumerate() {
        writeln!(writer, "{}: {} {}", i + 1, a + 1, b + 1)?;
    }
    writeln!(writer, "END")?;

    Ok(())
}

pub fn format_poly<const D: usize>(positions: &[Vector<D>], segments: &[[usize; 2]]) -> String {
    let mut buffer: Vec<u8> = Vec::new();
    // writing into a Vec cannot fail
    let _ = write_poly(&mut buffer, positions, segments);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Contents of a parsed .poly file, re-indexed to 0-based segments
#[derive(Debug, Clone, PartialEq)]
pub struct PolyMesh {
    pub points: Vec<Vector3<f64>>,
    pub segments: Vec<[usize; 2]>,
}

#[derive(Clone, Copy, PartialEq)]
enum PolyParseState {
    Limbo,
    Points,
    Polys,
    End,
}

/// Splits `"<index>: <fields...>"`, checking that the index is the expected one
fn parse_indexed_line<'a>(
    line: &'a str,
    expected_index: usize,
    line_number: usize,
) -> Result<std::str::SplitWhitespace<'a>, SimulationError> {
    let (index, rest) = match line.split_once(':') {
        Some(parts) => parts,
        None => {
            return Err(SimulationError::PostProcessor(format!(
                "Line {line_number}: expected '<index>: ...', got '{line}'"
            )))
        }
    };

    match index.trim().parse::<usize>() {
        Ok(i) if i == expected_index => Ok(rest.split_whitespace()),
        Ok(i) => Err(SimulationError::PostProcessor(format!(
            "Line {line_number}: expected index {expected_index}, got {i}"
        ))),
        Err(err) => Err(SimulationError::PostProcessor(format!(
            "Line {line_number}: bad index '{index}': {err}"
        ))),
    }
}

/// Parses the text written by `write_poly`
///
/// # Arguments
/// * `contents` - The full .poly file
///
/// # Returns
/// The points and the 0-based segments
pub fn parse_poly(contents: &str) -> Result<PolyMesh, SimulationError> {
    let mut points: Vec<Vector3<f64>> = Vec::new();
    let mut segments: Vec<[usize; 2]> = Vec::new();
    let mut parser_state = PolyParseState::Limbo;

    for (i, line) in contents.lines().enumerate() {
        let line_number = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match (parser_state, line) {
            (PolyParseState::End, _) => {
                return Err(SimulationError::PostProcessor(format!(
                    "Line {line_number}: unexpected content after END"
                )))
            }
            (PolyParseState::Limbo, "POINTS") => parser_state = PolyParseState::Points,
            (PolyParseState::Points, "POLYS") => parser_state = PolyParseState::Polys,
            (PolyParseState::Polys, "END") => parser_state = PolyParseState::End,
            (PolyParseState::Limbo, _) => {
                return Err(SimulationError::PostProcessor(format!(
                    "Line {line_number}: expected POINTS section, got '{line}'"
                )))
            }
            (PolyParseState::Points, _) => {
                let coords = parse_indexed_line(line, points.len() + 1, line_number)?
                    .map(|c| c.parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|err| {
                        SimulationError::PostProcessor(format!(
                            "Line {line_number}: non-float coordinate: {err}"
                        ))
                    })?;
                if coords.len() != 3 {
                    return Err(SimulationError::PostProcessor(format!(
                        "Line {line_number}: expected 3 coordinates, got {}",
                        coords.len()
                    )));
                }
                points.push(Vector3::new(coords[0], coords[1], coords[2]));
            }
            (PolyParseState::Polys, _) => {
                let ends = parse_indexed_line(line, segments.len() + 1, line_number)?
                    .map(|n| n.parse::<usize>())
                    .collect::<Result<Vec<usize>, _>>()
                    .map_err(|err| {
                        SimulationError::PostProcessor(format!(
                            "Line {line_number}: non-integer node index: {err}"
                        ))
                    })?;
                if ends.len() != 2 {
                    return Err(SimulationError::PostProcessor(format!(
                        "Line {line_number}: expected 2 node indices, got {}",
                        ends.len()
                    )));
                }
                for n in &ends {
                    if *n == 0 || *n > points.len() {
                        return Err(SimulationError::PostProcessor(format!(
                            "Line {line_number}: node index {n} outside 1..={}",
                            points.len()
                        )));
                    }
                }
                segments.push([ends[0] - 1, ends[1] - 1]);
            }
        }
    }

    if parser_state != PolyParseState::End {
        return Err(SimulationError::PostProcessor(
            "Poly file ended without END".to_owned(),
        ));
    }

    Ok(PolyMesh { points, segments })
}

/// Writes one `<frame>.poly` file per frame into an output directory
pub struct PolyWriter {
    output_dir: PathBuf,
    dir_ready: bool,
}

impl PolyWriter {
    /// The directory is created on the first write if it doesn't exist
    pub fn new<P: AsRef<Path>>(output_dir: P) -> PolyWriter {
        PolyWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            dir_ready: false,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn frame_path(&self, frame: usize) -> PathBuf {
        self.output_dir.join(format!("{frame}.poly"))
    }
}

impl<const D: usize> SnapshotSink<D> for PolyWriter {
    fn write_frame(&mut self, frame: usize, system: &MassSpringSystem<D>) -> Result<(), SimulationError> {
        if !self.dir_ready {
            if let Err(err) = std::fs::create_dir_all(&self.output_dir) {
                return Err(SimulationError::PostProcessor(format!(
                    "Failed to create output directory {:?}: {err}",
                    self.output_dir
                )));
            }
            self.dir_ready = true;
        }

        let path = self.frame_path(frame);
        let file = match std::fs::File::create(&path) {
            Ok(f) => f,
            Err(err) => {
                return Err(SimulationError::PostProcessor(format!(
                    "Failed to create {:?}: {err}",
                    path
                )));
            }
        };

        let mut writer = std::io::BufWriter::new(file);
        write_poly(&mut writer, system.positions(), system.segments())
            .and_then(|_| writer.flush())
            .map_err(|err| {
                SimulationError::PostProcessor(format!("Failed to write {:?}: {err}", path))
            })?;

        ftlog::debug!("wrote frame {frame} to {:?}", path);

        Ok(())
    }
}

/// Keeps every frame's positions in memory
pub struct SnapshotRecorder<const D: usize> {
    frames: Vec<(usize, Vec<Vector<D>>)>,
}

impl<const D: usize> SnapshotRecorder<D> {
    pub fn new() -> Self {
        SnapshotRecorder { frames: Vec::new() }
    }

    pub fn frames(&self) -> &[(usize, Vec<Vector<D>>)] {
        &self.frames
    }
}

impl<const D: usize> Default for SnapshotRecorder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> SnapshotSink<D> for SnapshotRecorder<D> {
    fn write_frame(&mut self, frame: usize, system: &MassSpringSystem<D>) -> Result<(), SimulationError> {
        self.frames.push((frame, system.positions().to_vec()));
        Ok(())
    }
}
