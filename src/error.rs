use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    Input(String),
    Mesh(String),
    Solver(String),
    PostProcessor(String),
}

impl Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            SimulationError::Input(v) => ("Input", v),
            SimulationError::Mesh(v) => ("Mesh", v),
            SimulationError::Solver(v) => ("Solver", v),
            SimulationError::PostProcessor(v) => ("Post Processor", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl std::error::Error for SimulationError {}
