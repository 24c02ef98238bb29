use std::fmt::{self, Display};

use thiserror::Error;
use yaml_rust::Yaml;

/// Named numeric entries attached to an error by the layers it travels through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics(Vec<(String, f64)>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, value: f64) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: f64) {
        self.0.push((name.to_string(), value));
    }

    /// Returns the most recently attached value with the given name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().rev().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, " [")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value:e}")?;
        }
        write!(f, "]")
    }
}

/// Failures raised by the numerical policies and the integrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HydroError {
    #[error("{quantity} outside the valid thermodynamic domain (density: {density:e}, argument: {argument:e}){context}")]
    Thermodynamic {
        quantity: &'static str,
        density: f64,
        argument: f64,
        context: Diagnostics,
    },
    #[error("Vertex motion of cell {cell} cannot be regularized: displacement {displacement:e} exceeds cell width {width:e}{context}")]
    MeshDegeneracy {
        cell: usize,
        displacement: f64,
        width: f64,
        context: Diagnostics,
    },
    #[error("Degenerate timestep: {reason}{context}")]
    DegenerateTimeStep {
        reason: &'static str,
        context: Diagnostics,
    },
    #[error("No flux rule matches face {face}{context}")]
    UnmatchedFace { face: usize, context: Diagnostics },
    #[error("No cell update rule matches cell {cell}{context}")]
    UnmatchedCell { cell: usize, context: Diagnostics },
    #[error("Count of serialized records is not an integer: chunk length {chunk_len}, buffer length {buffer_len}{context}")]
    MalformedBatch {
        chunk_len: usize,
        buffer_len: usize,
        context: Diagnostics,
    },
    #[error("Inconsistent simulation state: {cells} cells for {vertices} mesh vertices{context}")]
    InconsistentState {
        cells: usize,
        vertices: usize,
        context: Diagnostics,
    },
}

impl HydroError {
    pub fn thermodynamic(quantity: &'static str, density: f64, argument: f64) -> Self {
        Self::Thermodynamic {
            quantity,
            density,
            argument,
            context: Diagnostics::new(),
        }
    }

    pub fn degenerate_timestep(reason: &'static str) -> Self {
        Self::DegenerateTimeStep {
            reason,
            context: Diagnostics::new(),
        }
    }

    pub fn malformed_batch(chunk_len: usize, buffer_len: usize) -> Self {
        Self::MalformedBatch {
            chunk_len,
            buffer_len,
            context: Diagnostics::new(),
        }
    }

    pub fn context(&self) -> &Diagnostics {
        match self {
            Self::Thermodynamic { context, .. }
            | Self::MeshDegeneracy { context, .. }
            | Self::DegenerateTimeStep { context, .. }
            | Self::UnmatchedFace { context, .. }
            | Self::UnmatchedCell { context, .. }
            | Self::MalformedBatch { context, .. }
            | Self::InconsistentState { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut Diagnostics {
        match self {
            Self::Thermodynamic { context, .. }
            | Self::MeshDegeneracy { context, .. }
            | Self::DegenerateTimeStep { context, .. }
            | Self::UnmatchedFace { context, .. }
            | Self::UnmatchedCell { context, .. }
            | Self::MalformedBatch { context, .. }
            | Self::InconsistentState { context, .. } => context,
        }
    }

    /// Attach a named diagnostic value before propagating the error further up.
    pub fn with_entry(mut self, name: &str, value: f64) -> Self {
        self.context_mut().push(name, value);
        self
    }
}

/// Problems with a yaml configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required parameter in configuration: {0}")]
    MissingParameter(String),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: Yaml },
    #[error("Unknown type of {kind} configured: {name}")]
    UnknownVariant { kind: &'static str, name: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entries_are_displayed() {
        let err = HydroError::thermodynamic("pressure", 1., -2.)
            .with_entry("Cell index", 3.)
            .with_entry("Cell mass", 0.5);
        assert_eq!(err.context().get("Cell index"), Some(3.));
        let msg = err.to_string();
        assert!(msg.contains("pressure"));
        assert!(msg.contains("Cell index: 3e0"));
        assert!(msg.contains("Cell mass: 5e-1"));
    }

    #[test]
    fn test_batch_lengths() {
        let err = HydroError::malformed_batch(5, 12);
        match err {
            HydroError::MalformedBatch {
                chunk_len,
                buffer_len,
                ..
            } => {
                assert_eq!(chunk_len, 5);
                assert_eq!(buffer_len, 12);
            }
            _ => panic!("Wrong error variant"),
        }
    }
}
