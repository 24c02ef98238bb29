use yaml_rust::Yaml;

use crate::{cell::Tracers, errors::ConfigError, HydroError};

/// Thermodynamic closure of the Euler equations.
///
/// Implementations must be deterministic and free of side effects. Inputs outside the
/// physically valid domain are reported as [`HydroError::Thermodynamic`]; the caller attaches
/// the cell context.
pub trait EquationOfState: Send + Sync {
    /// Specific internal energy from density and pressure.
    fn dp2e(&self, density: f64, pressure: f64, tracers: &Tracers) -> Result<f64, HydroError>;

    /// Pressure from density and specific internal energy.
    fn de2p(&self, density: f64, energy: f64, tracers: &Tracers) -> Result<f64, HydroError>;

    /// Sound speed from density and pressure.
    fn dp2c(&self, density: f64, pressure: f64, tracers: &Tracers) -> Result<f64, HydroError>;

    /// Entropy from density and pressure.
    fn dp2s(&self, density: f64, pressure: f64, tracers: &Tracers) -> Result<f64, HydroError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdiabaticIndex {
    gamma: f64,
    odgm1: f64,
}

impl From<f64> for AdiabaticIndex {
    fn from(value: f64) -> Self {
        AdiabaticIndex {
            gamma: value,
            odgm1: 1. / (value - 1.),
        }
    }
}

impl From<AdiabaticIndex> for f64 {
    fn from(value: AdiabaticIndex) -> Self {
        value.gamma
    }
}

impl AdiabaticIndex {
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn odgm1(&self) -> f64 {
        self.odgm1
    }
}

#[derive(Debug, Clone, Copy)]
pub enum GasModel {
    Ideal,
    Isothermal { isothermal_internal_energy: f64 },
}

/// Ideal or isothermal gas with a constant adiabatic index.
#[derive(Debug, Clone, Copy)]
pub struct GasLaw {
    gamma: AdiabaticIndex,
    model: GasModel,
}

fn check_density(density: f64) -> Result<(), HydroError> {
    if !(density.is_finite() && density > 0.) {
        return Err(HydroError::thermodynamic("density", density, density));
    }
    Ok(())
}

impl GasLaw {
    pub fn new(gamma: f64, model: GasModel) -> Self {
        Self {
            gamma: gamma.into(),
            model,
        }
    }

    pub fn ideal(gamma: f64) -> Self {
        Self::new(gamma, GasModel::Ideal)
    }

    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        let gamma = cfg["gamma"]
            .as_f64()
            .ok_or(ConfigError::MissingParameter("equation_of_state:gamma".to_string()))?;
        if gamma <= 1. {
            return Err(ConfigError::InvalidValue {
                name: "equation_of_state:gamma".to_string(),
                value: cfg["gamma"].clone(),
            });
        }
        let model = match cfg["equation_of_state"]["kind"].as_str().unwrap_or("Ideal") {
            "Ideal" => GasModel::Ideal,
            "Isothermal" => {
                let isothermal_internal_energy = cfg["equation_of_state"]
                    ["isothermal_internal_energy"]
                    .as_f64()
                    .ok_or(ConfigError::MissingParameter(
                        "equation_of_state:isothermal_internal_energy".to_string(),
                    ))?;
                GasModel::Isothermal {
                    isothermal_internal_energy,
                }
            }
            kind => {
                return Err(ConfigError::UnknownVariant {
                    kind: "equation of state",
                    name: kind.to_string(),
                })
            }
        };
        Ok(Self::new(gamma, model))
    }

    pub fn gamma(&self) -> &AdiabaticIndex {
        &self.gamma
    }
}

impl EquationOfState for GasLaw {
    fn dp2e(&self, density: f64, pressure: f64, _tracers: &Tracers) -> Result<f64, HydroError> {
        check_density(density)?;
        match self.model {
            GasModel::Ideal => {
                if !(pressure.is_finite() && pressure >= 0.) {
                    return Err(HydroError::thermodynamic("pressure", density, pressure));
                }
                Ok(pressure / density * self.gamma.odgm1())
            }
            GasModel::Isothermal {
                isothermal_internal_energy,
            } => Ok(isothermal_internal_energy),
        }
    }

    fn de2p(&self, density: f64, energy: f64, _tracers: &Tracers) -> Result<f64, HydroError> {
        check_density(density)?;
        match self.model {
            GasModel::Ideal => {
                if !(energy.is_finite() && energy >= 0.) {
                    return Err(HydroError::thermodynamic(
                        "specific internal energy",
                        density,
                        energy,
                    ));
                }
                Ok((self.gamma.gamma - 1.) * energy * density)
            }
            GasModel::Isothermal {
                isothermal_internal_energy,
            } => Ok((self.gamma.gamma - 1.) * isothermal_internal_energy * density),
        }
    }

    fn dp2c(&self, density: f64, pressure: f64, _tracers: &Tracers) -> Result<f64, HydroError> {
        check_density(density)?;
        match self.model {
            GasModel::Ideal => {
                if !(pressure.is_finite() && pressure >= 0.) {
                    return Err(HydroError::thermodynamic("pressure", density, pressure));
                }
                Ok((self.gamma.gamma * pressure / density).sqrt())
            }
            GasModel::Isothermal {
                isothermal_internal_energy,
            } => Ok(f64::sqrt(
                isothermal_internal_energy * self.gamma.gamma * (self.gamma.gamma - 1.),
            )),
        }
    }

    fn dp2s(&self, density: f64, pressure: f64, tracers: &Tracers) -> Result<f64, HydroError> {
        let internal_energy = self.dp2e(density, pressure, tracers)?;
        Ok((self.gamma.gamma - 1.) * internal_energy * density.powf(1. - self.gamma.gamma))
    }
}
