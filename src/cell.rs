use std::{
    collections::BTreeMap,
    ops::{AddAssign, Mul, Neg, SubAssign},
};

use glam::DVec3;

use crate::{
    gas_law::EquationOfState,
    physical_quantities::{Conserved, Primitive, State},
    HydroError,
};

/// Named tracer values, ordered by name.
pub type Tracers = BTreeMap<String, f64>;
/// Named boolean region markers, ordered by name.
pub type Stickers = BTreeMap<String, bool>;

/// The physical (intensive) state of one control volume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputationalCell {
    pub primitives: State<Primitive>,
    /// Tracer mass fractions
    pub tracers: Tracers,
    pub stickers: Stickers,
}

impl ComputationalCell {
    pub fn new(density: f64, velocity: DVec3, pressure: f64) -> Self {
        Self {
            primitives: State::<Primitive>::new(density, velocity, pressure),
            tracers: Tracers::new(),
            stickers: Stickers::new(),
        }
    }

    pub fn with_tracer(mut self, name: &str, fraction: f64) -> Self {
        self.tracers.insert(name.to_string(), fraction);
        self
    }

    pub fn with_sticker(mut self, name: &str, value: bool) -> Self {
        self.stickers.insert(name.to_string(), value);
        self
    }

    pub fn density(&self) -> f64 {
        self.primitives.density()
    }

    pub fn velocity(&self) -> DVec3 {
        self.primitives.velocity()
    }

    pub fn pressure(&self) -> f64 {
        self.primitives.pressure()
    }

    /// A missing sticker reads as `false`.
    pub fn has_sticker(&self, name: &str) -> bool {
        self.stickers.get(name).copied().unwrap_or(false)
    }

    /// The same cell with its velocity reflected along `normal`.
    pub fn reflect(&self, normal: DVec3) -> Self {
        Self {
            primitives: self.primitives.reflect(normal),
            ..self.clone()
        }
    }

    /// The same cell with the velocity it has relative to a surface moving with
    /// `surface_velocity` reflected along `normal`.
    pub fn reflect_in_frame(&self, normal: DVec3, surface_velocity: DVec3) -> Self {
        Self {
            primitives: self
                .primitives
                .boost(-surface_velocity)
                .reflect(normal)
                .boost(surface_velocity),
            ..self.clone()
        }
    }
}

/// The conserved (extensive) totals of one control volume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensive {
    pub conserved: State<Conserved>,
    /// Tracer masses
    pub tracers: Tracers,
}

impl Extensive {
    pub fn new(mass: f64, momentum: DVec3, energy: f64) -> Self {
        Self {
            conserved: State::<Conserved>::new(mass, momentum, energy),
            tracers: Tracers::new(),
        }
    }

    /// Same tracer names as `self`, every value zero.
    pub fn zero_like(&self) -> Self {
        Self {
            conserved: State::vacuum(),
            tracers: self.tracers.keys().map(|name| (name.clone(), 0.)).collect(),
        }
    }

    pub fn mass(&self) -> f64 {
        self.conserved.mass()
    }

    pub fn momentum(&self) -> DVec3 {
        self.conserved.momentum()
    }

    pub fn energy(&self) -> f64 {
        self.conserved.energy()
    }

    pub fn is_finite(&self) -> bool {
        self.conserved.is_finite() && self.tracers.values().all(|t| t.is_finite())
    }

    /// Totals of a cell with the given physical state and volume.
    pub fn from_cell(
        cell: &ComputationalCell,
        volume: f64,
        eos: &dyn EquationOfState,
    ) -> Result<Self, HydroError> {
        let mass = cell.density() * volume;
        let momentum = mass * cell.velocity();
        let thermal = if mass > 0. {
            eos.dp2e(cell.density(), cell.pressure(), &cell.tracers)?
        } else {
            0.
        };
        let energy = 0.5 * momentum.dot(cell.velocity()) + mass * thermal;
        Ok(Self {
            conserved: State::<Conserved>::new(mass, momentum, energy),
            tracers: cell
                .tracers
                .iter()
                .map(|(name, fraction)| (name.clone(), fraction * mass))
                .collect(),
        })
    }

    /// Sum of a collection of totals.
    pub fn sum<'a>(extensives: impl IntoIterator<Item = &'a Extensive>) -> Extensive {
        let mut total = Extensive::default();
        for extensive in extensives {
            total += extensive;
        }
        total
    }
}

impl AddAssign<&Extensive> for Extensive {
    fn add_assign(&mut self, rhs: &Extensive) {
        self.conserved += rhs.conserved;
        for (name, value) in rhs.tracers.iter() {
            *self.tracers.entry(name.clone()).or_insert(0.) += value;
        }
    }
}

impl SubAssign<&Extensive> for Extensive {
    fn sub_assign(&mut self, rhs: &Extensive) {
        self.conserved -= rhs.conserved;
        for (name, value) in rhs.tracers.iter() {
            *self.tracers.entry(name.clone()).or_insert(0.) -= value;
        }
    }
}

impl Mul<&Extensive> for f64 {
    type Output = Extensive;

    fn mul(self, rhs: &Extensive) -> Self::Output {
        Extensive {
            conserved: self * rhs.conserved,
            tracers: rhs
                .tracers
                .iter()
                .map(|(name, value)| (name.clone(), self * value))
                .collect(),
        }
    }
}

impl Neg for Extensive {
    type Output = Extensive;

    fn neg(self) -> Self::Output {
        -1. * &self
    }
}

/// A per-cell predicate over the physical state, used to select special-case behaviour.
pub trait CellPredicate: Send + Sync {
    fn test(&self, cells: &[ComputationalCell], index: usize) -> bool;
}

/// Matches cells carrying the named sticker.
#[derive(Debug, Clone)]
pub struct HasSticker(pub String);

impl HasSticker {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl CellPredicate for HasSticker {
    fn test(&self, cells: &[ComputationalCell], index: usize) -> bool {
        cells[index].has_sticker(&self.0)
    }
}
