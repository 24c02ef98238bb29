use std::{
    marker::PhantomData,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use glam::DVec3;

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Primitive;
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Conserved;

/// The hydrodynamic part of a cell's state: either (density, velocity, pressure) or
/// (mass, momentum, energy), depending on the marker type.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct State<T>(f64, DVec3, f64, PhantomData<T>);

pub type Primitives = State<Primitive>;

impl<T> Add for State<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0, self.1 + rhs.1, self.2 + rhs.2, PhantomData)
    }
}

impl<T> AddAssign for State<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.1 += rhs.1;
        self.2 += rhs.2;
    }
}

impl<T> Sub for State<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0, self.1 - rhs.1, self.2 - rhs.2, PhantomData)
    }
}

impl<T> SubAssign for State<T> {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.1 -= rhs.1;
        self.2 -= rhs.2;
    }
}

impl<T> Neg for State<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0, -self.1, -self.2, PhantomData)
    }
}

impl<T> Mul<State<T>> for f64 {
    type Output = State<T>;

    fn mul(self, rhs: State<T>) -> Self::Output {
        State::<T>(self * rhs.0, self * rhs.1, self * rhs.2, PhantomData)
    }
}

impl<T> State<T> {
    pub fn vacuum() -> Self {
        Self(0., DVec3::ZERO, 0., PhantomData)
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite() && self.1.is_finite() && self.2.is_finite()
    }
}

impl State<Primitive> {
    pub fn new(density: f64, velocity: DVec3, pressure: f64) -> Self {
        Self(density, velocity, pressure, PhantomData)
    }

    pub fn density(&self) -> f64 {
        self.0
    }

    pub fn velocity(&self) -> DVec3 {
        self.1
    }

    pub fn pressure(&self) -> f64 {
        self.2
    }

    pub fn boost(&self, velocity: DVec3) -> Self {
        if self.density() > 0. {
            Self::new(self.density(), self.velocity() + velocity, self.pressure())
        } else {
            debug_assert_eq!(self.density(), 0.);
            *self
        }
    }

    /// Reflect velocity component along normal
    pub fn reflect(&self, normal: DVec3) -> Self {
        let v = self.velocity() - 2. * self.velocity().dot(normal) * normal;
        Self::new(self.density(), v, self.pressure())
    }
}

impl State<Conserved> {
    pub fn new(mass: f64, momentum: DVec3, energy: f64) -> Self {
        Self(mass, momentum, energy, PhantomData)
    }

    pub fn mass(&self) -> f64 {
        self.0
    }

    pub fn momentum(&self) -> DVec3 {
        self.1
    }

    pub fn energy(&self) -> f64 {
        self.2
    }

    /// returns the specific internal energy e defined by: E = E_kin + E_therm = E_kin + m * e
    pub fn internal_energy(&self) -> f64 {
        let m_inv = 1. / self.mass();
        let thermal_energy = self.energy() - 0.5 * self.momentum().length_squared() * m_inv;
        thermal_energy * m_inv
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use glam::DVec3;

    use super::*;

    #[test]
    fn test_boost_and_reflect() {
        let primitives = State::<Primitive>::new(0.75, DVec3::new(0.4, -0.2, 0.), 0.8);
        let boosted = primitives.boost(DVec3::X);
        assert_approx_eq!(f64, boosted.velocity().x, 1.4);
        assert_approx_eq!(f64, boosted.velocity().y, -0.2);

        let reflected = primitives.reflect(DVec3::Y);
        assert_approx_eq!(f64, reflected.velocity().x, 0.4);
        assert_approx_eq!(f64, reflected.velocity().y, 0.2);
        assert_eq!(reflected.density(), primitives.density());
        assert_eq!(reflected.pressure(), primitives.pressure());

        let vacuum = State::<Primitive>::vacuum();
        assert_eq!(vacuum.boost(DVec3::X), vacuum);
    }

    #[test]
    fn test_internal_energy() {
        let conserved = State::<Conserved>::new(2., DVec3::new(2., 0., 0.), 5.);
        // E_kin = 0.5 * |p|^2 / m = 1
        assert_approx_eq!(f64, conserved.internal_energy(), 2.);
        let flipped = -conserved;
        assert_eq!(flipped.mass(), -2.);
        assert_eq!(flipped.momentum().x, -2.);
    }
}
