use glam::DVec3;
use yaml_rust::Yaml;

use crate::errors::ConfigError;

/// The dimensionality of the hydrodynamics simulation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(usize)]
pub enum Dimensionality {
    OneD = 1,
    TwoD = 2,
    ThreeD = 3,
}

impl Dimensionality {
    pub fn init(cfg: &Yaml) -> Result<Self, ConfigError> {
        let dimensionality = cfg["dimensionality"].as_i64().unwrap_or(1);
        usize::try_from(dimensionality)
            .ok()
            .and_then(|d| Self::try_from(d).ok())
            .ok_or(ConfigError::InvalidValue {
                name: "dimensionality".to_string(),
                value: cfg["dimensionality"].clone(),
            })
    }

    pub fn count(self) -> usize {
        self.into()
    }
}

/// Wrap a position back into the box `[anchor, anchor + box_size)`.
pub fn box_wrap(anchor: DVec3, box_size: DVec3, pos: &mut DVec3, dimension: usize) {
    for i in 0..dimension {
        while pos[i] < anchor[i] {
            pos[i] += box_size[i];
        }
        while pos[i] >= anchor[i] + box_size[i] {
            pos[i] -= box_size[i];
        }
    }
}

/// Mirror a position that left the box `[anchor, anchor + box_size]` back inside.
pub fn box_reflect(anchor: DVec3, box_size: DVec3, pos: &mut DVec3, dimension: usize) {
    for i in 0..dimension {
        let lower = anchor[i];
        let upper = anchor[i] + box_size[i];
        if pos[i] < lower {
            pos[i] = 2. * lower - pos[i];
        }
        if pos[i] > upper {
            pos[i] = 2. * upper - pos[i];
        }
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use yaml_rust::YamlLoader;

    use super::*;

    #[test]
    fn test_dimensionality() {
        let cfg = &YamlLoader::load_from_str("dimensionality: 2").unwrap()[0];
        assert_eq!(Dimensionality::init(cfg).unwrap(), Dimensionality::TwoD);
        assert_eq!(Dimensionality::TwoD.count(), 2);
        let cfg = &YamlLoader::load_from_str("dimensionality: 4").unwrap()[0];
        assert!(Dimensionality::init(cfg).is_err());
    }

    #[test]
    fn test_wrap_and_reflect() {
        let mut pos = DVec3::new(1.25, -0.5, 0.);
        box_wrap(DVec3::ZERO, DVec3::ONE, &mut pos, 2);
        assert_approx_eq!(f64, pos.x, 0.25);
        assert_approx_eq!(f64, pos.y, 0.5);

        let mut pos = DVec3::new(1.25, -0.5, 0.);
        box_reflect(DVec3::ZERO, DVec3::ONE, &mut pos, 2);
        assert_approx_eq!(f64, pos.x, 0.75);
        assert_approx_eq!(f64, pos.y, 0.5);
    }
}
