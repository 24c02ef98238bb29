//! Fixed-length record encoding of conserved totals, used to exchange them between mesh
//! partitions.
//!
//! A record reads `[mass, energy, momentum_x, (momentum_y), (momentum_z), tracer_0, ...]`,
//! with the tracers in name order.

use glam::DVec3;

use crate::{cell::Extensive, utils::Dimensionality, HydroError};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensiveCodec {
    dimensionality: Dimensionality,
    tracer_names: Vec<String>,
}

impl ExtensiveCodec {
    pub fn new<S: AsRef<str>>(
        dimensionality: Dimensionality,
        tracer_names: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut tracer_names: Vec<String> = tracer_names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        tracer_names.sort();
        tracer_names.dedup();
        Self {
            dimensionality,
            tracer_names,
        }
    }

    /// A codec for every tracer present in `batch`.
    pub fn for_batch(dimensionality: Dimensionality, batch: &[Extensive]) -> Self {
        Self::new(
            dimensionality,
            batch.iter().flat_map(|extensive| extensive.tracers.keys()),
        )
    }

    pub fn tracer_names(&self) -> &[String] {
        &self.tracer_names
    }

    pub fn chunk_len(&self) -> usize {
        self.dimensionality.count() + 2 + self.tracer_names.len()
    }

    /// Missing tracers are written as zero, unknown tracers are dropped.
    pub fn encode(&self, batch: &[Extensive]) -> Vec<f64> {
        let dims = self.dimensionality.count();
        let mut buffer = Vec::with_capacity(batch.len() * self.chunk_len());
        for extensive in batch {
            buffer.push(extensive.mass());
            buffer.push(extensive.energy());
            let momentum = extensive.momentum();
            buffer.extend((0..dims).map(|i| momentum[i]));
            buffer.extend(
                self.tracer_names
                    .iter()
                    .map(|name| extensive.tracers.get(name).copied().unwrap_or(0.)),
            );
        }
        buffer
    }

    pub fn decode(&self, buffer: &[f64]) -> Result<Vec<Extensive>, HydroError> {
        let chunk_len = self.chunk_len();
        if buffer.len() % chunk_len != 0 {
            return Err(HydroError::malformed_batch(chunk_len, buffer.len()));
        }
        let dims = self.dimensionality.count();
        Ok(buffer
            .chunks_exact(chunk_len)
            .map(|record| {
                let mut momentum = DVec3::ZERO;
                for i in 0..dims {
                    momentum[i] = record[2 + i];
                }
                let mut extensive = Extensive::new(record[0], momentum, record[1]);
                extensive.tracers = self
                    .tracer_names
                    .iter()
                    .cloned()
                    .zip(record[2 + dims..].iter().copied())
                    .collect();
                extensive
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<Extensive> {
        let mut a = Extensive::new(1.5, DVec3::new(0.1, -0.2, 0.3), 7.25);
        a.tracers.insert("metals".to_string(), 0.01);
        a.tracers.insert("dye".to_string(), 0.75);
        let mut b = Extensive::new(0.3, DVec3::new(-4., 2., 0.), 1e-9);
        b.tracers.insert("dye".to_string(), 0.);
        b.tracers.insert("metals".to_string(), 0.2);
        vec![a, b]
    }

    #[test]
    fn test_layout() {
        let codec = ExtensiveCodec::new(Dimensionality::TwoD, ["metals", "dye"]);
        assert_eq!(codec.chunk_len(), 6);
        assert_eq!(codec.tracer_names(), &["dye".to_string(), "metals".to_string()]);
        let buffer = codec.encode(&sample()[..1]);
        assert_eq!(buffer, vec![1.5, 7.25, 0.1, -0.2, 0.75, 0.01]);
    }

    #[test]
    fn test_round_trip() {
        let batch = sample();
        let codec = ExtensiveCodec::for_batch(Dimensionality::ThreeD, &batch);
        let decoded = codec.decode(&codec.encode(&batch)).unwrap();
        assert_eq!(decoded, batch);
        assert!(codec.decode(&[]).unwrap().is_empty());
        assert!(codec.encode(&[]).is_empty());
    }

    #[test]
    fn test_malformed() {
        let codec = ExtensiveCodec::new(Dimensionality::OneD, ["dye"]);
        let result = codec.decode(&[0.; 5]);
        assert!(matches!(
            result,
            Err(HydroError::MalformedBatch {
                chunk_len: 4,
                buffer_len: 5,
                ..
            })
        ));
    }
}
