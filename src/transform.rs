//! Per-reading value transform applied to raw registers before storage.

use crate::reading::{RegisterBlock, CHANNEL_COUNT};

/// Raw values above this are treated as sensor saturation and stored as 0.
///
/// Only applies when a division factor is configured.
pub const SATURATION_THRESHOLD: u16 = 4000;

/// How raw register values become stored channel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueTransform {
    /// Store the raw register value unchanged, no clamping.
    Identity,
    /// Zero values above [`SATURATION_THRESHOLD`], divide the rest by `factor`.
    Scaled { factor: f64 },
}

impl ValueTransform {
    /// Select the transform for an optional configured division factor.
    pub fn from_factor(factor: Option<f64>) -> Self {
        match factor {
            Some(factor) => ValueTransform::Scaled { factor },
            None => ValueTransform::Identity,
        }
    }

    /// Transform every channel of `raw`.
    pub fn apply(&self, raw: &RegisterBlock) -> [f64; CHANNEL_COUNT] {
        let mut out = [0.0; CHANNEL_COUNT];
        for (slot, &value) in out.iter_mut().zip(raw.iter()) {
            *slot = match *self {
                ValueTransform::Identity => f64::from(value),
                ValueTransform::Scaled { .. } if value > SATURATION_THRESHOLD => 0.0,
                ValueTransform::Scaled { factor } => f64::from(value) / factor,
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: RegisterBlock = [100, 200, 300, 400, 500, 600, 4500, 700];

    #[test]
    fn identity_keeps_values_and_does_not_clamp() {
        let out = ValueTransform::from_factor(None).apply(&RAW);
        assert_eq!(out, [100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 4500.0, 700.0]);
    }

    #[test]
    fn scaled_divides_and_zeroes_saturated_channels() {
        let out = ValueTransform::from_factor(Some(10.0)).apply(&RAW);
        assert_eq!(out, [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 0.0, 70.0]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let raw = [4000, 4001, 0, 0, 0, 0, 0, u16::MAX];
        let out = ValueTransform::Scaled { factor: 1.0 }.apply(&raw);
        assert_eq!(out[0], 4000.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn reapplying_to_unclamped_output_with_unit_factor_is_stable() {
        let raw = [1, 2, 3, 4, 5, 6, 7, 8];
        let transform = ValueTransform::Scaled { factor: 1.0 };
        let once = transform.apply(&raw);
        let again: RegisterBlock = once.map(|v| v as u16);
        assert_eq!(transform.apply(&again), once);
    }
}
