//! Stereo fold-down of beam outputs

use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use bf_core::{BeamParameters, ChannelBuffer, Sample};

/// Pan law used when folding beams into a stereo pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PanLaw {
    /// Linear crossfade: -6dB center
    #[default]
    Linear,
    /// Constant power: -3dB center
    ConstantPower,
}

impl PanLaw {
    /// (left, right) gains for a pan position in [-1, 1]
    #[inline]
    pub fn gains(self, pan: f32) -> (f32, f32) {
        let pan = pan.clamp(-1.0, 1.0);
        match self {
            PanLaw::Linear => ((1.0 - pan) * 0.5, (1.0 + pan) * 0.5),
            PanLaw::ConstantPower => {
                let angle = (pan + 1.0) * 0.5 * FRAC_PI_2;
                (angle.cos(), angle.sin())
            }
        }
    }
}

/// Sum every beam into `left`/`right` using its pan position
///
/// Outputs are overwritten. `params` supplies one entry per beam.
pub fn mix_to_stereo(
    beams: &ChannelBuffer,
    params: &[BeamParameters],
    left: &mut [Sample],
    right: &mut [Sample],
    pan_law: PanLaw,
) {
    assert_eq!(beams.num_channels(), params.len(), "one parameter set per beam");
    assert_eq!(left.len(), beams.num_samples(), "left length mismatch");
    assert_eq!(right.len(), beams.num_samples(), "right length mismatch");

    left.fill(0.0);
    right.fill(0.0);

    for (beam, p) in beams.channels().zip(params) {
        let (gain_l, gain_r) = pan_law.gains(p.pan);
        for ((l, r), &s) in left.iter_mut().zip(right.iter_mut()).zip(beam) {
            *l += s * gain_l;
            *r += s * gain_r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_law() {
        assert_eq!(PanLaw::Linear.gains(0.0), (0.5, 0.5));
        assert_eq!(PanLaw::Linear.gains(-1.0), (1.0, 0.0));
        assert_eq!(PanLaw::Linear.gains(1.0), (0.0, 1.0));
    }

    #[test]
    fn test_constant_power_law() {
        let (l, r) = PanLaw::ConstantPower.gains(0.0);
        assert_abs_diff_eq!(l, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_abs_diff_eq!(l * l + r * r, 1.0, epsilon = 1e-6);

        let (l, r) = PanLaw::ConstantPower.gains(1.0);
        assert_abs_diff_eq!(l, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_mix_two_beams() {
        let beams = ChannelBuffer::from_channels(&[vec![1.0, 1.0], vec![2.0, 0.0]]);
        let params = [
            BeamParameters::default().with_pan(-1.0),
            BeamParameters::default().with_pan(1.0),
        ];
        let mut left = [9.0; 2];
        let mut right = [9.0; 2];

        mix_to_stereo(&beams, &params, &mut left, &mut right, PanLaw::Linear);
        assert_eq!(left, [1.0, 1.0]);
        assert_eq!(right, [2.0, 0.0]);
    }
}
