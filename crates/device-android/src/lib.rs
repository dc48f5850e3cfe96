// Android output device using Oboe

#[cfg(target_os = "android")]
mod oboe_device;

#[cfg(target_os = "android")]
pub use oboe_device::{OboeControl, OboeEngine, OboeOutputMix, OboePlatform, OboePlayer};

#[cfg(not(target_os = "android"))]
mod unsupported;

#[cfg(not(target_os = "android"))]
pub use unsupported::{OboePlatform, Unavailable};

use fmp_audio_device::Millibel;

/// Linear gain for a millibel attenuation
pub fn millibel_to_gain(level: Millibel) -> f32 {
    10f32.powf(level as f32 / 2000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmp_audio_device::MILLIBEL_MIN;

    #[test]
    fn gain_curve() {
        assert_eq!(millibel_to_gain(0), 1.0);
        assert!((millibel_to_gain(-2000) - 0.1).abs() < 1e-6);
        assert!(millibel_to_gain(MILLIBEL_MIN) < 1e-15);
    }
}
