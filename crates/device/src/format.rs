// PCM format description handed to the platform at player creation

use std::ops::BitOr;

/// Attenuation in 1/100 dB
pub type Millibel = i16;

/// Quietest level a device can report
pub const MILLIBEL_MIN: Millibel = i16::MIN;

/// Speaker positions a stream is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const FRONT_LEFT: ChannelMask = ChannelMask(0x1);
    pub const FRONT_RIGHT: ChannelMask = ChannelMask(0x2);
    pub const FRONT_CENTER: ChannelMask = ChannelMask(0x4);

    /// Stereo goes to left+right. Everything else is played through the centre
    /// speaker; surround layouts are not mapped.
    pub fn for_channel_count(channel_count: u16) -> Self {
        if channel_count == 2 {
            ChannelMask::FRONT_LEFT | ChannelMask::FRONT_RIGHT
        } else {
            ChannelMask::FRONT_CENTER
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ChannelMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChannelMask {
    type Output = ChannelMask;

    fn bitor(self, rhs: ChannelMask) -> ChannelMask {
        ChannelMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Interleaved integer PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channel_count: u16,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
    pub channel_mask: ChannelMask,
    pub byte_order: ByteOrder,
}

impl PcmFormat {
    /// Signed 16-bit little-endian, the only layout the sink produces
    pub fn s16le(channel_count: u16, sample_rate_hz: u32) -> Self {
        Self {
            channel_count,
            sample_rate_hz,
            bits_per_sample: 16,
            channel_mask: ChannelMask::for_channel_count(channel_count),
            byte_order: ByteOrder::LittleEndian,
        }
    }

    pub fn frame_size_bytes(&self) -> usize {
        self.channel_count as usize * (self.bits_per_sample as usize / 8)
    }

    /// Playback time of `len` bytes at this format, in microseconds
    pub fn duration_us(&self, len: usize) -> u64 {
        let frame_size = self.frame_size_bytes();
        if frame_size == 0 || self.sample_rate_hz == 0 {
            return 0;
        }
        (len / frame_size) as u64 * 1_000_000 / self.sample_rate_hz as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_routes_left_and_right() {
        let mask = ChannelMask::for_channel_count(2);
        assert!(mask.contains(ChannelMask::FRONT_LEFT));
        assert!(mask.contains(ChannelMask::FRONT_RIGHT));
        assert!(!mask.contains(ChannelMask::FRONT_CENTER));
        assert_eq!(mask.bits(), 0x3);
    }

    #[test]
    fn other_counts_fall_back_to_centre() {
        for channels in [1, 3, 4, 6] {
            assert_eq!(
                ChannelMask::for_channel_count(channels),
                ChannelMask::FRONT_CENTER
            );
        }
    }

    #[test]
    fn s16le_layout() {
        let format = PcmFormat::s16le(2, 48000);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(format.byte_order, ByteOrder::LittleEndian);
        assert_eq!(format.frame_size_bytes(), 4);
        // 4800 frames = 100ms
        assert_eq!(format.duration_us(4800 * 4), 100_000);
    }
}
