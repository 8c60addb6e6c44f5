//! Interleaved PCM serialisation.
//!
//! Turns a rendered channel-major frame of normalised samples into
//! little-endian signed PCM, tick-major (interleaved), at 16- or 32-bit
//! width.

use crate::utils::errors::Error;

/// Output sample encoding for [`write_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSampleType {
    Int16LittleEndian,
    #[default]
    Int32LittleEndian,
}

impl OutputSampleType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            OutputSampleType::Int16LittleEndian => 2,
            OutputSampleType::Int32LittleEndian => 4,
        }
    }
}

/// Encodes one normalised sample as a signed integer of the requested width.
///
/// `s` is clamped to [-1, 1] and scaled by `2^(N-1) - 1`, rounding half away
/// from zero. No dithering.
fn quantize(s: f64, sample_type: OutputSampleType) -> i64 {
    let clamped = s.clamp(-1.0, 1.0);
    let max = match sample_type {
        OutputSampleType::Int16LittleEndian => i16::MAX as f64,
        OutputSampleType::Int32LittleEndian => i32::MAX as f64,
    };
    (clamped * max).round() as i64
}

/// Serialises `frame` (channel-major, all channels the same length) into
/// `out`, interleaved tick-major, little-endian.
///
/// Returns the number of bytes written. Fails with [`Error::BufferTooSmall`]
/// without touching `out` when the buffer cannot hold the whole frame; the
/// caller may retry with a larger buffer.
pub fn write_frame(
    frame: &[Vec<f64>],
    sample_type: OutputSampleType,
    out: &mut [u8],
) -> Result<usize, Error> {
    let channels = frame.len();
    let ticks = frame.first().map_or(0, Vec::len);
    let bytes_per_sample = sample_type.bytes_per_sample();
    let required = channels * ticks * bytes_per_sample;
    if out.len() < required {
        return Err(Error::BufferTooSmall {
            required,
            provided: out.len(),
        });
    }

    let mut pos = 0;
    for t in 0..ticks {
        for channel in frame {
            let value = quantize(channel[t], sample_type);
            match sample_type {
                OutputSampleType::Int16LittleEndian => {
                    out[pos..pos + 2].copy_from_slice(&(value as i16).to_le_bytes());
                }
                OutputSampleType::Int32LittleEndian => {
                    out[pos..pos + 4].copy_from_slice(&(value as i32).to_le_bytes());
                }
            }
            pos += bytes_per_sample;
        }
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_single_samples_bit_exactly() -> anyhow::Result<()> {
        // 0.5 * 32767 = 16383.5, rounds away from zero.
        let mut out = [0u8; 2];
        let n = write_frame(&[vec![0.5]], OutputSampleType::Int16LittleEndian, &mut out)?;
        assert_eq!(n, 2);
        assert_eq!(out, 16384i16.to_le_bytes());

        let mut out = [0u8; 4];
        write_frame(&[vec![-1.0]], OutputSampleType::Int32LittleEndian, &mut out)?;
        assert_eq!(out, (-i32::MAX).to_le_bytes());

        // Out-of-range input clamps to full scale.
        write_frame(&[vec![2.0]], OutputSampleType::Int32LittleEndian, &mut out)?;
        assert_eq!(out, i32::MAX.to_le_bytes());
        Ok(())
    }

    #[test]
    fn interleaves_tick_major() -> anyhow::Result<()> {
        let left = vec![1.0 / 32767.0, 2.0 / 32767.0];
        let right = vec![3.0 / 32767.0, 4.0 / 32767.0];
        let mut out = [0u8; 8];
        let n = write_frame(&[left, right], OutputSampleType::Int16LittleEndian, &mut out)?;
        assert_eq!(n, 8);
        assert_eq!(out, [1, 0, 3, 0, 2, 0, 4, 0]);
        Ok(())
    }

    #[test]
    fn small_buffer_is_reported_and_harmless() {
        let frame = vec![vec![0.0; 8]; 2];
        let mut out = [0u8; 15];
        match write_frame(&frame, OutputSampleType::Int16LittleEndian, &mut out) {
            Err(Error::BufferTooSmall { required, provided }) => {
                assert_eq!(required, 32);
                assert_eq!(provided, 15);
            }
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
    }
}
