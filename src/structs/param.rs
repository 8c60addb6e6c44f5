//! Parameter definitions shared by audio element and mix presentation OBUs.

use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// Common fields of every parameter definition.
#[derive(Debug, Clone, Default)]
pub struct ParamDefinition {
    pub parameter_id: u32,
    pub parameter_rate: u32,
    pub mode: u8,
    pub duration: u32,
    pub constant_subblock_duration: u32,
    pub subblock_durations: Vec<u32>,
}

impl ParamDefinition {
    pub fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let mut def = Self {
            parameter_id: buf.read_uleb128()?.0,
            parameter_rate: buf.read_uleb128()?.0,
            mode: buf.read_bits(1)? as u8,
            ..Default::default()
        };
        let _reserved = buf.read_bits(7)?;
        if def.mode != 0 {
            return Ok(def);
        }
        def.duration = buf.read_uleb128()?.0;
        def.constant_subblock_duration = buf.read_uleb128()?.0;
        if def.constant_subblock_duration != 0 {
            return Ok(def);
        }
        let (num_subblocks, _) = buf.read_uleb128()?;
        for _ in 0..num_subblocks {
            def.subblock_durations.push(buf.read_uleb128()?.0);
        }
        Ok(def)
    }
}

/// Mix gain parameter definition with its Q7.8 dB default.
#[derive(Debug, Clone, Default)]
pub struct MixGainParamDefinition {
    pub base: ParamDefinition,
    pub default_mix_gain: i16,
}

impl MixGainParamDefinition {
    pub fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        Ok(Self {
            base: ParamDefinition::read(buf)?,
            default_mix_gain: buf.read_i16()?,
        })
    }

    /// Linear gain from the Q7.8 dB default.
    pub fn default_linear_gain(&self) -> f64 {
        let db = f64::from(self.default_mix_gain) / 256.0;
        10f64.powf(db / 20.0)
    }
}

/// Demixing parameter definition with its default demixing info.
#[derive(Debug, Clone)]
pub struct DemixingParamDefinition {
    pub base: ParamDefinition,
    pub default_dmixp_mode: u8,
    pub default_w: u8,
}

impl DemixingParamDefinition {
    pub fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let base = ParamDefinition::read(buf)?;
        let default_dmixp_mode = buf.read_bits(3)? as u8;
        let _reserved = buf.read_bits(5)?;
        let default_w = buf.read_bits(4)? as u8;
        let _reserved = buf.read_bits(4)?;
        Ok(Self {
            base,
            default_dmixp_mode,
            default_w,
        })
    }
}
