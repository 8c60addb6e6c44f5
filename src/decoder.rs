//! The public decoder facade.
//!
//! Drives the two-phase state machine: descriptor accumulation first, then
//! the temporal-unit pump. All pipeline internals stay behind one owning
//! handle; callers only ever see settings, metadata getters, and PCM bytes
//! copied into their own buffers.
//!
//! ```no_run
//! use iamfdec::decoder::{IamfDecoder, Settings};
//!
//! let mut decoder = IamfDecoder::create(Settings::default())?;
//! let chunk: &[u8] = &[];
//! decoder.decode(chunk)?;
//! if decoder.is_descriptor_processing_complete() {
//!     let channels = decoder.get_number_of_output_channels()?;
//!     let frame_size = decoder.get_frame_size()? as usize;
//!     let mut out = vec![0u8; channels * frame_size * 4];
//!     while decoder.is_temporal_unit_available() {
//!         let written = decoder.get_output_temporal_unit(&mut out)?;
//!         // play back out[..written]
//!     }
//! }
//! # Ok::<(), iamfdec::Error>(())
//! ```

use log::debug;

use crate::process::descriptors::{self, DescriptorSet};
use crate::process::pipeline::RenderPipeline;
use crate::process::reorder::{self, ReorderScheme};
use crate::process::select::{self, Selection};
use crate::process::temporal::UnitAssembler;
use crate::structs::mix_presentation::SoundSystem;
use crate::structs::sequence_header::ProfileVersion;
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::{DescriptorError, Error, TemporalError};
use crate::utils::pcm::{self, OutputSampleType};

pub use crate::process::select::{RequestedMix, SelectedMix};

/// Decoder construction options. Every field is a hint or a default that
/// can be observed (and partly changed) later.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Desired mix presentation and output layout. Used as far as the
    /// descriptors allow; the resolved outcome is readable through
    /// [`IamfDecoder::get_output_mix`].
    pub requested_mix: RequestedMix,
    /// Acceptable profiles for mix selection; empty means any.
    pub requested_profile_versions: Vec<ProfileVersion>,
    /// Channel convention for the PCM output.
    pub channel_ordering: ReorderScheme,
    /// Initial output encoding; adjustable per frame through
    /// [`IamfDecoder::configure_output_sample_type`].
    pub requested_output_sample_type: OutputSampleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AcceptingDescriptors,
    AcceptingTemporalUnits,
    EndOfStream,
}

struct DecoderState {
    buf: StreamBuffer,
    settings: Settings,
    phase: Phase,
    descriptors: Option<DescriptorSet>,
    selection: Option<Selection>,
    pipeline: Option<RenderPipeline>,
    assembler: Option<UnitAssembler>,
    /// The single decoded-but-unread frame slot, channel-major.
    pending: Option<Vec<Vec<f64>>>,
    sample_type: OutputSampleType,
    /// Whether this instance was created from a descriptor blob, which is
    /// what makes `reset` possible.
    descriptor_mode: bool,
    poisoned: bool,
}

/// Streaming IAMF decoder: push bytes, pull rendered temporal units.
pub struct IamfDecoder {
    state: Box<DecoderState>,
}

impl IamfDecoder {
    /// Creates a decoder for pure streaming use, descriptors unknown in
    /// advance.
    pub fn create(settings: Settings) -> Result<Self, Error> {
        let sample_type = settings.requested_output_sample_type;
        Ok(Self {
            state: Box::new(DecoderState {
                buf: StreamBuffer::new(),
                settings,
                phase: Phase::AcceptingDescriptors,
                descriptors: None,
                selection: None,
                pipeline: None,
                assembler: None,
                pending: None,
                sample_type,
                descriptor_mode: false,
                poisoned: false,
            }),
        })
    }

    /// Creates a decoder from a blob holding exactly the descriptor OBUs.
    ///
    /// Trailing bytes, truncation, or an incomplete set all fail with
    /// [`Error::InvalidDescriptors`]. The resulting decoder is already past
    /// descriptor processing and additionally supports [`IamfDecoder::reset`].
    pub fn create_from_descriptors(settings: Settings, descriptor_obus: &[u8]) -> Result<Self, Error> {
        let mut decoder = Self::create(settings)?;
        decoder.state.descriptor_mode = true;
        decoder.state.buf.push_bytes(descriptor_obus);
        let set = match descriptors::accumulate(&mut decoder.state.buf, true) {
            Ok(set) => set,
            Err(DescriptorError::Invalid(message)) => {
                return Err(Error::InvalidDescriptors(message))
            }
            Err(DescriptorError::Insufficient) => {
                return Err(Error::InvalidDescriptors(
                    "descriptor OBUs are truncated".into(),
                ))
            }
        };
        decoder.seal(set)?;
        Ok(decoder)
    }

    /// Appends bytes and drives the state machine.
    ///
    /// The call that completes descriptor processing returns without
    /// decoding any temporal unit, so the caller can size output buffers
    /// from the metadata getters first. Later calls pull at most one unit
    /// into the pending slot; while a frame is pending, pushed bytes simply
    /// accumulate.
    pub fn decode(&mut self, bitstream: &[u8]) -> Result<(), Error> {
        self.check_poisoned()?;
        if self.state.phase == Phase::EndOfStream {
            return Err(Error::DecodeAfterEos);
        }
        self.state.buf.push_bytes(bitstream);

        match self.state.phase {
            Phase::AcceptingDescriptors => match descriptors::accumulate(&mut self.state.buf, false)
            {
                Ok(set) => self.seal(set),
                Err(DescriptorError::Insufficient) => Ok(()),
                Err(DescriptorError::Invalid(message)) => {
                    self.state.poisoned = true;
                    Err(Error::InvalidDescriptors(message))
                }
            },
            Phase::AcceptingTemporalUnits => {
                if self.state.pending.is_none() {
                    self.try_pull(false)?;
                }
                Ok(())
            }
            Phase::EndOfStream => unreachable!("checked above"),
        }
    }

    pub fn is_descriptor_processing_complete(&self) -> bool {
        self.state.descriptors.is_some()
    }

    /// True iff a decoded temporal unit is waiting in the pending slot.
    pub fn is_temporal_unit_available(&self) -> bool {
        self.state.pending.is_some()
    }

    /// Writes the pending frame into `out` as interleaved little-endian
    /// PCM and returns the byte count; 0 when nothing is pending.
    ///
    /// On success the decoder immediately tries to decode the next unit, so
    /// availability may flip straight back to true. A too-small buffer
    /// fails with [`Error::BufferTooSmall`] and keeps the frame for a retry.
    pub fn get_output_temporal_unit(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        self.check_poisoned()?;
        let Some(frame) = self.state.pending.as_ref() else {
            return Ok(0);
        };
        let written = pcm::write_frame(frame, self.state.sample_type, out)?;
        self.state.pending = None;
        if self.state.descriptors.is_some() {
            let eos = self.state.phase == Phase::EndOfStream;
            self.try_pull(eos)?;
        }
        Ok(written)
    }

    /// Tells the decoder no more bytes are coming. A last partial temporal
    /// unit, if any, becomes available for draining. `decode` is rejected
    /// from here on.
    pub fn signal_end_of_stream(&mut self) -> Result<(), Error> {
        let was_streaming = self.state.phase != Phase::EndOfStream;
        self.state.phase = Phase::EndOfStream;
        if was_streaming
            && !self.state.poisoned
            && self.state.pending.is_none()
            && self.state.descriptors.is_some()
        {
            self.try_pull(true)?;
        }
        Ok(())
    }

    pub fn get_output_layout(&self) -> Result<SoundSystem, Error> {
        self.check_poisoned()?;
        self.selection().map(|s| s.selected.output_layout)
    }

    pub fn get_output_mix(&self) -> Result<SelectedMix, Error> {
        self.check_poisoned()?;
        self.selection().map(|s| s.selected)
    }

    pub fn get_sample_rate(&self) -> Result<u32, Error> {
        self.check_poisoned()?;
        self.descriptors().map(DescriptorSet::sample_rate)
    }

    pub fn get_frame_size(&self) -> Result<u32, Error> {
        self.check_poisoned()?;
        self.descriptors().map(DescriptorSet::frame_size)
    }

    pub fn get_number_of_output_channels(&self) -> Result<usize, Error> {
        self.check_poisoned()?;
        self.selection()
            .map(|s| s.selected.output_layout.channel_count())
    }

    pub fn get_output_sample_type(&self) -> Result<OutputSampleType, Error> {
        self.check_poisoned()?;
        self.descriptors()?;
        Ok(self.state.sample_type)
    }

    /// Changes the output encoding; takes effect on the next
    /// [`IamfDecoder::get_output_temporal_unit`].
    pub fn configure_output_sample_type(&mut self, sample_type: OutputSampleType) {
        self.state.sample_type = sample_type;
    }

    /// Drops all stream state and re-seals the snapshotted descriptors.
    /// Only decoders created from descriptors support this.
    pub fn reset(&mut self) -> Result<(), Error> {
        let requested = self.state.settings.requested_mix.clone();
        self.reset_with_new_mix(requested).map(|_| ())
    }

    /// As [`IamfDecoder::reset`], but re-runs mix selection with new hints
    /// and reports the outcome.
    pub fn reset_with_new_mix(&mut self, requested: RequestedMix) -> Result<SelectedMix, Error> {
        if !self.state.descriptor_mode {
            return Err(Error::ResetUnavailable);
        }
        let raw = self
            .state
            .descriptors
            .as_ref()
            .map(|set| set.raw_bytes.clone())
            .ok_or_else(|| Error::Internal("descriptor mode without a sealed set".into()))?;

        self.state.settings.requested_mix = requested;
        self.state.buf = StreamBuffer::new();
        self.state.buf.push_bytes(&raw);
        self.state.descriptors = None;
        self.state.selection = None;
        self.state.pipeline = None;
        self.state.assembler = None;
        self.state.pending = None;
        self.state.poisoned = false;
        self.state.phase = Phase::AcceptingDescriptors;

        let set = descriptors::accumulate(&mut self.state.buf, true)
            .map_err(|e| Error::Internal(format!("descriptor snapshot no longer seals: {e}")))?;
        self.seal(set)?;
        self.get_output_mix()
    }

    fn descriptors(&self) -> Result<&DescriptorSet, Error> {
        self.state.descriptors.as_ref().ok_or(Error::DescriptorsNotReady)
    }

    fn selection(&self) -> Result<&Selection, Error> {
        self.state.selection.as_ref().ok_or(Error::DescriptorsNotReady)
    }

    fn check_poisoned(&self) -> Result<(), Error> {
        if self.state.poisoned {
            return Err(Error::Internal(
                "a previous error left the decoder unusable".into(),
            ));
        }
        Ok(())
    }

    /// Seals the descriptor set: select the mix, build the pipeline, and
    /// reclaim the consumed descriptor bytes.
    fn seal(&mut self, set: DescriptorSet) -> Result<(), Error> {
        let selection = select::select(
            &set,
            &self.state.settings.requested_mix,
            &self.state.settings.requested_profile_versions,
        )
        .map_err(|e| {
            self.state.poisoned = true;
            match e {
                DescriptorError::Invalid(message) => Error::InvalidDescriptors(message),
                DescriptorError::Insufficient => Error::Internal("selection cannot starve".into()),
            }
        })?;
        let pipeline = RenderPipeline::create(&set, &selection).map_err(|e| {
            self.state.poisoned = true;
            e
        })?;
        self.state.assembler = Some(UnitAssembler::new(set.frame_size()));
        debug!(
            "descriptors sealed; mix {} rendering to {:?}",
            selection.selected.mix_presentation_id, selection.selected.output_layout
        );
        self.state.selection = Some(selection);
        self.state.pipeline = Some(pipeline);
        self.state.descriptors = Some(set);
        self.state.phase = Phase::AcceptingTemporalUnits;
        self.flush_consumed();
        Ok(())
    }

    /// Attempts to pull and render exactly one temporal unit into the
    /// pending slot.
    fn try_pull(&mut self, eos: bool) -> Result<(), Error> {
        let state = &mut *self.state;
        let (Some(assembler), Some(descriptors), Some(pipeline), Some(selection)) = (
            state.assembler.as_mut(),
            state.descriptors.as_ref(),
            state.pipeline.as_mut(),
            state.selection.as_ref(),
        ) else {
            return Err(Error::Internal("pull before descriptors sealed".into()));
        };

        let unit = match assembler.pull_one(&mut state.buf, descriptors, eos) {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                self.flush_consumed();
                return Ok(());
            }
            Err(TemporalError::UnexpectedDescriptor) => {
                state.poisoned = true;
                return Err(Error::UnexpectedDescriptor);
            }
            Err(TemporalError::Corrupt(message)) => {
                state.poisoned = true;
                return Err(Error::CorruptTemporalUnit(message));
            }
        };

        match pipeline.render_unit(&unit) {
            Ok(Some(mut frame)) => {
                reorder::reorder(
                    &mut frame,
                    selection.selected.output_layout,
                    state.settings.channel_ordering,
                );
                state.pending = Some(frame);
            }
            Ok(None) => {
                debug!("trivial temporal unit at {} advanced the clock", unit.timestamp);
            }
            Err(e) => {
                state.poisoned = true;
                return Err(e);
            }
        }
        self.flush_consumed();
        Ok(())
    }

    /// Reclaims every whole byte before the cursor.
    fn flush_consumed(&mut self) {
        let consumed = (self.state.buf.tell() >> 3) as usize;
        if consumed > 0 {
            // Cannot fail: the cursor is past these bytes by construction.
            let _ = self.state.buf.flush(consumed);
        }
    }
}
