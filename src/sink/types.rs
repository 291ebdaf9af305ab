//! Sink graph types
//!
//! This module defines the values exchanged between the recorder and a
//! muxing engine: codecs, stream parameters, the structured stage plan a
//! graph is built from, media buffers and completion results.

use crate::recorder::state::AudioFormat;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Negotiated video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
}

impl VideoCodec {
    pub fn from_hevc(is_hevc: bool) -> Self {
        if is_hevc {
            VideoCodec::H265
        } else {
            VideoCodec::H264
        }
    }

    /// Tag used in output filenames
    pub fn tag(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H264",
            VideoCodec::H265 => "H265",
        }
    }

    /// Media type of the Annex-B byte stream delivered by the sender
    pub fn media_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/x-h264",
            VideoCodec::H265 => "video/x-h265",
        }
    }
}

/// Negotiated audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCodec {
    /// AAC-ELD, used alongside screen mirroring
    #[default]
    AacEld,
    /// Apple Lossless
    Alac,
}

impl AudioCodec {
    /// AirPlay compression type reported during format negotiation
    pub const ALAC_COMPRESSION_TYPE: u8 = 2;

    /// Map the sender's compression type. Only 2 selects ALAC; every other
    /// value is recorded as AAC.
    pub fn from_compression_type(ct: u8) -> Self {
        if ct == Self::ALAC_COMPRESSION_TYPE {
            AudioCodec::Alac
        } else {
            AudioCodec::AacEld
        }
    }

    /// Tag used in output filenames
    pub fn tag(&self) -> &'static str {
        match self {
            AudioCodec::AacEld => "AAC",
            AudioCodec::Alac => "ALAC",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            AudioCodec::AacEld => "audio/mpeg",
            AudioCodec::Alac => "audio/x-alac",
        }
    }
}

/// Ingestion endpoint of a sink graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointId {
    Video,
    Audio,
}

impl EndpointId {
    /// Element name of the endpoint inside an engine graph
    pub fn name(&self) -> &'static str {
        match self {
            EndpointId::Video => "video_src",
            EndpointId::Audio => "audio_src",
        }
    }
}

/// MPEG-4 audio object type of AAC-ELD
const AAC_ELD_OBJECT_TYPE: u32 = 39;

/// Sampling frequencies with a 4-bit index in an AudioSpecificConfig
const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// MSB-first bit packer for AudioSpecificConfig fields
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    used: u32,
}

impl BitWriter {
    fn put(&mut self, value: u32, bits: u32) {
        for shift in (0..bits).rev() {
            if self.used % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> shift) & 1) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (7 - self.used % 8);
            }
            self.used += 1;
        }
    }
}

/// Channel configuration field for `channels`, 0 when the layout needs an
/// in-band program config
fn aac_channel_configuration(channels: u16) -> u32 {
    match channels {
        1..=6 => channels as u32,
        8 => 7,
        _ => 0,
    }
}

/// Build the AAC-ELD AudioSpecificConfig for `format`: 480-sample frames,
/// no error resilience tools and no low-delay SBR. The default 44.1 kHz
/// stereo format yields `f8e85000`.
pub fn aac_eld_codec_data(format: &AudioFormat) -> Vec<u8> {
    let mut writer = BitWriter::default();
    // Object types above 30 are escaped
    writer.put(31, 5);
    writer.put(AAC_ELD_OBJECT_TYPE - 32, 6);
    match AAC_SAMPLE_RATES.iter().position(|&r| r == format.sample_rate) {
        Some(index) => writer.put(index as u32, 4),
        None => {
            writer.put(0xf, 4);
            writer.put(format.sample_rate, 24);
        }
    }
    writer.put(aac_channel_configuration(format.channels), 4);
    writer.put(1, 1); // frameLengthFlag: 480
    writer.put(0, 3); // section / scalefactor / spectral resilience
    writer.put(0, 1); // ldSbrPresentFlag
    writer.put(0, 4); // ELDEXT_TERM
    writer.bytes
}

/// ALAC frame length used by AirPlay senders
pub const ALAC_FRAME_LENGTH: u32 = 352;

/// Build the 36-byte ALAC magic cookie ('alac' atom + ALACSpecificConfig)
pub fn alac_magic_cookie(format: &AudioFormat) -> Vec<u8> {
    let mut cookie = Vec::with_capacity(36);
    cookie.extend_from_slice(&36u32.to_be_bytes());
    cookie.extend_from_slice(b"alac");
    cookie.extend_from_slice(&0u32.to_be_bytes());
    cookie.extend_from_slice(&ALAC_FRAME_LENGTH.to_be_bytes());
    cookie.push(0); // compatible version
    cookie.push(format.bits_per_sample as u8);
    cookie.extend_from_slice(&[40, 10, 14]); // rice pb / mb / kb
    cookie.push(format.channels as u8);
    cookie.extend_from_slice(&255u16.to_be_bytes()); // max run
    cookie.extend_from_slice(&0u32.to_be_bytes()); // max frame bytes
    cookie.extend_from_slice(&0u32.to_be_bytes()); // avg bit rate
    cookie.extend_from_slice(&format.sample_rate.to_be_bytes());
    cookie
}

/// Stream parameters bound to an ingestion endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamParams {
    /// Annex-B byte stream, one access unit per buffer
    Video { codec: VideoCodec },
    /// Raw (unframed) compressed audio
    Audio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
        codec_data: Vec<u8>,
    },
}

impl StreamParams {
    pub fn video(codec: VideoCodec) -> Self {
        StreamParams::Video { codec }
    }

    pub fn audio(codec: AudioCodec, format: &AudioFormat) -> Self {
        let codec_data = match codec {
            AudioCodec::AacEld => aac_eld_codec_data(format),
            AudioCodec::Alac => alac_magic_cookie(format),
        };
        StreamParams::Audio {
            codec,
            sample_rate: format.sample_rate,
            channels: format.channels,
            codec_data,
        }
    }
}

impl fmt::Display for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamParams::Video { codec } => write!(
                f,
                "{},stream-format=byte-stream,alignment=au",
                codec.media_type()
            ),
            StreamParams::Audio {
                codec,
                sample_rate,
                channels,
                codec_data,
            } => {
                write!(f, "{}", codec.media_type())?;
                if *codec == AudioCodec::AacEld {
                    write!(f, ",mpegversion=4")?;
                }
                write!(
                    f,
                    ",channels={},rate={},stream-format=raw,codec_data=",
                    channels, sample_rate
                )?;
                for byte in codec_data {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Processing stage between an ingestion endpoint and the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDescriptor {
    Queue,
    H264Parse,
    H265Parse,
    AacParse,
}

impl StageDescriptor {
    /// Engine element factory implementing this stage
    pub fn factory_name(&self) -> &'static str {
        match self {
            StageDescriptor::Queue => "queue",
            StageDescriptor::H264Parse => "h264parse",
            StageDescriptor::H265Parse => "h265parse",
            StageDescriptor::AacParse => "aacparse",
        }
    }
}

/// One ingestion branch: endpoint, its stream parameters, and the stages
/// leading to the multiplexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub endpoint: EndpointId,
    pub params: StreamParams,
    pub stages: Vec<StageDescriptor>,
}

/// Which media a graph carries and with which codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphLayout {
    pub video: Option<VideoCodec>,
    pub audio: Option<AudioCodec>,
}

impl GraphLayout {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    /// Endpoints of this layout, video first
    pub fn endpoints(&self) -> Vec<EndpointId> {
        let mut endpoints = Vec::with_capacity(2);
        if self.has_video() {
            endpoints.push(EndpointId::Video);
        }
        if self.has_audio() {
            endpoints.push(EndpointId::Audio);
        }
        endpoints
    }
}

/// Structured description of a complete sink graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPlan {
    pub layout: GraphLayout,
    pub branches: Vec<Branch>,
    /// Output file written by the file-writing stage
    pub location: PathBuf,
}

impl GraphPlan {
    pub fn branch(&self, endpoint: EndpointId) -> Option<&Branch> {
        self.branches.iter().find(|b| b.endpoint == endpoint)
    }
}

impl fmt::Display for GraphPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for branch in &self.branches {
            write!(f, "appsrc name={} format=time is-live=true", branch.endpoint.name())?;
            for stage in &branch.stages {
                write!(f, " ! {}", stage.factory_name())?;
            }
            write!(f, " ! mux. ")?;
        }
        write!(
            f,
            "mp4mux name=mux ! filesink name=filesink location={}",
            self.location.display()
        )
    }
}

/// Encoded media buffer handed to an ingestion endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBuffer {
    pub data: Vec<u8>,
    /// Presentation timestamp, nanoseconds from session origin
    pub pts: u64,
    /// Decode timestamp; equal to `pts` since frames arrive in presentation order
    pub dts: u64,
    /// Explicit duration in nanoseconds, if known
    pub duration: Option<u64>,
}

impl MediaBuffer {
    /// Copy a frame payload into a new buffer, failing instead of aborting
    /// when the allocation cannot be satisfied
    pub fn copy_from(data: &[u8]) -> Result<Self, SinkError> {
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(data.len())
            .map_err(|_| SinkError::Allocation(data.len()))?;
        payload.extend_from_slice(data);
        Ok(Self {
            data: payload,
            pts: 0,
            dts: 0,
            duration: None,
        })
    }

    /// All-zero payload of `len` bytes
    pub fn zeroed(len: usize) -> Result<Self, SinkError> {
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(len)
            .map_err(|_| SinkError::Allocation(len))?;
        payload.resize(len, 0);
        Ok(Self {
            data: payload,
            pts: 0,
            dts: 0,
            duration: None,
        })
    }

    pub fn with_timestamp(mut self, pts: u64) -> Self {
        self.pts = pts;
        self.dts = pts;
        self
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of waiting for a graph to drain after end-of-stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// End-of-stream reached the file-writing stage
    EndOfStream,
    /// The graph reported an error while draining
    Error(String),
    /// Neither end-of-stream nor an error arrived in time
    TimedOut,
}

/// Sink graph errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Graph construction failed: {0}")]
    Construction(String),

    #[error("Graph has no {0:?} endpoint")]
    MissingEndpoint(EndpointId),

    #[error("Push to {endpoint:?} rejected: {reason}")]
    Push { endpoint: EndpointId, reason: String },

    #[error("Failed to allocate {0} byte buffer")]
    Allocation(usize),

    #[error("Engine error: {0}")]
    Engine(String),
}
