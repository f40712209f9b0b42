//! Post-processing of synthesized speech through ffmpeg.
//!
//! The effect runs one ffmpeg invocation over a fixed filter chain. Input and
//! output live in a private temporary directory that is removed when the call
//! returns, whether it succeeded or not.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_FFMPEG: &str = "ffmpeg";
pub const DEFAULT_EFFECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum VoiceEffectError {
    #[error("voice effect scratch I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
    #[error("voice effect produced no audio")]
    EmptyOutput,
}

/// A processing stage applied to synthesized audio before it is sent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPostProcessor: Send + Sync {
    async fn process(&self, audio: Bytes) -> Result<Bytes, VoiceEffectError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compressor {
    /// Linear threshold in `(0, 1]`.
    pub threshold: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqBand {
    pub frequency_hz: u32,
    pub width_hz: u32,
    pub gain_db: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Echo {
    pub in_gain: f32,
    pub out_gain: f32,
    pub delay_ms: u32,
    pub decay: f32,
}

/// The ordered filter chain of the voice effect.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectChain {
    /// Sample rate of the synthesized audio.
    pub sample_rate: u32,
    /// Pitch multiplier; below 1.0 lowers the voice.
    pub pitch: f32,
    /// Speed multiplier applied after the pitch shift is compensated.
    pub tempo: f32,
    pub highpass_hz: u32,
    pub lowpass_hz: u32,
    pub compressor: Compressor,
    pub eq: EqBand,
    pub echo: Echo,
}

impl Default for EffectChain {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            pitch: 0.92,
            tempo: 0.95,
            highpass_hz: 180,
            lowpass_hz: 3_800,
            compressor: Compressor {
                threshold: 0.125,
                ratio: 4.0,
                attack_ms: 5.0,
                release_ms: 60.0,
            },
            eq: EqBand {
                frequency_hz: 1_200,
                width_hz: 400,
                gain_db: 3.0,
            },
            echo: Echo {
                in_gain: 0.8,
                out_gain: 0.85,
                delay_ms: 45,
                decay: 0.25,
            },
        }
    }
}

impl EffectChain {
    /// Renders the chain as one ffmpeg `-af` filter graph.
    ///
    /// Order: pitch shift, resample, tempo, band-pass, compression, EQ, echo.
    pub fn filter_graph(&self) -> String {
        let shifted_rate = (self.sample_rate as f32 * self.pitch).round() as u32;
        let atempo = self.tempo / self.pitch;
        let c = &self.compressor;
        let eq = &self.eq;
        let echo = &self.echo;
        [
            format!("asetrate={shifted_rate}"),
            format!("aresample={}", self.sample_rate),
            format!("atempo={atempo:.4}"),
            format!("highpass=f={}", self.highpass_hz),
            format!("lowpass=f={}", self.lowpass_hz),
            format!(
                "acompressor=threshold={:.4}:ratio={}:attack={}:release={}",
                c.threshold, c.ratio, c.attack_ms, c.release_ms
            ),
            format!(
                "equalizer=f={}:width_type=h:width={}:g={}",
                eq.frequency_hz, eq.width_hz, eq.gain_db
            ),
            format!(
                "aecho={}:{}:{}:{}",
                echo.in_gain, echo.out_gain, echo.delay_ms, echo.decay
            ),
        ]
        .join(",")
    }
}

/// Runs the [`EffectChain`] through an external ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegVoiceEffect {
    tool: PathBuf,
    chain: EffectChain,
    /// Container extension of the audio, e.g. `mp3`. ffmpeg picks the muxer from it.
    format: String,
    timeout: Duration,
}

impl FfmpegVoiceEffect {
    pub fn new(tool: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            chain: EffectChain::default(),
            format: format.into(),
            timeout: DEFAULT_EFFECT_TIMEOUT,
        }
    }

    pub fn with_chain(mut self, chain: EffectChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn tool_name(&self) -> String {
        self.tool.display().to_string()
    }
}

#[async_trait]
impl AudioPostProcessor for FfmpegVoiceEffect {
    async fn process(&self, audio: Bytes) -> Result<Bytes, VoiceEffectError> {
        let scratch = tempfile::Builder::new().prefix("panda-voice-").tempdir()?;
        let input = scratch.path().join(format!("input.{}", self.format));
        let output = scratch.path().join(format!("output.{}", self.format));
        tokio::fs::write(&input, &audio).await?;

        let graph = self.chain.filter_graph();
        debug!(tool = %self.tool.display(), filter = %graph, "Applying voice effect");

        let child = Command::new(&self.tool)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&input)
            .arg("-af")
            .arg(&graph)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VoiceEffectError::Spawn {
                tool: self.tool_name(),
                source,
            })?;

        let finished = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VoiceEffectError::Timeout {
                tool: self.tool_name(),
                timeout: self.timeout,
            })??;

        if !finished.status.success() {
            return Err(VoiceEffectError::ToolFailed {
                tool: self.tool_name(),
                status: finished.status,
                stderr: String::from_utf8_lossy(&finished.stderr).trim().to_string(),
            });
        }

        let processed = tokio::fs::read(&output).await?;
        if processed.is_empty() {
            return Err(VoiceEffectError::EmptyOutput);
        }
        Ok(Bytes::from(processed))
    }
}
