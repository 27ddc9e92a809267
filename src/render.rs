//! Offline rendering: run a script, process blocks, write a WAV
//!
//! Drives the interpreter over a script, then pulls the patch output
//! block by block into a mono 16-bit WAV file.

use std::path::Path;

use tracing::info;

use crate::error::Error;
use crate::patch::PatchConfig;
use crate::script::{Interp, ScriptError};

/// Configuration for rendering audio
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Block size for processing
    pub block_size: usize,
    /// Duration in seconds
    pub duration: f32,
    /// Output gain (0.0 to 1.0)
    pub master_gain: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 64,
            duration: 1.0,
            master_gain: 0.8,
        }
    }
}

/// Statistics about rendered audio
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub sample_count: usize,
    pub peak: f32,
    pub rms: f32,
}

impl RenderStats {
    fn from_samples(samples: &[f32]) -> Self {
        let peak = samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let rms = if samples.is_empty() {
            0.0
        } else {
            (sum_sq / samples.len() as f32).sqrt()
        };
        Self {
            sample_count: samples.len(),
            peak,
            rms,
        }
    }
}

/// What can go wrong while rendering a script.
#[derive(Debug)]
pub enum RenderError {
    Script(ScriptError),
    Output(Error),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Script(e) => write!(f, "{e}"),
            RenderError::Output(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Renderer for VM patch scripts
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Run `script` and render its patch output to memory.
    pub fn render_to_buffer(&self, script: &str) -> Result<Vec<f32>, RenderError> {
        let mut interp = Interp::new(PatchConfig {
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
            ..Default::default()
        });
        interp.eval_script(script).map_err(RenderError::Script)?;

        let Some(out) = interp.core.patch.output() else {
            return Err(RenderError::Output(Error::Render(
                "script set no output (missing 'out'?)".to_string(),
            )));
        };

        let total_samples = (self.config.duration * self.config.sample_rate as f32) as usize;
        let mut samples = Vec::with_capacity(total_samples);

        while samples.len() < total_samples {
            interp.core.patch.process_block();
            let block = interp.core.patch.cables().block(out);
            let take = block.len().min(total_samples - samples.len());
            samples.extend(block[..take].iter().map(|s| s * self.config.master_gain));
        }

        info!("rendered {} samples", samples.len());
        Ok(samples)
    }

    /// Run `script` and write its patch output to a WAV file.
    pub fn render_to_file(
        &self,
        script: &str,
        output_path: &Path,
    ) -> Result<RenderStats, RenderError> {
        let samples = self.render_to_buffer(script)?;
        let stats = RenderStats::from_samples(&samples);
        self.write_wav(output_path, &samples)
            .map_err(RenderError::Output)?;
        Ok(stats)
    }

    /// Write samples to a mono 16-bit WAV file.
    fn write_wav(&self, path: &Path, samples: &[f32]) -> Result<(), Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| Error::Render(format!("failed to create WAV file: {e}")))?;

        for &sample in samples {
            // Clamp to prevent overflow
            let clamped = sample.clamp(-1.0, 1.0);
            let scaled = (clamped * 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| Error::Render(format!("failed to write sample: {e}")))?;
        }

        writer
            .finalize()
            .map_err(|e| Error::Render(format!("failed to finalize WAV: {e}")))?;

        Ok(())
    }
}
