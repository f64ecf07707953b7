//! FluxForge Array Encoder CLI
//!
//! Usage:
//!   array2sh encode in.wav out.wav   - Encode a multichannel array recording to Ambisonics
//!   array2sh evaluate                - Print encoding diagnostics per band and order
//!   array2sh presets                 - List built-in microphone array presets
//!   array2sh config out.json         - Write encoder settings to a JSON file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rf_array2sh::{
    Array2Sh, ChannelOrdering, EncoderParams, EncoderSettings, FRAME_SIZE, FilterType,
    MicArrayPreset, Normalization,
};

#[derive(Parser)]
#[command(name = "array2sh", about = "Microphone array to spherical harmonic encoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a multichannel array recording to Ambisonics
    Encode {
        /// Input WAV, one channel per sensor
        input: PathBuf,
        /// Output WAV (32-bit float), one channel per SH signal
        output: PathBuf,
        #[command(flatten)]
        options: EncoderOptions,
    },
    /// Print encoding diagnostics per band and order
    Evaluate {
        /// Sample rate the bands are computed for
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
        /// Print every n-th band
        #[arg(long, default_value_t = 8)]
        step: usize,
        #[command(flatten)]
        options: EncoderOptions,
    },
    /// List built-in microphone array presets
    Presets,
    /// Write encoder settings to a JSON file
    Config {
        /// Destination file
        output: PathBuf,
        #[command(flatten)]
        options: EncoderOptions,
    },
}

/// Encoder configuration shared by all subcommands
#[derive(Args)]
struct EncoderOptions {
    /// Load settings from a JSON file (flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Microphone array preset
    #[arg(short, long)]
    preset: Option<String>,
    /// Encoding order
    #[arg(short, long)]
    order: Option<usize>,
    /// Channel ordering (acn, fuma)
    #[arg(long)]
    ordering: Option<String>,
    /// Normalization (n3d, sn3d, fuma)
    #[arg(long)]
    normalization: Option<String>,
    /// Filter type (soft-limiting, tikhonov, z-style, z-style-max-re)
    #[arg(long)]
    filter: Option<String>,
    /// Regularization / maximum gain in dB
    #[arg(long)]
    reg_par: Option<f32>,
    /// Post gain in dB
    #[arg(long)]
    gain: Option<f32>,
    /// Bands at or above this frequency are muted (Hz)
    #[arg(long)]
    max_freq: Option<f32>,
    /// Disable diffuse-field equalisation above the spatial aliasing limit
    #[arg(long)]
    no_diffuse_eq: bool,
}

impl EncoderOptions {
    /// Stage the configuration on `params`
    fn apply(&self, params: &EncoderParams) -> Result<()> {
        if let Some(path) = &self.config {
            let settings = EncoderSettings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            settings.apply(params);
            log::info!("Loaded settings from {}", path.display());
        }

        if let Some(preset) = &self.preset {
            let preset: MicArrayPreset = preset.parse().context("Invalid --preset")?;
            params.set_preset(preset);
        }
        if let Some(order) = self.order {
            params.set_encoding_order(order);
            if params.encoding_order() != order {
                log::warn!("Order {} clamped to {}", order, params.encoding_order());
            }
        }
        if let Some(filter) = &self.filter {
            let filter: FilterType = filter.parse().context("Invalid --filter")?;
            params.set_filter_type(filter);
        }
        if let Some(reg_par) = self.reg_par {
            params.set_reg_par(reg_par);
        }
        if let Some(gain) = self.gain {
            params.set_gain_db(gain);
        }
        if let Some(max_freq) = self.max_freq {
            params.set_max_freq(max_freq);
        }
        if self.no_diffuse_eq {
            params.set_diffuse_eq(false);
        }

        if let Some(ordering) = &self.ordering {
            let ordering: ChannelOrdering = ordering.parse().context("Invalid --ordering")?;
            params.set_channel_ordering(ordering);
            if params.channel_ordering() != ordering {
                bail!("{} ordering is only available at first order", ordering);
            }
        }
        if let Some(normalization) = &self.normalization {
            let normalization: Normalization =
                normalization.parse().context("Invalid --normalization")?;
            params.set_normalization(normalization);
            if params.normalization() != normalization {
                bail!("{} normalization is only available at first order", normalization);
            }
        }

        Ok(())
    }

    /// Configured encoder, reinitialised and ready to process
    fn build_encoder(&self, sample_rate: u32) -> Result<Array2Sh> {
        let mut encoder = Array2Sh::new(sample_rate);
        self.apply(&encoder.params())?;
        if !encoder.check_reinit() {
            bail!("Encoder did not settle after configuration");
        }
        Ok(encoder)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            input,
            output,
            options,
        } => encode(&input, &output, &options),
        Commands::Evaluate {
            sample_rate,
            step,
            options,
        } => evaluate(sample_rate, step, &options),
        Commands::Presets => list_presets(),
        Commands::Config { output, options } => write_config(&output, &options),
    }
}

fn encode(input: &Path, output: &Path, options: &EncoderOptions) -> Result<()> {
    let (channels, sample_rate) = read_wav(input)?;
    let num_samples = channels.first().map_or(0, Vec::len);

    let mut encoder = options.build_encoder(sample_rate)?;
    let params = encoder.params();
    let num_sensors = params.num_sensors();
    let num_sh = params.num_sh_required();

    if channels.len() != num_sensors {
        log::warn!(
            "{} has {} channels, array has {} sensors; missing sensors are silent",
            input.display(),
            channels.len(),
            num_sensors
        );
    }

    log::info!(
        "Encoding {} ({} samples @ {} Hz): {} sensors -> order {} ({} channels), {} / {}",
        input.display(),
        num_samples,
        sample_rate,
        num_sensors,
        params.encoding_order(),
        num_sh,
        params.channel_ordering(),
        params.normalization()
    );

    // Run past the end by the processing delay, then drop the leading delay
    let delay = encoder.processing_delay();
    let total = num_samples + delay;
    let num_frames = total.div_ceil(FRAME_SIZE);

    let mut in_frames = vec![vec![0.0f32; FRAME_SIZE]; channels.len()];
    let mut out_frames = vec![vec![0.0f32; FRAME_SIZE]; num_sh];
    let mut encoded = vec![Vec::with_capacity(num_frames * FRAME_SIZE); num_sh];

    for frame in 0..num_frames {
        let start = frame * FRAME_SIZE;
        for (dst, src) in in_frames.iter_mut().zip(&channels) {
            dst.fill(0.0);
            if start < src.len() {
                let end = (start + FRAME_SIZE).min(src.len());
                dst[..end - start].copy_from_slice(&src[start..end]);
            }
        }

        let inputs: Vec<&[f32]> = in_frames.iter().map(Vec::as_slice).collect();
        let mut outputs: Vec<&mut [f32]> =
            out_frames.iter_mut().map(Vec::as_mut_slice).collect();
        encoder.process(&inputs, &mut outputs, FRAME_SIZE, true);

        for (dst, src) in encoded.iter_mut().zip(&out_frames) {
            dst.extend_from_slice(src);
        }
    }

    let trimmed: Vec<&[f32]> = encoded
        .iter()
        .map(|ch| &ch[delay.min(ch.len())..total.min(ch.len())])
        .collect();
    write_wav(output, &trimmed, sample_rate)?;

    log::info!("Wrote {} channels to {}", num_sh, output.display());
    Ok(())
}

fn evaluate(sample_rate: u32, step: usize, options: &EncoderOptions) -> Result<()> {
    let encoder = options.build_encoder(sample_rate)?;
    let params = encoder.params();
    let diagnostics = encoder.diagnostics();

    if !params.is_evaluation_valid() {
        bail!("Evaluation did not complete");
    }

    println!(
        "array2sh: {} sensors, order {}, filter {}, reg {:.1} dB, {} Hz (designer '{}')",
        params.num_sensors(),
        params.encoding_order(),
        params.filter_type(),
        params.reg_par(),
        sample_rate,
        encoder.designer_name()
    );
    println!();

    let orders = diagnostics.num_orders;
    let mut header = format!("{:>10}", "freq (Hz)");
    for n in 0..orders {
        header.push_str(&format!("  {:>6} {:>8}", format!("cor{}", n), format!("ldiff{}", n)));
    }
    println!("{}", header);

    for (band, freq) in diagnostics
        .freq_vector
        .iter()
        .enumerate()
        .step_by(step.max(1))
    {
        let mut row = format!("{:>10.1}", freq);
        for n in 0..orders {
            row.push_str(&format!(
                "  {:>6.3} {:>8.2}",
                diagnostics.spatial_correlation[[band, n]],
                diagnostics.level_difference[[band, n]]
            ));
        }
        println!("{}", row);
    }

    Ok(())
}

fn list_presets() -> Result<()> {
    println!(
        "{:<22} {:>7} {:>5} {:>8} {:>11} {:>8}",
        "preset", "sensors", "order", "r (mm)", "array", "c (m/s)"
    );
    for preset in MicArrayPreset::ALL {
        let geo = preset.geometry();
        println!(
            "{:<22} {:>7} {:>5} {:>8.1} {:>11} {:>8.0}",
            preset.as_str(),
            geo.dirs_deg.len(),
            geo.order,
            geo.r * 1000.0,
            geo.array_type.as_str(),
            geo.speed_of_sound
        );
    }
    Ok(())
}

fn write_config(output: &Path, options: &EncoderOptions) -> Result<()> {
    let params = EncoderParams::default();
    options.apply(&params)?;
    EncoderSettings::capture(&params)
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Wrote settings to {}", output.display());
    Ok(())
}

/// Read a WAV file into deinterleaved channels
fn read_wav(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        bail!("{} has no channels", path.display());
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to decode {}", path.display()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to decode {}", path.display()))?
        }
    };

    let num_samples = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(num_samples); num_channels];
    for (i, sample) in samples.into_iter().enumerate() {
        channels[i % num_channels].push(sample);
    }

    Ok((channels, spec.sample_rate))
}

/// Write channels as an interleaved 32-bit float WAV
fn write_wav(path: &Path, channels: &[&[f32]], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let num_samples = channels.iter().map(|ch| ch.len()).min().unwrap_or(0);
    for i in 0..num_samples {
        for ch in channels {
            writer.write_sample(ch[i])?;
        }
    }
    writer.finalize()?;
    Ok(())
}
