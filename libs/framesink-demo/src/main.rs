// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! FrameSink demo player
//!
//! Drives a `VideoSink` with a synthetic NV12 producer, a software clock and
//! a software device, then logs how many frames made it to the screen.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use framesink::serde_json::json;
use framesink::{
    FrameRate, GpuDevice, InputSample, InterlaceMode, MarkerStatus, MarkerType, MediaType,
    PresentationClock, SampleFlags, SinkConfig, SoftwareClock, SoftwareDevice, StartPosition,
    StreamController, StreamEvent, TextureDescriptor, TextureFormat, TypeNegotiator, VideoSink,
    VideoSubtype,
};
use tracing_appender::non_blocking::WorkerGuard;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "framesink-demo")]
#[command(author, version, about = "Play synthetic frames through a video sink", long_about = None)]
struct Args {
    /// Source frame rate
    #[arg(long, default_value = "30")]
    fps: u32,

    #[arg(long, default_value = "320")]
    width: u32,

    #[arg(long, default_value = "240")]
    height: u32,

    /// Number of frames to deliver
    #[arg(long, default_value = "90")]
    frames: u32,

    /// Deliver interleaved fields, upper field first
    #[arg(long)]
    interlaced: bool,

    /// Playback rate; negative plays in reverse
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    rate: f64,

    /// Directory containing framesink.yaml
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn setup_logging(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log file path {} has no file name", path.display()))?;
            std::fs::create_dir_all(&dir)?;

            let file_appender = tracing_appender::rolling::never(&dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

// ---------------------------------------------------------------------------
// Synthetic producer
// ---------------------------------------------------------------------------

struct Producer {
    device: Arc<SoftwareDevice>,
    width: u32,
    height: u32,
    interval_ns: i64,
    total: u32,
    delivered: u32,
    reverse: bool,
    flags: SampleFlags,
}

impl Producer {
    /// Presentation time of frame `index`, two frames ahead of the clock origin.
    fn timestamp(&self, index: u32) -> i64 {
        let position = if self.reverse {
            self.total - index
        } else {
            index + 2
        };
        position as i64 * self.interval_ns
    }

    /// Where the clock starts so the first frame is two intervals away.
    fn clock_origin(&self) -> i64 {
        if self.reverse {
            (self.total as i64 + 2) * self.interval_ns
        } else {
            0
        }
    }

    fn is_done(&self) -> bool {
        self.delivered >= self.total
    }

    fn next_frame(&mut self) -> Result<InputSample> {
        let index = self.delivered;
        let texture = self.device.create_texture(
            &TextureDescriptor::new(self.width, self.height, TextureFormat::Nv12)
                .with_label("demo-input"),
        )?;

        // Moving luma ramp so consecutive frames differ
        if let Some(mut plane) = texture.write(0) {
            let width = self.width as usize;
            let luma = width * self.height as usize;
            for (offset, byte) in plane.iter_mut().take(luma).enumerate() {
                let x = offset % width;
                *byte = ((x + index as usize * 4) % 256) as u8;
            }
        }

        self.delivered += 1;
        Ok(InputSample::new(texture)
            .with_time(self.timestamp(index))
            .with_duration(self.interval_ns)
            .with_flags(self.flags))
    }
}

fn negotiate(stream: &StreamController, wanted: VideoSubtype) -> Result<VideoSubtype> {
    for index in 0..stream.media_type_count()? {
        let candidate = stream.media_type_by_index(index)?;
        if candidate.subtype == wanted {
            return Ok(candidate.subtype);
        }
    }
    bail!("Sink does not offer {}", wanted)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_file.as_ref())?;

    if args.fps == 0 || args.frames == 0 {
        bail!("--fps and --frames must be positive");
    }

    let config = match &args.config {
        Some(dir) => SinkConfig::load(dir)
            .with_context(|| format!("Failed to load config from {}", dir.display()))?,
        None => SinkConfig::default(),
    };

    let device = Arc::new(SoftwareDevice::new());
    let clock = Arc::new(SoftwareClock::with_description("demo clock".to_string()));
    let sink = VideoSink::new(device.clone(), config)?;
    let stream = sink.stream_by_index(0)?;

    let subtype = negotiate(stream, VideoSubtype::Nv12)?;
    let interlace_mode = if args.interlaced {
        InterlaceMode::FieldInterleavedUpperFirst
    } else {
        InterlaceMode::Progressive
    };
    let frame_rate = FrameRate::new(args.fps, 1);
    let media_type = MediaType::video(subtype, args.width, args.height)
        .with_frame_rate(frame_rate)
        .with_interlace_mode(interlace_mode);
    stream.is_media_type_supported(&media_type)?;
    stream.set_current_media_type(media_type)?;

    let mut producer = Producer {
        device: device.clone(),
        width: args.width,
        height: args.height,
        interval_ns: frame_rate
            .frame_interval_ns()
            .ok_or_else(|| anyhow!("Invalid frame rate {}", frame_rate))?,
        total: args.frames,
        delivered: 0,
        reverse: args.rate < 0.0,
        flags: if args.interlaced {
            SampleFlags::INTERLACED
        } else {
            SampleFlags::empty()
        },
    };

    tracing::info!(
        "Playing {} frames of {}x{} @ {} (rate {}, {})",
        args.frames,
        args.width,
        args.height,
        frame_rate,
        args.rate,
        if args.interlaced { "interlaced" } else { "progressive" }
    );

    sink.set_presentation_clock(Some(clock.clone() as Arc<dyn PresentationClock>))?;
    clock.set_rate(args.rate);
    sink.on_clock_set_rate(args.rate)?;
    clock.start(Some(producer.clock_origin()));
    sink.on_clock_start(StartPosition::At(producer.clock_origin()))?;

    let mut presented = 0u32;
    let mut last_presented: Option<i64> = None;
    let mut errors = 0u32;
    let mut marker_placed = false;
    let idle_limit = Duration::from_secs(5);
    let mut last_activity = Instant::now();

    loop {
        match stream.get_event_timeout(Duration::from_millis(10))? {
            Some(StreamEvent::RequestSample) => {
                last_activity = Instant::now();
                if !producer.is_done() {
                    stream.process_sample(producer.next_frame()?)?;
                } else if !marker_placed {
                    stream.place_marker(
                        MarkerType::EndOfSegment,
                        json!(null),
                        json!({ "frames": producer.total }),
                    )?;
                    marker_placed = true;
                }
            }
            Some(StreamEvent::Marker { context, status }) => {
                tracing::info!("End of segment {} ({:?})", context, status);
                if status == MarkerStatus::Ok {
                    break;
                }
            }
            Some(StreamEvent::DeviceChanged) => tracing::warn!("Device changed"),
            Some(StreamEvent::Error { error }) => {
                errors += 1;
                tracing::warn!("Stream error: {}", error);
            }
            Some(event) => tracing::debug!("Event {:?}", event),
            None => {
                if last_activity.elapsed() > idle_limit {
                    bail!("No sink activity for {:?}", idle_limit);
                }
            }
        }

        if let Some(sample) = stream.lock_presented_sample()? {
            if sample.sample_time != last_presented {
                last_presented = sample.sample_time;
                presented += 1;
            }
        }
    }

    // Let the last scheduled frames come due
    let tail = Duration::from_nanos((producer.interval_ns * 4) as u64)
        .div_f64(args.rate.abs().max(f64::EPSILON));
    let deadline = Instant::now() + tail;
    while Instant::now() < deadline {
        if let Some(sample) = stream.lock_presented_sample()? {
            if sample.sample_time != last_presented {
                last_presented = sample.sample_time;
                presented += 1;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    sink.on_clock_stop()?;
    clock.stop();

    tracing::info!(
        "Delivered {} frames, presented {}, dropped {}, {} blits, {} errors",
        producer.delivered,
        presented,
        producer.delivered.saturating_sub(presented),
        device.blit_count(),
        errors
    );
    tracing::info!("Pool: {:?}", sink.presenter().pool().stats());

    sink.shutdown()?;
    Ok(())
}
