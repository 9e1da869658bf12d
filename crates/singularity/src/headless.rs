//! Offscreen runs on the software device, for machines without a GPU and for
//! quick parameter checks from a terminal.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbaImage;
use renderer::software::SoftwareDevice;
use renderer::{
    FixedTimeSource, FrameOutcome, Pipeline, PipelineOptions, TimeSource, Viewport,
};
use tuning::ParameterSet;

pub struct HeadlessRun {
    pub size: (u32, u32),
    pub frames: u32,
    pub step: Duration,
    pub parameters: ParameterSet,
    pub options: PipelineOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenStats {
    /// Rec. 709 luma averaged over every pixel, in `[0, 1]`.
    pub mean_luminance: f32,
    /// Fraction of pixels with non-zero alpha.
    pub coverage: f32,
}

impl ScreenStats {
    pub fn measure(screen: &RgbaImage) -> Self {
        let count = screen.pixels().len();
        if count == 0 {
            return Self {
                mean_luminance: 0.0,
                coverage: 0.0,
            };
        }
        let mut luminance = 0.0_f64;
        let mut covered = 0_usize;
        for pixel in screen.pixels() {
            let [r, g, b, a] = pixel.0;
            luminance += 0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b);
            if a > 0 {
                covered += 1;
            }
        }
        Self {
            mean_luminance: (luminance / 255.0 / count as f64) as f32,
            coverage: covered as f32 / count as f32,
        }
    }
}

pub fn run(config: HeadlessRun) -> Result<Vec<ScreenStats>> {
    let HeadlessRun {
        size,
        frames,
        step,
        parameters,
        options,
    } = config;

    let mut pipeline = Pipeline::mount(
        SoftwareDevice::new(),
        Viewport::new(size.0, size.1, 1.0),
        parameters,
        options,
    )
    .context("failed to mount software pipeline")?;
    let mut time = FixedTimeSource::new(step);

    tracing::info!(
        width = size.0,
        height = size.1,
        frames,
        step = %humantime::format_duration(step),
        "rendering headless"
    );

    let mut stats = Vec::with_capacity(frames as usize);
    for _ in 0..frames {
        let started = Instant::now();
        let outcome = pipeline
            .render(time.next_delta())
            .context("headless frame failed")?;
        match outcome {
            FrameOutcome::Rendered(report) => {
                let measured = ScreenStats::measure(pipeline.device().screen());
                tracing::info!(
                    frame = report.frame_index,
                    time = report.time.seconds(),
                    luminance = measured.mean_luminance,
                    coverage = measured.coverage,
                    elapsed = %humantime::format_duration(trim_to_micros(started.elapsed())),
                    "frame rendered"
                );
                stats.push(measured);
            }
            FrameOutcome::Skipped(reason) => {
                tracing::warn!(?reason, "frame skipped");
            }
        }
    }

    let device = pipeline.unmount();
    tracing::debug!(draws = device.draw_count(), "headless run finished");
    Ok(stats)
}

fn trim_to_micros(duration: Duration) -> Duration {
    Duration::from_micros(duration.as_micros() as u64)
}
