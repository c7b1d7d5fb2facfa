//! Custom sink example.
//!
//! Demonstrates implementing `PluginSink` and how the pipeline isolates a
//! misbehaving sink. Runs on the mock backend with a generated tone, so no
//! audio hardware is needed.
//!
//! Run with: cargo run --example custom_sink

use std::time::Duration;

use async_trait::async_trait;
use omega_audio::{
    AnalysisFrame, DeviceDescriptor, MockBackend, MockSource, Pipeline, PipelineConfig,
    PluginSink, SinkError,
};

/// Tracks the loudest spectrum bar it has seen.
struct PeakFinder {
    loudest: (f32, f32),
    frames: u64,
}

#[async_trait]
impl PluginSink for PeakFinder {
    fn name(&self) -> &str {
        "peak-finder"
    }

    async fn on_frame(&mut self, frame: &AnalysisFrame) -> Result<(), SinkError> {
        self.frames += 1;
        for (hz, db) in frame.spectrum.bars() {
            if db > self.loudest.1 {
                self.loudest = (hz, db);
            }
        }
        if self.frames % 25 == 0 {
            println!(
                "[{}] {} frames, loudest bar {:.0} Hz at {:.1} dB, {:.1} LUFS integrated",
                self.name(),
                self.frames,
                self.loudest.0,
                self.loudest.1,
                frame.loudness.integrated_lufs
            );
        }
        Ok(())
    }

    async fn on_device_changed(&mut self, device: &DeviceDescriptor) -> Result<(), SinkError> {
        println!("[{}] now listening to {device}", self.name());
        Ok(())
    }
}

/// Blocks its thread after a few frames. The pipeline removes it once its
/// call exceeds the sink timeout.
struct Sleepy {
    frames: u64,
}

#[async_trait]
impl PluginSink for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn on_frame(&mut self, _frame: &AnalysisFrame) -> Result<(), SinkError> {
        self.frames += 1;
        if self.frames == 10 {
            std::thread::sleep(Duration::from_secs(5));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let backend = MockBackend::new();
    let mic = backend.add_input("Demo Mic", 1, &[48000]);
    backend.add_input("Demo Line In", 1, &[48000]);

    let config = PipelineConfig {
        channels: 1,
        ..PipelineConfig::default()
    };
    let period = config.frame_period();
    let frame_length = config.frame_length;

    let mut pipeline = Pipeline::builder()
        .backend(backend.clone())
        .device(mic.id.clone())
        .config(config)
        .add_sink(PeakFinder {
            loudest: (0.0, f32::NEG_INFINITY),
            frames: 0,
        })
        .on_event(|e| println!("event: {e:?}"))
        .start()
        .await?;
    pipeline.register_sink(Sleepy { frames: 0 })?;

    // Feed a 1 kHz tone at real-time pace
    let feeder = backend.clone();
    let tone = tokio::spawn(async move {
        let mut source = MockSource::new(48000, 1);
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            source.generate_sine_frames(1000.0, 0.5, frame_length);
            let samples = source.take_samples();
            // Whichever device is open gets the tone
            let _ = feeder.push_samples(&"Demo Mic".into(), &samples)
                || feeder.push_samples(&"Demo Line In".into(), &samples);
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    pipeline.switch_device(&"Demo Line In".into()).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    tone.abort();
    println!("\n{:#?}", pipeline.stats());
    pipeline.stop().await?;

    Ok(())
}
