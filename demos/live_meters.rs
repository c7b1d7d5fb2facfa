//! Live meters example.
//!
//! Captures from a real input device and prints loudness and spectrum
//! readings until Ctrl-C is pressed.
//!
//! # Usage
//!
//! ```bash
//! # Default input (PipeWire/JACK preferred)
//! cargo run --example live_meters
//!
//! # A specific device with A-weighted RMS
//! cargo run --example live_meters -- "USB Audio CODEC" A
//! ```

use omega_audio::{AnalysisFrame, ChannelSink, Pipeline, PipelineConfig, WeightingMode};
use tokio::sync::mpsc;

/// Print every Nth frame (about 10 lines per second at the defaults).
const PRINT_EVERY: u64 = 10;

fn describe(frame: &AnalysisFrame) -> String {
    let loudness = &frame.loudness;
    let (peak_hz, peak_db) = frame
        .spectrum
        .bars()
        .fold((0.0, f32::NEG_INFINITY), |best, bar| if bar.1 > best.1 { bar } else { best });

    format!(
        "#{:>6} M {:>6.1} S {:>6.1} I {:>6.1} LUFS | TP {:>6.1} dBTP | RMS({}) {:?} | peak {:.0} Hz @ {:.1} dB{}",
        frame.sequence(),
        loudness.momentary_lufs,
        loudness.short_term_lufs,
        loudness.integrated_lufs,
        loudness.max_true_peak_dbtp,
        loudness.weighting,
        loudness
            .weighted_rms_db
            .iter()
            .map(|db| format!("{db:.1}"))
            .collect::<Vec<_>>(),
        peak_hz,
        peak_db,
        if frame.silent { " [SILENT]" } else { "" },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omega_audio=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let device = args.next();
    let weighting: WeightingMode = match args.next() {
        Some(mode) => mode.parse()?,
        None => WeightingMode::K,
    };

    let (tx, mut rx) = mpsc::channel::<AnalysisFrame>(32);

    let mut builder = Pipeline::builder()
        .config(PipelineConfig::default().with_weighting(weighting))
        .add_sink(ChannelSink::with_name("printer", tx))
        .on_event(|e| tracing::warn!(?e, "pipeline event"));
    if let Some(device) = device {
        builder = builder.device(device);
    }

    let pipeline = builder.start().await?;
    println!("Capturing from {} - press Ctrl-C to stop", pipeline.device());

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) if frame.sequence() % PRINT_EVERY == 0 => println!("{}", describe(&frame)),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stats = pipeline.stats();
    pipeline.stop().await?;

    println!("\nFinal stats: {stats:#?}");
    Ok(())
}
