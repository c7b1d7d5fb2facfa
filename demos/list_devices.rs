//! List audio devices example.
//!
//! Prints every device the system audio host reports, plus the device a
//! pipeline would pick by default and the latency of the default settings.
//!
//! Run with: cargo run --example list_devices

use omega_audio::{DeviceCatalog, PipelineConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let catalog = DeviceCatalog::system();
    let config = PipelineConfig::default();

    println!("{}", catalog.report(&config)?);

    println!("Output devices:");
    for device in catalog.output_devices()? {
        println!("  {device}");
    }

    match catalog.preferred_input() {
        Ok(device) => println!("\nA pipeline would capture from: {}", device.name),
        Err(e) => println!("\nNo usable input: {e}"),
    }

    Ok(())
}
