//! Standalone hardware/engine-availability inspection CLI, grounded on the
//! teacher's `tools/gpu-check` (NVML-based compute-capability probe): kept
//! as a thin `--json`/friendly-output wrapper, now driven by the shared
//! [`rt_core::hardware`] probe and [`rt_core::engine_probe`] availability
//! matrix instead of a bespoke one-off NVML call.

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use rt_core::engine_probe;
use rt_core::hardware;

#[derive(Parser)]
#[command(author, version, about = "inspect local hardware and engine/accelerator availability", long_about = None)]
struct Cli {
    /// Emit machine-readable JSON instead of a friendly summary.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let inventory = hardware::probe();
    let available = engine_probe::available(&inventory);

    if cli.json {
        let pairs: Vec<serde_json::Value> = available
            .iter()
            .map(|(engine, accel)| serde_json::json!({"engine": engine, "accelerator": accel}))
            .collect();
        let report = serde_json::json!({
            "inventory": inventory,
            "available": pairs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Hardware inventory".bold());
    println!(
        "  CPU: {} ({} cores, {} threads, microarch {})",
        inventory.cpu.vendor, inventory.cpu.cores, inventory.cpu.threads, inventory.cpu.microarch
    );
    if inventory.gpus.is_empty() {
        println!("  GPU: none detected");
    }
    for gpu in &inventory.gpus {
        let vram = gpu.vram_bytes.map(|b| format!("{:.1} GB", b as f64 / (1024.0 * 1024.0 * 1024.0))).unwrap_or_else(|| "unknown VRAM".to_string());
        println!("  GPU: {} [{:?}] ({}, {})", gpu.name, gpu.class, gpu.vendor, vram);
    }
    match &inventory.npu {
        Some(npu) => println!("  NPU: {} (driver {})", npu.vendor, npu.driver),
        None => println!("  NPU: none detected"),
    }
    println!("  Capabilities: {}", inventory.capabilities.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(", "));

    println!();
    println!("{}", "Engine x accelerator availability".bold());
    let mut pairs: Vec<_> = available.into_iter().collect();
    pairs.sort_by_key(|(e, a)| (format!("{e:?}"), format!("{a:?}")));
    for (engine, accel) in pairs {
        println!("  {:?} + {:?}", engine, accel);
    }

    Ok(())
}
