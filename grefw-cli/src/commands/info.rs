//! Firmware info command implementation.

use anyhow::{Context, Result};
use console::style;
use grefw::{FirmwareImage, FirmwareInfo, Platform};
use std::path::Path;

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    let image = FirmwareImage::open(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    let info = image.info();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "path": firmware.display().to_string(),
                "platform": info.platform,
                "platform_code": info.platform.code(),
                "image_size": info.image_size,
                "packet_count": info.packet_count,
                "loadable_on": loadable_on(info.platform),
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_info(firmware, &info);
    Ok(())
}

/// Scanner models that accept this firmware family.
fn loadable_on(platform: Platform) -> Vec<Platform> {
    Platform::ALL
        .into_iter()
        .filter(|model| model.accepted_firmware().contains(&platform))
        .collect()
}

fn print_info(firmware: &Path, info: &FirmwareInfo) {
    println!(
        "{} {}",
        style("Firmware:").bold(),
        firmware.display()
    );
    println!(
        "  {:<14} {} (0x{:02X})",
        "Platform:",
        style(info.platform).cyan(),
        info.platform.code()
    );
    println!("  {:<14} {} bytes", "Image size:", info.image_size);
    println!("  {:<14} {}", "Packets:", info.packet_count);

    let models: Vec<String> = loadable_on(info.platform)
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("  {:<14} {}", "Loadable on:", models.join(", "));
}
