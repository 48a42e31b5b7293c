//! Firmware update command implementation.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use grefw::session::SETTLE_TIME;
use grefw::{FirmwareImage, UpdateTarget};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use super::{ensure_not_interrupted, open_session, resolve_port, resolve_target};
use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Update command implementation.
pub(crate) fn cmd_update(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    yes: bool,
    wait_secs: u64,
) -> Result<()> {
    let target = resolve_target(cli, config)?;
    let port_name = resolve_port(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }
    let image = FirmwareImage::open(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    check_image(&image, target)?;

    if !cli.quiet {
        let transcode = if target.needs_transcode() {
            format!(" (from {} firmware)", target.firmware)
        } else {
            String::new()
        };
        eprintln!(
            "{} {} bytes for {}{}",
            style("ℹ").blue(),
            image.image_size(),
            style(target.scanner).bold(),
            transcode
        );
    }

    confirm_update(cli, yes, &target)?;

    let mut session = open_session(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Using port {port_name}", style("🔌").cyan());
    }

    session.initialize(SETTLE_TIME).map_err(map_interrupt)?;
    ensure_not_interrupted()?;

    if !session.is_bootloader_active() && !cli.quiet {
        eprintln!(
            "{} Turn the scanner off, then hold the update key combination while powering it on",
            style("⏳").yellow()
        );
    }
    session
        .wait_for_cpu_update_mode(Duration::from_secs(wait_secs))
        .map_err(map_interrupt)
        .context("Scanner did not enter CPU update mode")?;
    if !cli.quiet {
        eprintln!("{} Scanner is in CPU update mode", style("✓").green());
    }

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(u64::from(image.image_size()));
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let result = session.run_update(image, target, &mut |offset, total| {
        pb.set_length(u64::from(total));
        pb.set_position(offset as u64);
    });

    match result {
        Ok(()) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!(
                    "\n{} Firmware update complete",
                    style("🎉").green().bold()
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            Err(map_interrupt(err)).context("Firmware update failed")
        },
    }
}

/// Reject an image that cannot be loaded for `target` before touching the port.
fn check_image(image: &FirmwareImage, target: UpdateTarget) -> Result<()> {
    if image.platform() != target.firmware {
        return Err(CliError::Usage(format!(
            "image contains {} firmware, expected {}",
            image.platform(),
            target.firmware
        ))
        .into());
    }
    Ok(())
}

fn confirm_update(cli: &Cli, yes: bool, target: &UpdateTarget) -> Result<()> {
    if yes {
        return Ok(());
    }
    if cli.non_interactive {
        return Err(CliError::Usage(
            "refusing to update without confirmation in non-interactive mode; pass --yes".to_string(),
        )
        .into());
    }

    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Replace the firmware on the {}? Do not disconnect the scanner until it finishes",
            target.scanner
        ))
        .default(false)
        .interact()
        .map_err(|e| CliError::Cancelled(format!("Prompt failed: {e}")))?;

    if confirmed {
        Ok(())
    } else {
        Err(CliError::Cancelled("Update cancelled".to_string()).into())
    }
}

fn map_interrupt(err: grefw::Error) -> anyhow::Error {
    match err {
        grefw::Error::Interrupted => CliError::Cancelled("Interrupted by user".to_string()).into(),
        other => other.into(),
    }
}
