//! Storage maintenance commands: reload, repair, import.

use std::path::Path;

use anyhow::Result;
use console::style;

use dmrelay_core::repository::PersistenceGateway;
use dmrelay_infra::import::read_import_file;

use crate::state::AppState;

pub async fn reload(state: &AppState, json: bool) -> Result<()> {
    let report = state.sync.reload().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    if let Some(repair) = &report.repair {
        println!(
            "  {} Repaired {} user and {} message timestamps",
            style("✓").green(),
            repair.users_fixed,
            repair.messages_fixed
        );
    }
    println!(
        "  {} Loaded {} conversations ({} messages)",
        style("✓").green(),
        style(report.conversations).bold(),
        report.messages
    );
    println!();
    Ok(())
}

pub async fn repair(state: &AppState, json: bool) -> Result<()> {
    let report = state.sync.gateway().run_timestamp_repair().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    if report.users_fixed + report.messages_fixed == 0 {
        println!("  {} All stored timestamps are valid", style("✓").green());
    } else {
        println!(
            "  {} Repaired {} user and {} message timestamps (default {})",
            style("✓").green(),
            style(report.users_fixed).bold(),
            style(report.messages_fixed).bold(),
            report.default_timestamp.display()
        );
    }
    println!();
    Ok(())
}

pub async fn import(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let conversations = read_import_file(file).await?;
    let report = state.sync.gateway().bulk_import(&conversations).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Imported {} users from {}",
        style("✓").green(),
        style(report.users).bold(),
        style(file.display()).cyan()
    );
    println!(
        "  Messages: {} inserted, {} already present",
        report.messages_inserted, report.messages_skipped
    );
    println!();
    Ok(())
}
