//! Conversation listing and inspection commands.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use dmrelay_core::repository::PersistenceGateway;

use crate::state::AppState;

/// Longest preview shown in the list table before truncation.
const PREVIEW_CHARS: usize = 50;

pub async fn list_conversations(state: &AppState, json: bool) -> Result<()> {
    let users = state.sync.gateway().fetch_all_users().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!();
        println!(
            "  {} No conversations yet. Import one with: {}",
            style("i").blue().bold(),
            style("dmrelay import <file.json>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("User ID").fg(Color::White),
        Cell::new("Username").fg(Color::White),
        Cell::new("Last Message").fg(Color::White),
        Cell::new("Last Active").fg(Color::White),
    ]);

    for user in &users {
        let last_active = user.last_activity.display();
        let last_active_cell = if user.last_activity.is_plausible() {
            Cell::new(last_active)
        } else {
            Cell::new(last_active).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(&user.user_id).fg(Color::Cyan),
            Cell::new(&user.username),
            Cell::new(preview(&user.last_message)),
            last_active_cell,
        ]);
    }

    println!("{table}");
    Ok(())
}

pub async fn show_conversation(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let Some(conversation) = state.sync.gateway().fetch_conversation(user_id).await? else {
        anyhow::bail!("no conversation for user '{user_id}'");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style("●").green(),
        style(&conversation.username).cyan().bold(),
        style(&conversation.user_id).dim()
    );
    println!(
        "  Last active: {}  Messages: {}",
        conversation.last_activity.display(),
        conversation.messages.len()
    );
    println!();

    for msg in &conversation.messages {
        let who = if msg.from_user {
            style(conversation.username.as_str()).cyan()
        } else {
            style("operator").yellow()
        };
        println!(
            "  {} {}: {}",
            style(msg.timestamp.display()).dim(),
            who,
            msg.content
        );
    }
    println!();
    Ok(())
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
