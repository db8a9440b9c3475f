//! The `list` table.

use chrono::Utc;
use sbhub_sandbox::{LifecycleController, SandboxListing};

const DASH: &str = "-";

pub async fn handle_list(controller: &LifecycleController) -> anyhow::Result<()> {
    let rows = controller.list(Utc::now()).await?;

    if rows.is_empty() {
        println!("No sandboxes found.");
        println!("Storage root: {}", controller.storage().root().display());
        return Ok(());
    }

    for line in render_table(&rows) {
        println!("{}", line);
    }
    Ok(())
}

fn ttl_cell(row: &SandboxListing) -> String {
    match row.remaining {
        _ if row.is_expired() => "EXPIRED".to_string(),
        Some(remaining) => sbhub_util::format_remaining(remaining),
        None => DASH.to_string(),
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        value.to_string()
    }
}

/// Header, separator and one line per row.
pub fn render_table(rows: &[SandboxListing]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    let header = format!(
        "{:<24} {:<10} {:<7} {:<10} {:<22} {:<6} {:<12} {}",
        "NAME", "TYPE", "SIZE", "STATUS", "IMAGE", "PORT", "TTL", "PATH"
    );
    lines.push(header);
    lines.push("-".repeat(110));

    for row in rows {
        lines.push(format!(
            "{:<24} {:<10} {:<7} {:<10} {:<22} {:<6} {:<12} {}",
            truncate(&row.name, 24),
            row.kind.as_str(),
            row.size.as_deref().unwrap_or(DASH),
            truncate(&row.status, 10),
            truncate(row.image.as_deref().unwrap_or(DASH), 22),
            row.host_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| DASH.to_string()),
            ttl_cell(row),
            row.storage_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| DASH.to_string()),
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbhub_sandbox::SandboxKind;
    use std::path::PathBuf;
    use std::time::Duration;

    fn row(name: &str, kind: SandboxKind, remaining: Option<Duration>) -> SandboxListing {
        SandboxListing {
            name: name.to_string(),
            kind,
            size: Some("small".to_string()),
            status: "running".to_string(),
            image: Some("alpine:latest".to_string()),
            host_port: None,
            remaining,
            storage_path: Some(PathBuf::from("/srv/sb").join(name)),
        }
    }

    #[test]
    fn test_render_table() {
        let rows = vec![
            row("web", SandboxKind::Active, Some(Duration::from_secs(90 * 60))),
            row("old", SandboxKind::Stateless, Some(Duration::ZERO)),
            SandboxListing {
                size: None,
                image: None,
                status: "Data Only".to_string(),
                ..row("web_snap_v1", SandboxKind::Snapshot, None)
            },
        ];

        let lines = render_table(&rows);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[2].contains("Active") && lines[2].contains("1h 30m"));
        assert!(lines[3].contains("EXPIRED"));
        assert!(lines[4].contains("Snapshot") && lines[4].contains("Data Only"));
        assert!(lines[4].ends_with("/srv/sb/web_snap_v1"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-sandbox-name", 10), "a-very-...");
    }
}
