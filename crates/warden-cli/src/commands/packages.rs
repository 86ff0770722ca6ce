//! Installed package commands: list, info, enable, disable, uninstall.

use warden_core::PackageId;

use crate::context::App;
use crate::theme::Theme;

pub(crate) fn parse_id(raw: &str) -> anyhow::Result<PackageId> {
    Ok(PackageId::new(raw.trim().to_ascii_lowercase())?)
}

pub(crate) async fn list(app: &App) -> anyhow::Result<()> {
    let packages = app.registry.list().await;
    if packages.is_empty() {
        println!("{}", Theme::info("No packages installed"));
        return Ok(());
    }

    println!("{}", Theme::header("Installed Packages"));
    println!(
        "  {:<32} {:<24} {:<10} STATE",
        "ID", "NAME", "VERSION"
    );
    println!("{}", Theme::separator());
    for p in &packages {
        println!(
            "  {:<32} {:<24} {:<10} {}",
            p.id,
            truncate(&p.name, 24),
            truncate(&p.version, 10),
            Theme::enabled(p.enabled)
        );
    }
    println!(
        "\n{}",
        Theme::dimmed(&format!("{} package(s)", packages.len()))
    );
    Ok(())
}

pub(crate) async fn info(app: &App, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let Some(record) = app.registry.get_details(&id).await else {
        anyhow::bail!("package {id} is not installed");
    };
    let summary = record.summary();

    println!("{}", Theme::header(&summary.name));
    println!("{}", Theme::kv("ID", &Theme::package_id(id.as_str())));
    println!("{}", Theme::kv("Version", &summary.version));
    println!("{}", Theme::kv("State", &Theme::enabled(summary.enabled)));
    if !summary.description.is_empty() {
        println!("{}", Theme::kv("Description", &summary.description));
    }
    println!("{}", Theme::kv("Source", &record.provenance.to_string()));
    println!("{}", Theme::kv("Installed", &Theme::timestamp(&record.installed_at)));
    println!(
        "{}",
        Theme::kv("Path", &record.storage_path.display().to_string())
    );
    if let Some(meta) = &record.metadata {
        println!("{}", Theme::kv("Publisher", &meta.publisher));
        println!("{}", Theme::kv("Rating", &meta.rating));
        println!("{}", Theme::kv("Users", &meta.user_count));
    }
    if !summary.permissions.is_empty() {
        println!("{}", Theme::kv("Requested", &summary.permissions.join(", ")));
    }
    let granted: Vec<&str> = record
        .granted_capabilities
        .iter()
        .map(String::as_str)
        .collect();
    println!(
        "{}",
        Theme::kv(
            "Granted",
            &if granted.is_empty() {
                Theme::dimmed("none")
            } else {
                granted.join(", ")
            }
        )
    );
    println!(
        "{}",
        Theme::kv("CSP", &app.policy.content_security_policy(&id))
    );
    Ok(())
}

pub(crate) async fn set_enabled(app: &App, id: &str, enabled: bool) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let changed = if enabled {
        app.registry.enable(&id).await?
    } else {
        app.registry.disable(&id).await?
    };
    let state = if enabled { "enabled" } else { "disabled" };
    if changed {
        println!("{}", Theme::success(&format!("Package {id} {state}")));
    } else {
        println!("{}", Theme::info(&format!("Package {id} already {state}")));
    }
    Ok(())
}

pub(crate) async fn uninstall(app: &App, id: &str, yes: bool) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let Some(record) = app.registry.get_details(&id).await else {
        anyhow::bail!("package {id} is not installed");
    };

    if !yes {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Uninstall {} ({id})?",
                record.manifest.display_name()
            ))
            .default(false)
            .interact()?;
        if !confirm {
            println!("{}", Theme::info("Aborted."));
            return Ok(());
        }
    }

    let (_, dropped) = app.broker.uninstall(&id).await?;
    if dropped > 0 {
        println!(
            "{}",
            Theme::dimmed(&format!("Dropped {dropped} pending request(s)"))
        );
    }
    println!(
        "{}",
        Theme::success(&format!("Uninstalled {}", record.manifest.display_name()))
    );
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
