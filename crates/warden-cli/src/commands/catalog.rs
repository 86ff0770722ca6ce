//! Catalog commands: metadata lookup and the featured list.

use colored::Colorize;
use warden_catalog::{popular_packages, resolve_identifier};
use warden_core::PackageMetadata;

use crate::context::App;
use crate::theme::Theme;

pub(crate) async fn metadata(app: &App, source: &str) -> anyhow::Result<()> {
    let id = resolve_identifier(source)?;
    let meta = match app.catalog.try_fetch_metadata(&id).await {
        Ok(meta) => meta,
        Err(e) => {
            println!("{}", Theme::warning(&format!("Metadata unavailable: {e}")));
            PackageMetadata::fallback(id.clone(), String::new())
        },
    };

    println!("{}", Theme::header(&meta.name));
    println!("{}", Theme::kv("ID", &Theme::package_id(id.as_str())));
    println!("{}", Theme::kv("Version", &meta.version));
    println!("{}", Theme::kv("Publisher", &meta.publisher));
    println!("{}", Theme::kv("Rating", &meta.rating));
    println!("{}", Theme::kv("Users", &meta.user_count));
    println!("{}", Theme::kv("Description", &meta.description));
    if let Some(icon) = &meta.icon_url {
        println!("{}", Theme::kv("Icon", icon));
    }
    if !meta.detail_url.is_empty() {
        println!("{}", Theme::kv("Page", &meta.detail_url));
    }
    Ok(())
}

pub(crate) fn popular() {
    println!("{}", Theme::header("Popular Packages"));
    println!("{}", Theme::separator());
    for p in popular_packages() {
        println!("  {} {}", p.name.bold(), Theme::dimmed(p.id));
        println!("    {}", p.description);
        println!("    {}", Theme::dimmed(p.url));
    }
}
