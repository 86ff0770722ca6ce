//! Capability commands: permissions, revoke, pending, approve, deny.

use warden_registry::{RequestId, Resolution};

use super::packages::parse_id;
use crate::context::App;
use crate::theme::Theme;

pub(crate) async fn show(app: &App, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let granted = app.broker.granted_capabilities(&id).await?;

    println!("{}", Theme::header(&format!("Capabilities of {id}")));
    if granted.is_empty() {
        println!("  {}", Theme::dimmed("none granted"));
    }
    for capability in &granted {
        let label = if app.policy.requires_escalation(capability) {
            Theme::escalation(capability)
        } else {
            capability.clone()
        };
        println!("  {label}");
    }

    let pending: Vec<_> = app
        .broker
        .pending_requests()
        .await?
        .into_iter()
        .filter(|r| r.package_id == id)
        .collect();
    for request in pending {
        println!(
            "{}",
            Theme::warning(&format!(
                "{} awaiting approval: {}",
                request.request_id,
                request.capabilities.join(", ")
            ))
        );
    }
    Ok(())
}

pub(crate) async fn revoke(app: &App, id: &str, capabilities: &[String]) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let scope = if capabilities.is_empty() {
        None
    } else {
        Some(capabilities)
    };
    let left = app.broker.revoke(&id, scope).await?;
    println!(
        "{}",
        Theme::success(&format!(
            "Revoked; {} capabilities remain for {id}",
            left.len()
        ))
    );
    Ok(())
}

pub(crate) async fn pending(app: &App) -> anyhow::Result<()> {
    let requests = app.broker.pending_requests().await?;
    if requests.is_empty() {
        println!("{}", Theme::info("No pending requests"));
        return Ok(());
    }

    println!("{}", Theme::header("Pending Escalation Requests"));
    println!("{}", Theme::separator());
    for r in &requests {
        println!("  {}", r.request_id);
        println!("{}", Theme::kv("Package", &Theme::package_id(r.package_id.as_str())));
        let caps: Vec<String> = r.capabilities.iter().map(|c| Theme::escalation(c)).collect();
        println!("{}", Theme::kv("Capabilities", &caps.join(", ")));
        println!("{}", Theme::kv("Expires", &Theme::timestamp(&r.expires_at)));
    }
    Ok(())
}

pub(crate) async fn resolve(app: &App, request_id: &str, approve: bool) -> anyhow::Result<()> {
    let request_id: RequestId = request_id.parse()?;
    match app.broker.resolve_request(request_id, approve).await? {
        Resolution::Approved {
            package_id,
            granted,
        } => {
            let list: Vec<&str> = granted.iter().map(String::as_str).collect();
            println!(
                "{}",
                Theme::success(&format!("Approved for {package_id}: {}", list.join(", ")))
            );
        },
        Resolution::Denied { package_id } => {
            println!(
                "{}",
                Theme::info(&format!("Denied escalation for {package_id}"))
            );
        },
    }
    Ok(())
}
