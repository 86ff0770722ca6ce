//! `warden install` and `warden install-local`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use warden_catalog::is_catalog_url;
use warden_installer::{InstallEvent, InstallOptions, InstallOutcome, InstallResult, InstallStage};
use warden_registry::{CapabilityDecision, Resolution};

use crate::context::App;
use crate::theme::Theme;

pub(crate) async fn install(app: &App, source: &str, replace: bool, yes: bool) -> anyhow::Result<()> {
    if !is_catalog_url(source) && Path::new(source).exists() {
        anyhow::bail!("{source} is a local path; use `warden install-local {source}`");
    }
    let installer = app.installer();
    let progress = InstallProgress::new();
    let cancel = cancel_on_ctrl_c();

    let result = installer
        .install(
            source,
            InstallOptions { replace },
            |event| progress.update(event),
            &cancel,
        )
        .await;
    let outcome = progress.finish(result)?;
    report(&outcome);

    if let CapabilityDecision::Pending { request_id, .. } = &outcome.decision {
        if yes {
            match app.broker.resolve_request(*request_id, true).await? {
                Resolution::Approved { granted, .. } => {
                    println!(
                        "{}",
                        Theme::success(&format!("Approved; {} capabilities granted", granted.len()))
                    );
                },
                Resolution::Denied { .. } => {},
            }
        } else {
            println!(
                "{}",
                Theme::info(&format!(
                    "Run `warden approve {request_id}` or `warden deny {request_id}`"
                ))
            );
        }
    }
    Ok(())
}

pub(crate) async fn install_local(app: &App, path: &Path, replace: bool) -> anyhow::Result<()> {
    let installer = app.installer();
    let progress = InstallProgress::new();
    let cancel = cancel_on_ctrl_c();

    let result = installer
        .install_local(
            path,
            InstallOptions { replace },
            |event| progress.update(event),
            &cancel,
        )
        .await;
    let outcome = progress.finish(result)?;
    report(&outcome);

    if let CapabilityDecision::Pending { request_id, .. } = &outcome.decision {
        println!(
            "{}",
            Theme::info(&format!(
                "Run `warden approve {request_id}` or `warden deny {request_id}`"
            ))
        );
    }
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

fn report(outcome: &InstallOutcome) {
    let record = &outcome.record;
    println!(
        "{}",
        Theme::success(&format!(
            "Installed {} {} ({})",
            record.manifest.display_name(),
            record.manifest.display_version(),
            Theme::package_id(record.id.as_str())
        ))
    );
    for warning in &outcome.warnings {
        println!("{}", Theme::warning(warning));
    }

    match &outcome.decision {
        CapabilityDecision::Granted { capabilities } => {
            if !capabilities.is_empty() {
                let list: Vec<&str> = capabilities.iter().map(String::as_str).collect();
                println!("{}", Theme::kv("Granted", &list.join(", ")));
            }
        },
        CapabilityDecision::Pending {
            request_id,
            escalation,
            granted,
        } => {
            if !granted.is_empty() {
                let list: Vec<&str> = granted.iter().map(String::as_str).collect();
                println!("{}", Theme::kv("Granted", &list.join(", ")));
            }
            let pending: Vec<String> = escalation.iter().map(|c| Theme::escalation(c)).collect();
            println!("{}", Theme::kv("Needs approval", &pending.join(", ")));
            println!("{}", Theme::kv("Request", &request_id.to_string()));
        },
    }
    if !record.enabled {
        println!(
            "{}",
            Theme::dimmed(&format!("Package is disabled; run `warden enable {}`", record.id))
        );
    }
}

/// Spinner for the stages, byte bar for the download.
struct InstallProgress {
    bar: ProgressBar,
    bytes_mode: AtomicBool,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .expect("valid spinner template")
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
        .expect("valid progress template")
        .progress_chars("=> ")
}

impl InstallProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            bytes_mode: AtomicBool::new(false),
        }
    }

    fn update(&self, event: InstallEvent) {
        match event {
            InstallEvent::Stage(stage) => {
                if self.bytes_mode.swap(false, Ordering::Relaxed) {
                    self.bar.set_style(spinner_style());
                }
                self.bar.set_message(stage_message(stage));
            },
            InstallEvent::Download(progress) => {
                if !self.bytes_mode.swap(true, Ordering::Relaxed) {
                    self.bar.set_style(bytes_style());
                    self.bar.set_length(progress.total);
                }
                self.bar.set_position(progress.bytes);
            },
        }
    }

    fn finish(self, result: InstallResult<InstallOutcome>) -> anyhow::Result<InstallOutcome> {
        self.bar.finish_and_clear();
        result.map_err(anyhow::Error::new)
    }
}

fn stage_message(stage: InstallStage) -> &'static str {
    match stage {
        InstallStage::Resolve => "Resolving package",
        InstallStage::Download => "Downloading",
        InstallStage::Parse => "Reading container",
        InstallStage::Extract => "Unpacking",
        InstallStage::Validate => "Checking policy",
        InstallStage::Commit => "Committing",
        InstallStage::Grant => "Granting capabilities",
    }
}
