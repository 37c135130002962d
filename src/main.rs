//! Cluster Trust - operator entry point
//!
//! Thin command-line surface over the library for fleet operators and
//! packaging hooks:
//!
//! ```bash
//! cluster-trust issue [OUT_DIR]     # mint a service certificate + key
//! cluster-trust status <SERVICE>    # control-tool health, exit 0/1
//! cluster-trust notify <SERVICE>    # notification gate, exit 0/1
//! cluster-trust storage-engine      # PID-file check, exit 0/1
//! cluster-trust root-info           # embedded root CA summary
//! ```
//!
//! Probe subcommands print a JSON report on stdout and encode the boolean
//! answer in the exit status, so shell hooks can consume either.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;

use cluster_trust::configs::AppConfig;
use cluster_trust::generate_service_cert::ServiceCertBuilder;
use cluster_trust::service_health::{CtlStatusSource, HealthProber};
use cluster_trust::trust_root::TrustRoot;

const CONFIG_PATH: &str = "/etc/nimbus/cluster-trust.toml";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = AppConfig::load_or_default(CONFIG_PATH).context("Failed to load configuration")?;

    match args.first().map(String::as_str) {
        Some("issue") => issue(&config, args.get(1).map(String::as_str)),
        Some("status") => {
            let service = required_arg(&args, "status <SERVICE>")?;
            let report = build_prober(&config).probe(service);
            let healthy = report.healthy;
            probe_and_exit(healthy, &report)
        }
        Some("notify") => {
            let service = required_arg(&args, "notify <SERVICE>")?;
            let report = build_prober(&config).probe(service);
            let notify = report.enabled && report.healthy;
            probe_and_exit(notify, &report)
        }
        Some("storage-engine") => {
            let prober = build_prober(&config);
            let up = prober.storage_engine_up();
            println!(
                "{}",
                serde_json::json!({
                    "storage_engine_up": up,
                    "pid_file": prober.storage_engine_pid_path(),
                })
            );
            std::process::exit(if up { 0 } else { 1 });
        }
        Some("root-info") => root_info(),
        _ => {
            eprintln!(
                "usage: cluster-trust <issue [OUT_DIR] | status <SERVICE> | notify <SERVICE> | storage-engine | root-info>"
            );
            std::process::exit(2);
        }
    }
}

fn required_arg<'a>(args: &'a [String], usage: &str) -> Result<&'a str> {
    args.get(1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("usage: cluster-trust {}", usage))
}

fn build_prober(config: &AppConfig) -> HealthProber {
    let source = CtlStatusSource::new(
        &config.control.ctl_path,
        Duration::from_secs(config.control.status_timeout_secs),
    );
    HealthProber::new(
        &config.control.service_dir,
        &config.storage_engine.data_dir,
        config.node_role,
        Box::new(source),
    )
}

fn probe_and_exit(answer: bool, report: &cluster_trust::service_health::ProbeReport) -> ! {
    match serde_json::to_string(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode probe report: {}", e),
    }
    std::process::exit(if answer { 0 } else { 1 });
}

fn issue(config: &AppConfig, out_dir: Option<&str>) -> Result<()> {
    let root = TrustRoot::shared().context("Failed to load embedded root CA")?;
    let credential = ServiceCertBuilder::new(root, config.certificate_authority.signature_policy)
        .validity_days(config.certificate_authority.validity_days)
        .build()
        .context("Failed to issue service certificate")?;

    let out_dir = Path::new(out_dir.unwrap_or("."));
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let cert_path = out_dir.join("service.crt");
    let key_path = out_dir.join("service.key");
    std::fs::write(&cert_path, credential.certificate_pem()?)
        .with_context(|| format!("Failed to write {}", cert_path.display()))?;
    std::fs::write(&key_path, credential.private_key_pem()?)
        .with_context(|| format!("Failed to write {}", key_path.display()))?;

    println!("✓ Certificate written to {}", cert_path.display());
    println!("✓ Private key written to {}", key_path.display());
    Ok(())
}

fn root_info() -> Result<()> {
    let root = TrustRoot::shared().context("Failed to load embedded root CA")?;
    let cert = root.certificate();

    println!("=== Embedded Root CA ===");
    println!("Subject:    {:?}", cert.subject_name());
    println!("Not before: {}", cert.not_before());
    println!("Not after:  {}", cert.not_after());
    println!("Key bits:   {}", root.private_key().bits());
    Ok(())
}
