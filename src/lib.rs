//! Cluster Trust - Node-local trust and health probing for NimbusWorks Cluster
//!
//! This library is the node-local subsystem a NimbusWorks Cluster node uses
//! to answer two unrelated but equally load-bearing questions:
//!
//! 1. **Is this service actually up right now?** Accounting for the
//!    different behavior of the cluster control tool on bootstrap versus
//!    follower nodes.
//! 2. **Give me a fresh internally-trusted identity.** A new RSA key pair
//!    and X.509 certificate signed by the root CA embedded in the binary.
//!
//! The two components are independent; orchestration that decides *when* to
//! probe or issue lives elsewhere.
//!
//! # Trust Hierarchy
//!
//! ```text
//! NimbusWorks Root CA (embedded, self-signed)
//!   └── Service certificate (CA=false, GUID identity, 10-year validity)
//! ```
//!
//! # Quick Start
//!
//! Issue a certificate:
//!
//! ```no_run
//! use cluster_trust::generate_service_cert::{ServiceCertBuilder, SignaturePolicy};
//! use cluster_trust::trust_root::TrustRoot;
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let root = TrustRoot::shared()?;
//!     let credential = ServiceCertBuilder::new(root, SignaturePolicy::LegacyInterop).build()?;
//!     std::fs::write("service.crt", credential.certificate_pem()?)?;
//!     std::fs::write("service.key", credential.private_key_pem()?)?;
//!     Ok(())
//! }
//! ```
//!
//! Probe a service:
//!
//! ```no_run
//! use cluster_trust::configs::AppConfig;
//! use cluster_trust::service_health::{CtlStatusSource, HealthProber};
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = AppConfig::load_or_default("config.toml")?;
//! let source = CtlStatusSource::new(
//!     &config.control.ctl_path,
//!     Duration::from_secs(config.control.status_timeout_secs),
//! );
//! let prober = HealthProber::new(
//!     &config.control.service_dir,
//!     &config.storage_engine.data_dir,
//!     config.node_role,
//!     Box::new(source),
//! );
//! if prober.should_notify("rabbitmq") {
//!     // restart dependents, fire hooks, ...
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! ## [`trust_root`]
//!
//! The embedded root CA certificate and private key, parsed once per
//! process into a shared [`trust_root::TrustRoot`]. Embedded as compiled-in
//! constants so the trust anchor cannot be swapped at deploy time.
//!
//! ## [`generate_service_cert`]
//!
//! Mints service certificates signed by the embedded root: fresh 2048-bit
//! RSA key, GUID-bearing Common Name, 10-year validity. The serial-number
//! and digest shape is an explicit [`generate_service_cert::SignaturePolicy`]
//! choice because the deployed fleet pins the historical shape
//! (serial `1`, SHA-1).
//!
//! ## [`service_health`]
//!
//! Point-in-time service probing: marker-symlink gating, control-tool exit
//! status, and the direct PID-file check used for the storage engine where
//! the control tool's answer is inconclusive. All probe failures resolve to
//! "unhealthy"; the API is silent booleans, with diagnostics on `tracing`.
//!
//! ## [`configs`]
//!
//! TOML configuration for the paths, timeout, node role, and signature
//! policy, with packaged defaults for every field.

pub mod configs;
pub mod generate_service_cert;
pub mod service_health;
pub mod trust_root;
