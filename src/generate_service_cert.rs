//! Service Certificate Generation Module
//!
//! This module mints identity certificates for cluster-internal services,
//! signed by the embedded NimbusWorks root CA. Each certificate
//! carries a freshly generated GUID in its Common Name, so two services (or
//! two issuances to the same service) never share an identity.
//!
//! # Trust Hierarchy Position
//! ```text
//! NimbusWorks Root CA (embedded, self-signed)
//!   └── Service certificate (signed by Root, CA=false) ← This module
//! ```
//!
//! # Certificate Properties
//! - **Key Size**: RSA 2048-bit, generated per issuance
//! - **Subject**: fixed organizational fields with a GUID-bearing CN
//!   (`URI:http://nimbusworks.io/GUIDS/<uuid>`)
//! - **Issuer**: the embedded root's subject
//! - **Validity**: 10 years from issuance
//! - **Basic Constraints**: CA=false, critical
//! - **Subject Key Identifier**: hash of the new public key
//! - **Serial / Digest**: chosen by [`SignaturePolicy`]; see below
//!
//! # Signature Policy
//! Historically every certificate in the fleet was issued with serial `1`
//! and a SHA-1 signature. Deployed trust-chain consumers depend on that
//! exact shape, so it cannot be changed out from under them, but neither
//! should new deployments inherit it silently. The caller therefore picks a
//! [`SignaturePolicy`] explicitly:
//! [`LegacyInterop`](SignaturePolicy::LegacyInterop) reproduces the
//! historical shape; [`Modern`](SignaturePolicy::Modern) uses a random
//! 128-bit serial and SHA-256.
//!
//! # Example
//! ```rust,no_run
//! use cluster_trust::generate_service_cert::{ServiceCertBuilder, SignaturePolicy};
//! use cluster_trust::trust_root::TrustRoot;
//! # use anyhow::Result;
//! # fn example() -> Result<()> {
//! let root = TrustRoot::shared()?;
//! let credential = ServiceCertBuilder::new(root, SignaturePolicy::LegacyInterop).build()?;
//! let cert_pem = credential.certificate_pem()?;
//! let key_pem = credential.private_key_pem()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectKeyIdentifier};
use openssl::x509::X509;
use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

use crate::trust_root::TrustRoot;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SERVICE_RSA_KEY_SIZE: u32 = 2048;
const SERVICE_VALIDITY_DAYS: u32 = 3650; // 10 years

const SUBJECT_COUNTRY: &str = "US";
const SUBJECT_STATE: &str = "Washington";
const SUBJECT_LOCALITY: &str = "Seattle";
const SUBJECT_ORGANIZATION: &str = "NimbusWorks, Inc.";
const SUBJECT_ORG_UNIT: &str = "Certificate Service";
const GUID_URI_PREFIX: &str = "URI:http://nimbusworks.io/GUIDS/";

/// Serial-number and digest selection for issued certificates.
///
/// There is deliberately no `Default`: whoever constructs the builder must
/// decide whether byte-compatibility with the deployed fleet is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignaturePolicy {
    /// Serial fixed at `1`, SHA-1 digest. Matches every certificate the
    /// fleet has ever issued; required while deployed consumers pin the
    /// historical shape. The shared serial means serials are NOT a
    /// uniqueness guarantee under this policy; identity lives in the CN.
    LegacyInterop,
    /// Random 128-bit serial, SHA-256 digest. Breaks compatibility with
    /// consumers that expect the historical shape.
    Modern,
}

/// Builder for generating RSA key pairs and service certificates signed by
/// the embedded root CA.
///
/// Unlike a general-purpose CSR flow, the subject is fixed by fleet policy;
/// the only per-issuance variation is the GUID in the Common Name and the
/// key pair itself.
pub struct ServiceCertBuilder<'a> {
    trust_root: &'a TrustRoot,
    policy: SignaturePolicy,
    validity_days: u32,
}

impl<'a> ServiceCertBuilder<'a> {
    /// Create a builder issuing under `trust_root` with the given policy.
    pub fn new(trust_root: &'a TrustRoot, policy: SignaturePolicy) -> Self {
        Self {
            trust_root,
            policy,
            validity_days: SERVICE_VALIDITY_DAYS,
        }
    }

    /// Override the validity period in days (default: 3650).
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Generate a key pair and a signed service certificate.
    ///
    /// Every failure names the step that failed; a partially built
    /// certificate is never returned. The private key is owned exclusively
    /// by the returned [`IssuedCredential`]; no copy is retained here.
    pub fn build(self) -> Result<IssuedCredential> {
        // Generate RSA key pair for the service
        let rsa = openssl::rsa::Rsa::generate(SERVICE_RSA_KEY_SIZE)
            .map_err(|e| anyhow!("Failed to generate RSA keypair: {}", e))?;

        let private_key =
            PKey::from_rsa(rsa).map_err(|e| anyhow!("Failed to create private key: {}", e))?;

        let cert_guid = Uuid::new_v4();
        let common_name = format!("{}{}", GUID_URI_PREFIX, cert_guid);

        let mut builder =
            X509::builder().map_err(|e| anyhow!("Failed to create X509 builder: {}", e))?;

        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| anyhow!("Failed to set version: {}", e))?;

        let serial = match self.policy {
            SignaturePolicy::LegacyInterop => {
                // The historical fixed serial. Shared by every certificate
                // ever issued under this policy.
                BigNum::from_u32(1).map_err(|e| anyhow!("Failed to create serial: {}", e))?
            }
            SignaturePolicy::Modern => {
                // Random 128-bit (16-byte) serial number
                let mut serial = BigNum::new()?;
                serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
                serial
            }
        };
        let asn1_serial = serial
            .to_asn1_integer()
            .map_err(|e| anyhow!("Failed to encode serial: {}", e))?;
        builder
            .set_serial_number(&asn1_serial)
            .map_err(|e| anyhow!("Failed to set serial number: {}", e))?;

        // Build subject name: fixed organizational fields, GUID-bearing CN
        let mut name_builder = openssl::x509::X509Name::builder()
            .map_err(|e| anyhow!("Failed to create name builder: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COUNTRYNAME, SUBJECT_COUNTRY)
            .map_err(|e| anyhow!("Failed to set country: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::STATEORPROVINCENAME, SUBJECT_STATE)
            .map_err(|e| anyhow!("Failed to set state/province: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::LOCALITYNAME, SUBJECT_LOCALITY)
            .map_err(|e| anyhow!("Failed to set locality: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::ORGANIZATIONNAME, SUBJECT_ORGANIZATION)
            .map_err(|e| anyhow!("Failed to set organization: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::ORGANIZATIONALUNITNAME, SUBJECT_ORG_UNIT)
            .map_err(|e| anyhow!("Failed to set organizational unit: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;

        let subject_name = name_builder.build();

        builder
            .set_subject_name(&subject_name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;

        // Issuer is the embedded root's subject
        builder
            .set_issuer_name(self.trust_root.certificate().subject_name())
            .map_err(|e| anyhow!("Failed to set issuer from root CA: {}", e))?;

        let not_before = openssl::asn1::Asn1Time::days_from_now(0)
            .map_err(|e| anyhow!("Failed to create not_before: {}", e))?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| anyhow!("Failed to set not_before: {}", e))?;

        let not_after = openssl::asn1::Asn1Time::days_from_now(self.validity_days)
            .map_err(|e| anyhow!("Failed to create not_after: {}", e))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| anyhow!("Failed to set not_after: {}", e))?;

        builder
            .set_pubkey(&private_key)
            .map_err(|e| anyhow!("Failed to set public key: {}", e))?;

        // Basic Constraints: CA=false (end-entity certificate)
        let mut bc = BasicConstraints::new();
        bc.critical();
        let bc_extension = bc
            .build()
            .map_err(|e| anyhow!("Failed to build BasicConstraints: {}", e))?;
        builder
            .append_extension(bc_extension)
            .map_err(|e| anyhow!("Failed to add BasicConstraints: {}", e))?;

        // Subject Key Identifier: hash of the new public key
        let ski_extension = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(self.trust_root.certificate()), None))
            .map_err(|e| anyhow!("Failed to build SubjectKeyIdentifier: {}", e))?;
        builder
            .append_extension(ski_extension)
            .map_err(|e| anyhow!("Failed to add SubjectKeyIdentifier: {}", e))?;

        let digest = match self.policy {
            SignaturePolicy::LegacyInterop => MessageDigest::sha1(),
            SignaturePolicy::Modern => MessageDigest::sha256(),
        };
        builder
            .sign(self.trust_root.private_key(), digest)
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;

        Ok(IssuedCredential {
            certificate: builder.build(),
            private_key,
        })
    }
}

/// A freshly issued certificate and its matching private key.
///
/// The key exists nowhere else; persisting or presenting it is entirely the
/// caller's business.
pub struct IssuedCredential {
    certificate: X509,
    private_key: PKey<Private>,
}

impl IssuedCredential {
    /// The signed service certificate.
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// The service's private key.
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Certificate as PEM.
    pub fn certificate_pem(&self) -> Result<Vec<u8>> {
        self.certificate
            .to_pem()
            .map_err(|e| anyhow!("Failed to encode certificate PEM: {}", e))
    }

    /// Private key as PKCS#8 PEM.
    pub fn private_key_pem(&self) -> Result<Vec<u8>> {
        self.private_key
            .private_key_to_pem_pkcs8()
            .map_err(|e| anyhow!("Failed to encode private key PEM: {}", e))
    }
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("certificate", &self.certificate.subject_name())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
