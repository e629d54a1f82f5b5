//! Webhook server TLS policy
//!
//! Resolves the TLS flag values into an ordered list of configuration
//! mutators, applied when the webhook server is built. Version labels and
//! cipher suite names are validated up front so a bad flag kills the process
//! before anything binds; insecure cipher names only warn, matching the
//! long-standing flag contract.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::version::{TLS12, TLS13};
use rustls::{CipherSuite, SupportedProtocolVersion};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::warn;

use metal3_common::Error;

use crate::config::TlsOptions;

/// Version labels accepted by the TLS flags
pub const TLS_SUPPORTED_VERSIONS: &[&str] = &["TLS12", "TLS13"];

/// Cipher suite names resolvable by `--tls-cipher-suites`
///
/// Table mirrors the IANA registry names the flag has always accepted; the
/// insecure column drives the warning, not a rejection.
const CIPHER_SUITES: &[(&str, CipherSuite, bool)] = &[
    // TLS 1.3
    ("TLS_AES_128_GCM_SHA256", CipherSuite::TLS13_AES_128_GCM_SHA256, false),
    ("TLS_AES_256_GCM_SHA384", CipherSuite::TLS13_AES_256_GCM_SHA384, false),
    ("TLS_CHACHA20_POLY1305_SHA256", CipherSuite::TLS13_CHACHA20_POLY1305_SHA256, false),
    // TLS 1.2 preferred
    (
        "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        false,
    ),
    (
        "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        false,
    ),
    (
        "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305",
        CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        false,
    ),
    (
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        false,
    ),
    (
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        false,
    ),
    (
        "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305",
        CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        false,
    ),
    (
        "TLS_RSA_WITH_AES_128_GCM_SHA256",
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        false,
    ),
    (
        "TLS_RSA_WITH_AES_256_GCM_SHA384",
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
        false,
    ),
    // Insecure; accepted with a warning
    (
        "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256",
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256,
        true,
    ),
    (
        "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256",
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
        true,
    ),
    (
        "TLS_RSA_WITH_AES_128_CBC_SHA256",
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
        true,
    ),
    ("TLS_RSA_WITH_3DES_EDE_CBC_SHA", CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA, true),
    ("TLS_RSA_WITH_RC4_128_SHA", CipherSuite::TLS_RSA_WITH_RC4_128_SHA, true),
    (
        "TLS_ECDHE_RSA_WITH_RC4_128_SHA",
        CipherSuite::TLS_ECDHE_RSA_WITH_RC4_128_SHA,
        true,
    ),
    (
        "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA",
        CipherSuite::TLS_ECDHE_ECDSA_WITH_RC4_128_SHA,
        true,
    ),
];

/// A TLS protocol version label resolved from a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersionLabel {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersionLabel {
    /// Resolve a flag label
    pub fn parse(label: &str) -> Result<Self, Error> {
        match label {
            "TLS12" => Ok(Self::Tls12),
            "TLS13" => Ok(Self::Tls13),
            other => Err(Error::InvalidTlsVersion {
                version: other.to_string(),
            }),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Tls12 => "TLS12",
            Self::Tls13 => "TLS13",
        }
    }

    fn protocol(&self) -> &'static SupportedProtocolVersion {
        match self {
            Self::Tls12 => &TLS12,
            Self::Tls13 => &TLS13,
        }
    }
}

/// One deferred change to the webhook server TLS settings
#[derive(Debug, Clone)]
pub enum TlsMutator {
    /// Set the minimum protocol version
    MinVersion(TlsVersionLabel),
    /// Set the maximum protocol version
    MaxVersion(TlsVersionLabel),
    /// Restrict the enabled cipher suites
    CipherSuites(Vec<CipherSuite>),
}

/// The resolved TLS policy for the webhook server
#[derive(Debug, Clone, Default)]
pub struct TlsPolicy {
    /// Mutators in application order
    pub mutators: Vec<TlsMutator>,
    /// Warnings surfaced during resolution (insecure ciphers, ignored flags)
    pub warnings: Vec<String>,
}

/// Resolve the TLS flag values into a policy
///
/// Fails on unknown version labels, an inverted version range, or an
/// unresolvable cipher suite name. Insecure cipher names and cipher lists
/// combined with a TLS 1.3-only range produce warnings instead of errors.
pub fn build_tls_policy(options: &TlsOptions) -> Result<TlsPolicy, Error> {
    let mut policy = TlsPolicy::default();

    let min = TlsVersionLabel::parse(&options.min_version)?;
    let max = TlsVersionLabel::parse(&options.max_version)?;
    if min > max {
        return Err(Error::TlsRangeInverted {
            min: options.min_version.clone(),
            max: options.max_version.clone(),
        });
    }

    policy.mutators.push(TlsMutator::MinVersion(min));
    policy.mutators.push(TlsMutator::MaxVersion(max));

    let mut cipher_flag = options.cipher_suites.as_str();
    if min == TlsVersionLabel::Tls13 && max == TlsVersionLabel::Tls13 && !cipher_flag.is_empty() {
        let msg = "cipher suites should not be set for TLS version 1.3, ignoring ciphers";
        warn!("{msg}");
        policy.warnings.push(msg.to_string());
        cipher_flag = "";
    }

    if !cipher_flag.is_empty() {
        let mut suites = Vec::new();
        for name in cipher_flag.split(',') {
            let name = name.trim();
            let (_, suite, insecure) = CIPHER_SUITES
                .iter()
                .find(|(n, _, _)| *n == name)
                .ok_or_else(|| Error::UnknownCipherSuite {
                    name: name.to_string(),
                })?;
            if *insecure {
                let msg = format!("use of insecure cipher {name:?} detected");
                warn!("{msg}");
                policy.warnings.push(msg);
            }
            suites.push(*suite);
        }
        policy.mutators.push(TlsMutator::CipherSuites(suites));
    }

    Ok(policy)
}

/// Accumulated TLS settings after mutator application
#[derive(Debug, Clone)]
pub struct TlsSettings {
    min: TlsVersionLabel,
    max: TlsVersionLabel,
    ciphers: Option<Vec<CipherSuite>>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            min: TlsVersionLabel::Tls12,
            max: TlsVersionLabel::Tls13,
            ciphers: None,
        }
    }
}

impl TlsSettings {
    /// Apply the policy's mutators in order; last write wins per field
    pub fn from_policy(policy: &TlsPolicy) -> Self {
        let mut settings = Self::default();
        for mutator in &policy.mutators {
            settings.apply(mutator);
        }
        settings
    }

    fn apply(&mut self, mutator: &TlsMutator) {
        match mutator {
            TlsMutator::MinVersion(v) => self.min = *v,
            TlsMutator::MaxVersion(v) => self.max = *v,
            TlsMutator::CipherSuites(suites) => self.ciphers = Some(suites.clone()),
        }
    }

    /// Protocol versions enabled by the min/max range
    pub fn protocol_versions(&self) -> Vec<&'static SupportedProtocolVersion> {
        let mut versions = Vec::new();
        if self.min <= TlsVersionLabel::Tls12 && self.max >= TlsVersionLabel::Tls12 {
            versions.push(TlsVersionLabel::Tls12.protocol());
        }
        if self.max >= TlsVersionLabel::Tls13 {
            versions.push(TlsVersionLabel::Tls13.protocol());
        }
        versions
    }

    /// Build the rustls server configuration from the serving certificate in
    /// `cert_dir` (`tls.crt` / `tls.key`)
    pub fn server_config(&self, cert_dir: &Path) -> Result<rustls::ServerConfig, Error> {
        let cert_path = cert_dir.join("tls.crt");
        let key_path = cert_dir.join("tls.key");

        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(&cert_path)
            .map_err(|e| Error::WebhookTls {
                message: format!("failed to read {}: {e}", cert_path.display()),
            })?
            .collect::<Result<_, _>>()
            .map_err(|e| Error::WebhookTls {
                message: format!("failed to parse {}: {e}", cert_path.display()),
            })?;

        let key = PrivateKeyDer::from_pem_file(&key_path).map_err(|e| Error::WebhookTls {
            message: format!("failed to read {}: {e}", key_path.display()),
        })?;

        let base = rustls::crypto::aws_lc_rs::default_provider();
        let provider = match &self.ciphers {
            Some(allowed) => {
                let cipher_suites: Vec<_> = base
                    .cipher_suites
                    .iter()
                    .copied()
                    .filter(|s| allowed.contains(&s.suite()))
                    .collect();
                if cipher_suites.is_empty() {
                    return Err(Error::WebhookTls {
                        message: "no configured cipher suite is supported by the provider"
                            .to_string(),
                    });
                }
                CryptoProvider {
                    cipher_suites,
                    ..base
                }
            }
            None => base,
        };

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&self.protocol_versions())
            .map_err(|e| Error::WebhookTls {
                message: format!("protocol version selection rejected: {e}"),
            })?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::WebhookTls {
                message: format!("serving certificate rejected: {e}"),
            })?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(min: &str, max: &str, ciphers: &str) -> TlsOptions {
        TlsOptions {
            min_version: min.to_string(),
            max_version: max.to_string(),
            cipher_suites: ciphers.to_string(),
        }
    }

    #[test]
    fn default_range_yields_min_and_max_mutators() {
        let policy = build_tls_policy(&options("TLS12", "TLS13", "")).unwrap();
        assert_eq!(policy.mutators.len(), 2);
        assert!(matches!(
            policy.mutators[0],
            TlsMutator::MinVersion(TlsVersionLabel::Tls12)
        ));
        assert!(matches!(
            policy.mutators[1],
            TlsMutator::MaxVersion(TlsVersionLabel::Tls13)
        ));
        assert!(policy.warnings.is_empty());
    }

    #[test]
    fn unknown_version_label_is_rejected() {
        let err = build_tls_policy(&options("TLS11", "TLS13", "")).unwrap_err();
        assert!(err.to_string().contains("TLS11"));
    }

    #[test]
    fn inverted_range_names_both_versions() {
        let err = build_tls_policy(&options("TLS13", "TLS12", "")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TLS13"));
        assert!(msg.contains("TLS12"));
    }

    #[test]
    fn unknown_cipher_name_is_rejected() {
        let err = build_tls_policy(&options(
            "TLS12",
            "TLS13",
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,NOT_A_SUITE",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("NOT_A_SUITE"));
    }

    #[test]
    fn insecure_cipher_warns_without_failing() {
        let policy = build_tls_policy(&options(
            "TLS12",
            "TLS13",
            "TLS_RSA_WITH_RC4_128_SHA",
        ))
        .unwrap();
        assert_eq!(policy.warnings.len(), 1);
        assert!(policy.warnings[0].contains("TLS_RSA_WITH_RC4_128_SHA"));
        assert!(policy
            .mutators
            .iter()
            .any(|m| matches!(m, TlsMutator::CipherSuites(_))));
    }

    #[test]
    fn tls13_only_range_drops_cipher_flag_with_a_warning() {
        let policy = build_tls_policy(&options(
            "TLS13",
            "TLS13",
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        ))
        .unwrap();
        assert_eq!(policy.warnings.len(), 1);
        assert!(!policy
            .mutators
            .iter()
            .any(|m| matches!(m, TlsMutator::CipherSuites(_))));
    }

    #[test]
    fn mutators_apply_in_order_with_last_write_winning() {
        let policy = TlsPolicy {
            mutators: vec![
                TlsMutator::MinVersion(TlsVersionLabel::Tls12),
                TlsMutator::MaxVersion(TlsVersionLabel::Tls13),
                TlsMutator::MinVersion(TlsVersionLabel::Tls13),
            ],
            warnings: Vec::new(),
        };
        let settings = TlsSettings::from_policy(&policy);
        assert_eq!(settings.protocol_versions().len(), 1);
    }

    #[test]
    fn version_range_selects_protocols() {
        let policy = build_tls_policy(&options("TLS12", "TLS13", "")).unwrap();
        let settings = TlsSettings::from_policy(&policy);
        assert_eq!(settings.protocol_versions().len(), 2);

        let policy = build_tls_policy(&options("TLS13", "TLS13", "")).unwrap();
        let settings = TlsSettings::from_policy(&policy);
        assert_eq!(settings.protocol_versions().len(), 1);
    }
}
