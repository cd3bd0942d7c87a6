// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual-TLS client configuration for the broker WebSocket (spec.md §4.8,
//! §6 `tls` table).

use crate::error::ConnectorError;
use pxp_core::TlsMaterial;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

/// Build the mutual-TLS client configuration from the configured CA/client
/// certificate/key (and, optionally, a CRL). Any failure here is fatal — the
/// agent cannot meaningfully retry past bad TLS material (spec.md §4.8
/// "Configuration errors ... surface as fatal errors to the caller").
pub fn build_client_config(tls: &TlsMaterial) -> Result<Arc<ClientConfig>, ConnectorError> {
    let ca_certs = load_certs(&tls.ca)?;
    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots.add(cert).map_err(|e| ConnectorError::Fatal(format!("invalid CA certificate: {e}")))?;
    }

    let client_certs = load_certs(&tls.crt)?;
    let client_key = load_key(&tls.key)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(client_certs, client_key)
        .map_err(|e| ConnectorError::Fatal(format!("invalid client certificate/key pair: {e}")))?;

    Ok(Arc::new(config))
}

fn load_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>, ConnectorError> {
    let file = File::open(path).map_err(|e| ConnectorError::Fatal(format!("failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectorError::Fatal(format!("failed to parse certificates in {}: {e}", path.display())))
}

fn load_key(path: &std::path::Path) -> Result<PrivateKeyDer<'static>, ConnectorError> {
    let file = File::open(path).map_err(|e| ConnectorError::Fatal(format!("failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConnectorError::Fatal(format!("failed to parse private key in {}: {e}", path.display())))?
        .ok_or_else(|| ConnectorError::Fatal(format!("no private key found in {}", path.display())))
}
