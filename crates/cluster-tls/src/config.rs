//! Builds the mutually-authenticated rustls configs used on both ends of
//! a cluster link (spec §4.C). Icinga2 never accepts an unauthenticated
//! peer, so there is no "no client auth" branch here unlike a general
//! purpose TLS server.

use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;

use crate::identity::{NodeIdentity, TlsError};

fn root_store(identity: &NodeIdentity) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    for cert in &identity.ca_certs {
        store.add(cert.clone())?;
    }
    Ok(store)
}

pub fn server_config(identity: &NodeIdentity) -> Result<rustls::ServerConfig, TlsError> {
    let store = Arc::new(root_store(identity)?);
    let mut verifier_builder = WebPkiClientVerifier::builder(store);
    if let Some(crl) = &identity.crl {
        verifier_builder = verifier_builder.with_crls(vec![crl.clone()]);
    }
    let verifier = verifier_builder
        .build()
        .map_err(|e| TlsError::Parse(e.to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.certs.clone(), identity.key.clone_key())?;
    Ok(config)
}

pub fn client_config(identity: &NodeIdentity) -> Result<rustls::ClientConfig, TlsError> {
    let store = root_store(identity)?;
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(store)
        .with_client_auth_cert(identity.certs.clone(), identity.key.clone_key())?;
    Ok(config)
}
