//! Certificate/key loading and CN extraction (spec §4.C: peer identity is
//! the subject CN of the presented client certificate, not a configured
//! endpoint name — a connection is only attributed to an `Endpoint` once
//! its CN matches one).

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};

#[derive(Debug)]
pub enum TlsError {
    Io { path: String, source: std::io::Error },
    NoCertificates(String),
    NoPrivateKey(String),
    Parse(String),
    Rustls(rustls::Error),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io { path, source } => write!(f, "failed to read {path}: {source}"),
            TlsError::NoCertificates(path) => write!(f, "no certificates found in {path}"),
            TlsError::NoPrivateKey(path) => write!(f, "no private key found in {path}"),
            TlsError::Parse(msg) => write!(f, "failed to parse certificate material: {msg}"),
            TlsError::Rustls(e) => write!(f, "tls error: {e}"),
        }
    }
}
impl std::error::Error for TlsError {}
impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        TlsError::Rustls(e)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let data = read(path)?;
    let mut reader = BufReader::new(data.as_slice());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Parse(e.to_string()))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let data = read(path)?;
    let mut reader = BufReader::new(data.as_slice());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::Parse(e.to_string()))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

pub fn load_crl(path: &Path) -> Result<CertificateRevocationListDer<'static>, TlsError> {
    let data = read(path)?;
    let mut reader = BufReader::new(data.as_slice());
    let mut crls = rustls_pemfile::crls(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Parse(e.to_string()))?;
    crls.pop().ok_or_else(|| TlsError::NoCertificates(path.display().to_string()))
}

/// The material this node presents on both sides of the mesh: Icinga2's
/// cluster links are always mutually authenticated, so every node acts as
/// both TLS server and TLS client with the same identity.
pub struct NodeIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: Arc<PrivateKeyDer<'static>>,
    pub ca_certs: Vec<CertificateDer<'static>>,
    pub crl: Option<CertificateRevocationListDer<'static>>,
}

impl NodeIdentity {
    pub fn load(cert_path: &Path, key_path: &Path, ca_path: &Path, crl_path: Option<&Path>) -> Result<Self, TlsError> {
        Ok(NodeIdentity {
            certs: load_certs(cert_path)?,
            key: Arc::new(load_private_key(key_path)?),
            ca_certs: load_certs(ca_path)?,
            crl: crl_path.map(load_crl).transpose()?,
        })
    }
}

/// Extract the subject Common Name from a leaf certificate, the identity
/// `cluster-rpc` maps back onto a configured `Endpoint` name.
pub fn subject_common_name(cert: &CertificateDer<'_>) -> Result<String, TlsError> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
        .map_err(|e| TlsError::Parse(e.to_string()))?;
    parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| TlsError::Parse("certificate has no subject CN".to_owned()))
}
