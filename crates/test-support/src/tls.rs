//! Throwaway mutual-TLS material for in-process cluster tests — a
//! self-signed CA plus two leaf certs, so `cluster-tls`/`cluster-rpc`
//! tests can exercise the real handshake without touching a filesystem
//! key store or a real CA.

use std::io::Write;

use cluster_tls::{NodeIdentity, TlsError};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use tempfile::NamedTempFile;

pub struct MockTlsIdentity {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: String,
}

fn write_pem(pem: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file for mock cert material");
    file.write_all(pem.as_bytes()).expect("write mock cert material");
    file
}

impl MockTlsIdentity {
    /// Materializes this identity as a `NodeIdentity` by round-tripping
    /// through `cluster_tls::identity::load`, so tests exercise the same
    /// PEM-parsing path production code does rather than a shortcut.
    pub fn load(&self) -> Result<NodeIdentity, TlsError> {
        let cert_file = write_pem(&self.cert_pem);
        let key_file = write_pem(&self.key_pem);
        let ca_file = write_pem(&self.ca_pem);
        NodeIdentity::load(cert_file.path(), key_file.path(), ca_file.path(), None)
    }
}

/// Builds a throwaway CA and two leaf certs signed by it, with subject
/// CNs `name_a`/`name_b` — the CN a connection is identified by on the
/// wire (spec §4.C).
pub fn mock_tls_pair(name_a: &str, name_b: &str) -> (MockTlsIdentity, MockTlsIdentity) {
    let mut ca_params = CertificateParams::new(Vec::new()).expect("empty SAN list is always valid");
    let mut ca_name = DistinguishedName::new();
    ca_name.push(DnType::CommonName, "mock-cluster-ca");
    ca_params.distinguished_name = ca_name;
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_key = KeyPair::generate().expect("generate ca key");
    let ca_cert = ca_params.self_signed(&ca_key).expect("self-sign mock ca");
    let ca_pem = ca_cert.pem();

    let leaf = |name: &str| -> MockTlsIdentity {
        let mut params = CertificateParams::new(Vec::new()).expect("empty SAN list is always valid");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        let key = KeyPair::generate().expect("generate leaf key");
        let cert = params.signed_by(&key, &ca_cert, &ca_key).expect("sign mock leaf cert");
        MockTlsIdentity {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            ca_pem: ca_pem.clone(),
        }
    };

    (leaf(name_a), leaf(name_b))
}
