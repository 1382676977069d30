//! rustls configuration derived from [`TlsOptions`].
//!
//! Connectors and acceptors are rebuilt from the options whenever a
//! handshake is started, so certificate files are read at that point.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use tokio_rustls::{
    TlsAcceptor,
    TlsConnector,
    rustls::{
        self,
        CertificateError,
        ClientConfig,
        DigitallySignedStruct,
        RootCertStore,
        ServerConfig,
        SignatureScheme,
        SupportedProtocolVersion,
        client::{
            WebPkiServerVerifier,
            danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        },
        crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature},
        pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    },
};

use crate::{
    error::ConfigError,
    options::{TlsMethod, TlsOptions},
};

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

fn provider() -> Arc<CryptoProvider> { Arc::new(ring::default_provider()) }

fn versions(method: TlsMethod) -> &'static [&'static SupportedProtocolVersion] {
    match method {
        TlsMethod::Any => rustls::ALL_VERSIONS,
        TlsMethod::Tls12 => TLS12_ONLY,
        TlsMethod::Tls13 => TLS13_ONLY,
    }
}

/// Build a client-side connector.
pub(crate) fn connector(tls: &TlsOptions) -> Result<TlsConnector, ConfigError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(versions(tls.method()))?;

    let builder = if tls.validate_cert() {
        let roots = root_store(tls.ca_cert())?;
        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|err| ConfigError::Tls(rustls::Error::General(err.to_string())))?;
        if tls.allow_self_signed() {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(TolerateUnknownIssuer(verifier)))
        } else {
            builder.with_webpki_verifier(verifier)
        }
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
    };

    let config = match (tls.cert(), tls.cert_key()) {
        (Some(cert), Some(key)) => {
            builder.with_client_auth_cert(load_certs(cert)?, load_key(key)?)?
        }
        _ => builder.with_no_client_auth(),
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Build a server-side acceptor from the configured certificate and key.
pub(crate) fn acceptor(tls: &TlsOptions) -> Result<TlsAcceptor, ConfigError> {
    let (Some(cert), Some(key)) = (tls.cert(), tls.cert_key()) else {
        return Err(ConfigError::MissingServerIdentity);
    };
    let config = ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(versions(tls.method()))?
        .with_no_client_auth()
        .with_single_cert(load_certs(cert)?, load_key(key)?)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Name verified against the server certificate.
pub(crate) fn server_name(tls: &TlsOptions, host: &str) -> Result<ServerName<'static>, ConfigError> {
    let name = tls.peer_name().unwrap_or(host);
    ServerName::try_from(name.to_owned()).map_err(|_| ConfigError::InvalidPeerName(name.to_owned()))
}

fn root_store(ca_cert: Option<&Path>) -> Result<RootCertStore, ConfigError> {
    let mut roots = RootCertStore::empty();
    match ca_cert {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let material = |source| ConfigError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(material)?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(material)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let material = |source| ConfigError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(material)?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(material)?
        .ok_or_else(|| ConfigError::MissingPrivateKey(path.to_path_buf()))
}

/// Verifier used when certificate validation is switched off.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Web PKI verification that accepts a lone certificate with an unknown issuer.
#[derive(Debug)]
struct TolerateUnknownIssuer(Arc<WebPkiServerVerifier>);

impl ServerCertVerifier for TolerateUnknownIssuer {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .0
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer))
                if intermediates.is_empty() =>
            {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_verify_schemes()
    }
}
