use std::{future::Future, time::Duration};

use anyhow::Context;
use reqwest::{Certificate, Client, header::CONTENT_TYPE};

use crate::{
    config::{ServerTarget, TlsPolicy},
    reading::Reading,
};

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Destination of the readings.
pub trait ReadingSink {
    /// Delivers one reading and returns the HTTP status code, whatever it is.
    fn send(&self, reading: &Reading) -> impl Future<Output = Result<u16, anyhow::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    device_id: Option<String>,
}

impl HttpTransport {
    pub fn new(
        target: &ServerTarget,
        tls: &TlsPolicy,
        timeout: Duration,
        device_id: Option<String>,
    ) -> Result<Self, anyhow::Error> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .no_proxy();

        if target.use_tls {
            match tls {
                TlsPolicy::CertificateAuthority { ca_cert: Some(path) } => {
                    let pem = std::fs::read(path).with_context(|| {
                        format!("Failed to read CA certificate {}", path.display())
                    })?;
                    let cert = Certificate::from_pem(&pem).with_context(|| {
                        format!("Failed to parse CA certificate {}", path.display())
                    })?;
                    builder = builder.add_root_certificate(cert);
                }
                TlsPolicy::CertificateAuthority { ca_cert: None } | TlsPolicy::ReverseProxy => {}
                TlsPolicy::Insecure => {
                    builder = builder.danger_accept_invalid_certs(true);
                }
            }
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: target.url(),
            device_id,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReadingSink for HttpTransport {
    async fn send(&self, reading: &Reading) -> Result<u16, anyhow::Error> {
        let body = reading.payload(self.device_id.as_deref())?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        Ok(response.status().as_u16())
    }
}
