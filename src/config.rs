use std::{net::IpAddr, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, bail, ensure};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "./weight-reporter.toml";
pub const CONFIG_ENV: &str = "WEIGHT_REPORTER_CONFIG";

pub const SSID_ENV: &str = "WEIGHT_REPORTER_WIFI_SSID";
pub const PASSWORD_ENV: &str = "WEIGHT_REPORTER_WIFI_PASSWORD";
pub const HOST_ENV: &str = "WEIGHT_REPORTER_SERVER_HOST";

pub const HTTPS_PORT: u16 = 443;
pub const MAX_SAMPLES: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wifi: NetworkCredentials,
    pub server: ServerTarget,
    #[serde(default)]
    pub tls: TlsPolicy,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkCredentials {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_interface")]
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

/// How the device treats the server certificate. Chosen once at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TlsPolicy {
    /// Validate against the bundled roots, plus an optional extra CA in PEM form.
    CertificateAuthority {
        #[serde(default)]
        ca_cert: Option<PathBuf>,
    },
    /// Accept any certificate. Needed for a self-signed server reached by IP.
    Insecure,
    /// TLS is terminated by a reverse proxy whose certificate is validated.
    ReverseProxy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_data_pin")]
    pub data_pin: u8,
    #[serde(default = "default_clock_pin")]
    pub clock_pin: u8,
    #[serde(default = "default_gain")]
    pub gain: u8,
    #[serde(default = "default_samples")]
    pub samples: usize,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,
    #[serde(default)]
    pub offset: f32,
    #[serde(default)]
    pub tare_on_start: bool,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_port() -> u16 {
    HTTPS_PORT
}

fn default_path() -> String {
    "/weight".to_string()
}

fn default_use_tls() -> bool {
    true
}

fn default_data_pin() -> u8 {
    5
}

fn default_clock_pin() -> u8 {
    6
}

fn default_gain() -> u8 {
    128
}

fn default_samples() -> usize {
    10
}

fn default_scale_factor() -> f32 {
    1.0
}

impl Default for TlsPolicy {
    fn default() -> Self {
        TlsPolicy::CertificateAuthority { ca_cert: None }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            data_pin: default_data_pin(),
            clock_pin: default_clock_pin(),
            gain: default_gain(),
            samples: default_samples(),
            scale_factor: default_scale_factor(),
            offset: 0.0,
            tare_on_start: false,
        }
    }
}

impl Config {
    /// Path of the configuration file, honouring `WEIGHT_REPORTER_CONFIG`.
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Config, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Config::from_toml(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ssid) = lookup(SSID_ENV) {
            self.wifi.ssid = ssid;
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.wifi.password = password;
        }
        if let Some(host) = lookup(HOST_ENV) {
            self.server.host = host;
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        ensure!(!self.wifi.ssid.is_empty(), "WiFi SSID cannot be empty");
        ensure!(
            !self.wifi.interface.is_empty(),
            "Network interface cannot be empty"
        );
        ensure!(!self.server.host.is_empty(), "Server host cannot be empty");
        ensure!(self.server.port != 0, "Server port must be in 1-65535");
        if !self.server.path.starts_with('/') {
            bail!("Server path must start with '/', got {:?}", self.server.path);
        }
        ensure!(self.interval_ms > 0, "Report interval must be positive");
        ensure!(self.request_timeout_ms > 0, "Request timeout must be positive");
        ensure!(
            (1..=MAX_SAMPLES).contains(&self.scale.samples),
            "Scale samples must be in 1-{MAX_SAMPLES}"
        );
        ensure!(
            self.scale.scale_factor.is_finite() && self.scale.scale_factor != 0.0,
            "Scale factor must be finite and non-zero"
        );
        ensure!(self.scale.offset.is_finite(), "Scale offset must be finite");
        ensure!(
            self.scale.data_pin != self.scale.clock_pin,
            "Scale data and clock pins must differ"
        );
        ensure!(
            matches!(self.scale.gain, 32 | 64 | 128),
            "Scale gain must be 32, 64 or 128"
        );
        Ok(())
    }

    /// Combinations that are legal but usually a mistake. The operator's
    /// configuration is trusted; these are only reported.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let target = &self.server;

        if !target.use_tls {
            if target.port == HTTPS_PORT {
                warnings.push(format!(
                    "TLS is disabled but port {HTTPS_PORT} usually expects HTTPS"
                ));
            }
            if self.tls != TlsPolicy::default() {
                warnings.push("TLS is disabled; the tls section is ignored".to_string());
            }
            return warnings;
        }

        match &self.tls {
            TlsPolicy::CertificateAuthority { .. } if target.is_ip_address() => {
                warnings.push(format!(
                    "Certificate validation against raw IP {} usually fails; \
                     consider a domain name or the insecure mode",
                    target.host
                ));
            }
            TlsPolicy::ReverseProxy => {
                if target.is_ip_address() {
                    warnings.push(format!(
                        "Reverse proxy mode expects a domain name, got IP {}",
                        target.host
                    ));
                }
                if target.port != HTTPS_PORT {
                    warnings.push(format!(
                        "Reverse proxy mode expects port {HTTPS_PORT}, got {}",
                        target.port
                    ));
                }
            }
            TlsPolicy::Insecure => {
                warnings.push("Server certificate validation is disabled".to_string());
            }
            TlsPolicy::CertificateAuthority { .. } => {}
        }

        warnings
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ServerTarget {
    pub fn scheme(&self) -> &'static str {
        if self.use_tls { "https" } else { "http" }
    }

    pub fn url(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}{}", self.scheme(), host, self.port, self.path)
    }

    pub fn is_ip_address(&self) -> bool {
        self.host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok()
    }
}

impl std::fmt::Display for TlsPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsPolicy::CertificateAuthority { ca_cert: None } => write!(f, "certificate-authority"),
            TlsPolicy::CertificateAuthority { ca_cert: Some(path) } => {
                write!(f, "certificate-authority ({})", path.display())
            }
            TlsPolicy::Insecure => write!(f, "insecure"),
            TlsPolicy::ReverseProxy => write!(f, "reverse-proxy"),
        }
    }
}
