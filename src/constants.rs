//! Domain constants shared across the engine: customs authorities,
//! webservice types, and the TRACK filing chain ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Customs authority a filing is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    /// Argentina (AFIP)
    Ar,
    /// Paraguay (DNA)
    Py,
}

impl Country {
    /// ISO-3166 alpha-2 code used as the storage representation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ar => "AR",
            Self::Py => "PY",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Country {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AR" => Ok(Self::Ar),
            "PY" => Ok(Self::Py),
            _ => Err(format!("Unknown country code: {s}")),
        }
    }
}

/// Distinct filing a voyage may require. Each (voyage, country, type)
/// combination carries its own independent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebserviceType {
    /// AFIP advance cargo manifest (MIC/DTA) for river transport
    Micdta,
    /// AFIP deconsolidation declaration
    Desconsolidado,
    /// AFIP convoy registration
    Convoy,
    /// DNA Paraguay cargo manifest
    Manifiesto,
}

impl WebserviceType {
    /// Remote service name the authentication ticket is scoped to.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Micdta | Self::Convoy => "wgesregsintia2",
            Self::Desconsolidado => "wgesinformacionanticipada",
            Self::Manifiesto => "tere",
        }
    }
}

impl fmt::Display for WebserviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Micdta => write!(f, "micdta"),
            Self::Desconsolidado => write!(f, "desconsolidado"),
            Self::Convoy => write!(f, "convoy"),
            Self::Manifiesto => write!(f, "manifiesto"),
        }
    }
}

impl std::str::FromStr for WebserviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "micdta" => Ok(Self::Micdta),
            "desconsolidado" => Ok(Self::Desconsolidado),
            "convoy" => Ok(Self::Convoy),
            "manifiesto" => Ok(Self::Manifiesto),
            _ => Err(format!("Unknown webservice type: {s}")),
        }
    }
}

/// Steps of the AFIP filing chain that produce or consume TRACKs.
///
/// The chain is strictly linear: `RegistrarTitEnvios` produces the tokens,
/// `RegistrarMicDta` must consume them before `RegistrarConvoy` may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStep {
    RegistrarTitEnvios,
    RegistrarMicDta,
    RegistrarConvoy,
}

impl ProcessStep {
    /// Position in the filing chain. Consumption must advance this strictly
    /// one position at a time.
    pub fn order(&self) -> u8 {
        match self {
            Self::RegistrarTitEnvios => 0,
            Self::RegistrarMicDta => 1,
            Self::RegistrarConvoy => 2,
        }
    }

    /// Whether this is the last consuming step of the chain.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::RegistrarConvoy)
    }
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrarTitEnvios => write!(f, "registrar_tit_envios"),
            Self::RegistrarMicDta => write!(f, "registrar_micdta"),
            Self::RegistrarConvoy => write!(f, "registrar_convoy"),
        }
    }
}

impl std::str::FromStr for ProcessStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registrar_tit_envios" => Ok(Self::RegistrarTitEnvios),
            "registrar_micdta" => Ok(Self::RegistrarMicDta),
            "registrar_convoy" => Ok(Self::RegistrarConvoy),
            _ => Err(format!("Unknown process step: {s}")),
        }
    }
}

/// Error taxonomy used by the catalog and the dispatcher's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Timeout, connection refused. Retryable until the budget runs out.
    Transport,
    /// Expired or invalid credential. Forces a session refresh plus one
    /// immediate retry outside the backoff budget.
    Authentication,
    /// Malformed outbound payload. Never retryable.
    Validation,
    /// Remote authority rejected on domain grounds. Retryability is
    /// whatever the catalog entry says.
    BusinessRule,
    /// Remote maintenance window. Retryable with longer backoff.
    SystemUnavailable,
    /// Not yet cataloged. Conservative retry.
    Unknown,
}

impl ErrorCategory {
    /// Default retryability when no catalog entry overrides it.
    pub fn default_retryable(&self) -> bool {
        !matches!(self, Self::Validation)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::BusinessRule => write!(f, "business_rule"),
            Self::SystemUnavailable => write!(f, "system_unavailable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(Self::Transport),
            "authentication" => Ok(Self::Authentication),
            "validation" => Ok(Self::Validation),
            "business_rule" => Ok(Self::BusinessRule),
            "system_unavailable" => Ok(Self::SystemUnavailable),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown error category: {s}")),
        }
    }
}

/// Severity attached to catalog entries and transaction log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}
