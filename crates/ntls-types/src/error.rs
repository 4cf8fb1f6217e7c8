use crate::alert::{Alert, AlertDescription, AlertLevel};

/// Failures reported by the cryptographic primitives underneath the record
/// layer and the key exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid iv length")]
    InvalidIvLength,
    #[error("invalid key")]
    InvalidKey,
    #[error("aead: tag verification failed")]
    AeadTagVerifyFail,
    #[error("rsa: verification failed")]
    RsaVerifyFail,
    #[error("rsa: operation failed")]
    RsaOperationFail,
    #[error("ecc: invalid public key")]
    EccInvalidPublicKey,
    #[error("dh: invalid public value")]
    DhInvalidPublicValue,
    #[error("random number generation failed")]
    RandomFail,
}

/// TLS protocol errors.
///
/// Every protocol violation carries the alert that describes it, so the
/// record layer can turn any error into the fatal alert it sends.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Raised locally; `alert` is sent to the peer.
    #[error("{alert}: {message}")]
    Alert { alert: Alert, message: String },
    /// The peer sent a fatal (or unexpected) alert.
    #[error("alert received: {0}")]
    AlertReceived(Alert),
    /// The context was invalidated by an earlier fatal error or close.
    #[error("connection closed")]
    Closed,
    #[error("crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

impl TlsError {
    /// A fatal error carrying `description`.
    pub fn fatal(description: AlertDescription, message: impl Into<String>) -> Self {
        TlsError::Alert {
            alert: Alert::fatal(description),
            message: message.into(),
        }
    }

    pub fn decode_error(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::DecodeError, message)
    }

    pub fn unexpected_message(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::UnexpectedMessage, message)
    }

    pub fn handshake_failure(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::HandshakeFailure, message)
    }

    pub fn bad_record_mac() -> Self {
        Self::fatal(AlertDescription::BadRecordMac, "bad record MAC")
    }

    pub fn illegal_parameter(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::IllegalParameter, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::InternalError, message)
    }

    pub fn insufficient_security(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::InsufficientSecurity, message)
    }

    pub fn protocol_version(message: impl Into<String>) -> Self {
        Self::fatal(AlertDescription::ProtocolVersion, message)
    }

    /// The alert that should be sent to the peer for this error, if any.
    ///
    /// Received alerts and errors on a closed context are never answered.
    pub fn outgoing_alert(&self) -> Option<Alert> {
        match self {
            TlsError::Alert { alert, .. } => Some(*alert),
            TlsError::CryptoError(_) => Some(Alert::fatal(AlertDescription::InternalError)),
            TlsError::AlertReceived(_) | TlsError::Closed => None,
        }
    }

    /// The alert description involved in this error, whichever side raised it.
    pub fn description(&self) -> Option<AlertDescription> {
        match self {
            TlsError::Alert { alert, .. } | TlsError::AlertReceived(alert) => {
                Some(alert.description)
            }
            TlsError::CryptoError(_) => Some(AlertDescription::InternalError),
            TlsError::Closed => None,
        }
    }

    /// Whether this error ends the connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            TlsError::Alert { alert, .. } | TlsError::AlertReceived(alert) => {
                alert.level == AlertLevel::Fatal
            }
            TlsError::CryptoError(_) | TlsError::Closed => true,
        }
    }
}
