//! Alert record bodies.

use ntls_types::{Alert, AlertDescription, AlertLevel, TlsError};

/// Alert body length: `level(1) || description(1)`.
pub const ALERT_LEN: usize = 2;

/// Decode an alert body. Anything but exactly two bytes, or an unknown level
/// or description, is `illegal_parameter`.
pub fn parse_alert(body: &[u8]) -> Result<Alert, TlsError> {
    if body.len() != ALERT_LEN {
        return Err(TlsError::illegal_parameter(format!(
            "alert body of {} bytes",
            body.len()
        )));
    }
    let level = AlertLevel::from_u8(body[0])
        .map_err(|v| TlsError::illegal_parameter(format!("unknown alert level {v}")))?;
    let description = AlertDescription::from_u8(body[1])
        .map_err(|v| TlsError::illegal_parameter(format!("unknown alert description {v}")))?;
    Ok(Alert { level, description })
}

pub fn encode_alert(alert: Alert) -> Vec<u8> {
    alert.to_bytes().to_vec()
}
