use crate::identity::NetworkIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field separator of the bulk broadcast encoding
pub const SEPARATOR: char = '/';

/// World-space position (x, y, z)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Last reported state of one connected participant
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientPackage {
    pub identity: NetworkIdentity,
    pub position: Position,
}

impl ClientPackage {
    pub fn new(identity: NetworkIdentity, position: Position) -> Self {
        Self { identity, position }
    }
}

/// Payload decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// Frame could not be decoded into a known message or record
    MalformedPayload(String),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Encode one record as `<identity>/<x>/<y>/<z>`.
///
/// Floats use `Display`, which is locale-independent and prints the shortest
/// string that parses back to the same value (`1.0` renders as `1`).
pub fn encode_record(package: &ClientPackage) -> String {
    let p = &package.position;
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        package.identity,
        p.x,
        p.y,
        p.z,
        sep = SEPARATOR
    )
}

/// Decode one `<identity>/<x>/<y>/<z>` line
pub fn decode_record(line: &str) -> Result<ClientPackage, PayloadError> {
    let parts: Vec<&str> = line.split(SEPARATOR).collect();
    if parts.len() != 4 {
        return Err(PayloadError::MalformedPayload(format!(
            "expected 4 fields, got {} in '{}'",
            parts.len(),
            line
        )));
    }

    let identity = NetworkIdentity::parse(parts[0]).map_err(|e| {
        PayloadError::MalformedPayload(format!("invalid identity '{}': {}", parts[0], e))
    })?;

    let mut coords = [0.0f32; 3];
    for (slot, field) in coords.iter_mut().zip(&parts[1..]) {
        *slot = field.parse::<f32>().map_err(|_| {
            PayloadError::MalformedPayload(format!("invalid coordinate '{}'", field))
        })?;
    }

    Ok(ClientPackage {
        identity,
        position: Position::new(coords[0], coords[1], coords[2]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(x: f32, y: f32, z: f32) -> ClientPackage {
        ClientPackage::new(NetworkIdentity::create(), Position::new(x, y, z))
    }

    #[test]
    fn test_encode_integral_floats() {
        let pkg = package(1.0, 2.0, 3.0);
        assert_eq!(encode_record(&pkg), format!("{}/1/2/3", pkg.identity));
    }

    #[test]
    fn test_encode_fractional_and_negative() {
        let pkg = package(-0.5, 12.25, 1e-3);
        assert_eq!(
            encode_record(&pkg),
            format!("{}/-0.5/12.25/0.001", pkg.identity)
        );
    }

    #[test]
    fn test_encode_is_pure() {
        let pkg = package(0.1, 0.2, 0.3);
        assert_eq!(encode_record(&pkg), encode_record(&pkg));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let pkg = package(3.14159, -271.828, 0.000_123);
        let back = decode_record(&encode_record(&pkg)).unwrap();
        assert_eq!(back.identity, pkg.identity);
        assert!((back.position.x - pkg.position.x).abs() < f32::EPSILON);
        assert!((back.position.y - pkg.position.y).abs() < 1e-4);
        assert!((back.position.z - pkg.position.z).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_wrong_field_count() {
        let id = NetworkIdentity::create();
        let result = decode_record(&format!("{}/1/2", id));
        assert!(matches!(result, Err(PayloadError::MalformedPayload(_))));

        let result = decode_record(&format!("{}/1/2/3/4", id));
        assert!(matches!(result, Err(PayloadError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_bad_identity() {
        let result = decode_record("player-one/1/2/3");
        assert!(matches!(result, Err(PayloadError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_bad_coordinate() {
        let id = NetworkIdentity::create();
        let result = decode_record(&format!("{}/1/two/3", id));
        assert!(matches!(result, Err(PayloadError::MalformedPayload(_))));
    }
}
