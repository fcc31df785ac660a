//! Composite Identifier Codec
//!
//! The array joins compound keys with `-+-`: system names
//! (`SYMMETRIX-+-000196701380`), group and view instance IDs
//! (`SYMMETRIX-+-000196701380-+-sg1`), front-end port identities
//! (`SYMMETRIX-+-000196701380-+-FA-1D-4`) and hardware IDs
//! (`W-+-10000000C94E5D22`). Inside a port identity the director and port
//! number are separated by the final `-`.

use crate::domain::model::HardwareIdType;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

pub const DELIMITER: &str = "-+-";
pub const PORT_SEPARATOR: char = '-';
pub const SYMMETRIX: &str = "SYMMETRIX";

// =============================================================================
// Generic Codec
// =============================================================================

/// Join parts with the primary delimiter
///
/// Fails if any part is empty or contains the delimiter itself, since such a
/// key could not be decoded back to the same parts.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> Result<String> {
    if parts.is_empty() {
        return Err(Error::Format("cannot encode an empty identifier".into()));
    }
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            return Err(Error::Format("identifier parts must not be empty".into()));
        }
        if part.contains(DELIMITER) {
            return Err(Error::Format(format!(
                "identifier part {:?} contains the delimiter {:?}",
                part, DELIMITER
            )));
        }
    }
    let parts: Vec<&str> = parts.iter().map(|part| part.as_ref()).collect();
    let joined = parts.join(DELIMITER);
    // A part ending in `-+` pulls the next delimiter one character left
    let splits_back = decode(&joined).map_or(false, |decoded| {
        decoded.len() == parts.len()
            && decoded.iter().zip(&parts).all(|(d, p)| d == p)
    });
    if !splits_back {
        return Err(Error::Format(format!(
            "identifier {:?} would not split back into its parts",
            joined
        )));
    }
    Ok(joined)
}

/// Split on the primary delimiter
pub fn decode(s: &str) -> Result<Vec<String>> {
    if s.is_empty() {
        return Err(Error::Format("empty identifier".into()));
    }
    let parts: Vec<String> = s.split(DELIMITER).map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(Error::Format(format!("identifier {:?} has an empty segment", s)));
    }
    Ok(parts)
}

fn decode_exact(s: &str, expected: usize, what: &str) -> Result<Vec<String>> {
    let parts = decode(s)?;
    if parts.len() != expected {
        return Err(Error::Format(format!(
            "{} {:?} has {} segments, expected {}",
            what,
            s,
            parts.len(),
            expected
        )));
    }
    Ok(parts)
}

fn system_id_of(prefix: &str, system_id: String, s: &str) -> Result<String> {
    if prefix != SYMMETRIX {
        return Err(Error::Format(format!(
            "{:?} does not start with {}",
            s, SYMMETRIX
        )));
    }
    Ok(system_id)
}

// =============================================================================
// System Names
// =============================================================================

/// Full system name for a system ID, e.g. `SYMMETRIX-+-000196701380`
pub fn system_name(system_id: &str) -> Result<String> {
    encode(&[SYMMETRIX, system_id])
}

/// Recover the system ID from a full system name
pub fn parse_system_name(name: &str) -> Result<String> {
    let mut parts = decode_exact(name, 2, "system name")?.into_iter();
    let (prefix, system_id) = (parts.next(), parts.next());
    match (prefix, system_id) {
        (Some(prefix), Some(system_id)) => system_id_of(&prefix, system_id, name),
        _ => Err(Error::Format(format!("malformed system name {:?}", name))),
    }
}

// =============================================================================
// Element Keys
// =============================================================================

/// Instance ID of a system-scoped element: masking group, view or volume
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementKey {
    pub system_id: String,
    pub local_name: String,
}

impl ElementKey {
    pub fn new(system_id: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            local_name: local_name.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        encode(&[SYMMETRIX, &self.system_id, &self.local_name])
    }
}

impl FromStr for ElementKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = decode_exact(s, 3, "element key")?;
        let [prefix, system_id, local_name]: [String; 3] = parts
            .try_into()
            .map_err(|_| Error::Format(format!("malformed element key {:?}", s)))?;
        Ok(Self {
            system_id: system_id_of(&prefix, system_id, s)?,
            local_name,
        })
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}{}", SYMMETRIX, DELIMITER, self.system_id, DELIMITER, self.local_name)
    }
}

// =============================================================================
// Port Keys
// =============================================================================

/// Identity of one front-end director port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortKey {
    pub system_id: String,
    pub director: String,
    pub port: String,
}

impl PortKey {
    pub fn new(
        system_id: impl Into<String>,
        director: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            director: director.into(),
            port: port.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        if self.port.contains(PORT_SEPARATOR) || self.port.is_empty() || self.director.is_empty() {
            return Err(Error::Format(format!(
                "cannot encode director {:?} port {:?}",
                self.director, self.port
            )));
        }
        let segment = format!("{}{}{}", self.director, PORT_SEPARATOR, self.port);
        encode(&[SYMMETRIX, &self.system_id, &segment])
    }
}

impl FromStr for PortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = decode_exact(s, 3, "port key")?;
        let [prefix, system_id, segment]: [String; 3] = parts
            .try_into()
            .map_err(|_| Error::Format(format!("malformed port key {:?}", s)))?;
        let system_id = system_id_of(&prefix, system_id, s)?;
        // Directors such as FA-1D carry their own dash, so split on the last one
        let (director, port) = segment
            .rsplit_once(PORT_SEPARATOR)
            .filter(|(director, port)| !director.is_empty() && !port.is_empty())
            .ok_or_else(|| {
                Error::Format(format!("port segment {:?} has no director-port split", segment))
            })?;
        Ok(Self {
            system_id,
            director: director.to_string(),
            port: port.to_string(),
        })
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}{}{}",
            SYMMETRIX, DELIMITER, self.system_id, DELIMITER, self.director, PORT_SEPARATOR, self.port
        )
    }
}

// =============================================================================
// Hardware ID Keys
// =============================================================================

/// Instance ID of a registered initiator identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HardwareIdKey {
    pub id_type: HardwareIdType,
    /// WWN or IQN
    pub value: String,
}

impl HardwareIdKey {
    pub fn new(id_type: HardwareIdType, value: impl Into<String>) -> Self {
        Self {
            id_type,
            value: value.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        encode(&[self.id_type.key_prefix(), &self.value])
    }

    pub fn wwn(&self) -> Option<&str> {
        (self.id_type == HardwareIdType::Wwn).then_some(self.value.as_str())
    }

    pub fn iqn(&self) -> Option<&str> {
        (self.id_type == HardwareIdType::Iqn).then_some(self.value.as_str())
    }
}

impl FromStr for HardwareIdKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = decode_exact(s, 2, "hardware ID")?;
        let [prefix, value]: [String; 2] = parts
            .try_into()
            .map_err(|_| Error::Format(format!("malformed hardware ID {:?}", s)))?;
        let id_type = match prefix.as_str() {
            "W" => HardwareIdType::Wwn,
            "I" => HardwareIdType::Iqn,
            other => {
                return Err(Error::Format(format!(
                    "unknown hardware ID prefix {:?} in {:?}",
                    other, s
                )))
            }
        };
        Ok(Self { id_type, value })
    }
}

impl fmt::Display for HardwareIdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.id_type.key_prefix(), DELIMITER, self.value)
    }
}
