//! Scratch database identifiers.
//!
//! An [`Identifier`] is 16 bytes from the OS entropy source rendered as
//! lowercase hex groups joined by underscores, so it can be embedded in an
//! unquoted SQL identifier. It looks like a UUID and carries v4 version bits,
//! but nothing downstream should rely on it parsing as one.

use crate::error::{ScratchError, ScratchResult};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every scratch database name.
pub const DATABASE_PREFIX: &str = "test_";

/// Byte lengths of the hex groups in an identifier.
const GROUP_LENGTHS: [usize; 5] = [4, 2, 2, 2, 6];
const IDENTIFIER_LEN: usize = 36;
const SEPARATOR: char = '_';

/// Unguessable token used as a database name suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Generate an identifier from the OS entropy source.
    pub fn generate() -> ScratchResult<Self> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate an identifier from `rng`.
    ///
    /// Fails with [`ScratchError::Generation`] when the source cannot supply bytes.
    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> ScratchResult<Self> {
        let mut bytes = [0u8; 16];
        rng.try_fill_bytes(&mut bytes)
            .map_err(ScratchError::generation)?;

        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        let token = uuid
            .hyphenated()
            .to_string()
            .replace('-', &SEPARATOR.to_string());
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_well_formed(s: &str) -> bool {
        if s.len() != IDENTIFIER_LEN {
            return false;
        }
        let groups: Vec<&str> = s.split(SEPARATOR).collect();
        groups.len() == GROUP_LENGTHS.len()
            && groups.iter().zip(GROUP_LENGTHS).all(|(group, bytes)| {
                group.len() == bytes * 2
                    && group
                        .chars()
                        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a scratch database: [`DATABASE_PREFIX`] followed by an [`Identifier`].
///
/// Always a valid unquoted Postgres identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Generate a fresh database name.
    pub fn generate() -> ScratchResult<Self> {
        Identifier::generate().map(|id| Self::from_identifier(&id))
    }

    pub fn from_identifier(identifier: &Identifier) -> Self {
        Self(format!("{DATABASE_PREFIX}{identifier}"))
    }

    /// Parse a name previously produced by this crate.
    ///
    /// Rejects anything else, including other databases that merely share the prefix.
    pub fn parse(name: &str) -> ScratchResult<Self> {
        let Some(suffix) = name.strip_prefix(DATABASE_PREFIX) else {
            return Err(ScratchError::invalid_name(
                name,
                format!("scratch database names start with '{DATABASE_PREFIX}'"),
            ));
        };
        if !Identifier::is_well_formed(suffix) {
            return Err(ScratchError::invalid_name(
                name,
                "suffix is not a scratch identifier (expected 8_4_4_4_12 lowercase hex)",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier part of the name.
    pub fn identifier(&self) -> Identifier {
        Identifier(self.0[DATABASE_PREFIX.len()..].to_string())
    }
}

impl FromStr for DatabaseName {
    type Err = ScratchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
