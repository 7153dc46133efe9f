//! Identifiers, selectors and storage words

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Unique identifier of a deployed module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub Uuid);

impl ModuleId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "module:{}", self.0.simple())
    }
}

/// Identity of a caller, admin or dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(pub Uuid);

impl Identity {
    /// Fresh random identity
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Encode into a storage word (low 16 bytes)
    #[must_use]
    pub fn to_word(self) -> Word {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(self.0.as_bytes());
        Word(bytes)
    }

    /// Decode from a storage word; `None` for the zero word
    #[must_use]
    pub fn from_word(word: Word) -> Option<Self> {
        if word.is_zero() {
            return None;
        }
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&word.0[16..]);
        Some(Self(Uuid::from_bytes(raw)))
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "id:{}", self.0.simple())
    }
}

/// Stable address of a dispatcher instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DispatcherAddress(pub Uuid);

impl DispatcherAddress {
    /// Fresh random address
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identity a dispatcher presents when it calls itself
    #[inline]
    #[must_use]
    pub fn identity(self) -> Identity {
        Identity(self.0)
    }
}

impl Default for DispatcherAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DispatcherAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "dispatcher:{}", self.0.simple())
    }
}

/// Fixed-width invocation selector
///
/// Selectors whose first three bytes are `0xFF` are reserved for
/// governance operations intercepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Selector([u8; 4]);

impl Selector {
    /// Invocation without a recognizable selector; always routes to the default entry
    pub const NONE: Self = Self([0; 4]);

    const RESERVED_PREFIX: [u8; 3] = [0xFF, 0xFF, 0xFF];

    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Create from a big-endian integer opcode
    #[inline]
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Reserved governance selector with the given code
    #[inline]
    #[must_use]
    pub const fn reserved(code: u8) -> Self {
        Self([0xFF, 0xFF, 0xFF, code])
    }

    /// Derive from a textual signature (first four bytes of SHA-256)
    #[must_use]
    pub fn from_signature(signature: &str) -> Self {
        let digest = Sha256::digest(signature.as_bytes());
        Self([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Integer value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Check if this is the empty selector
    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Check if this selector is reserved for governance
    #[inline]
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self.0[..3] == Self::RESERVED_PREFIX
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<u32> for Selector {
    fn from(value: u32) -> Self {
        Self::from_u32(value)
    }
}

/// One 32-byte storage slot value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Word(pub [u8; 32]);

impl Word {
    /// All-zero word; the value of every slot never written
    pub const ZERO: Self = Self([0; 32]);

    /// Encode an integer (big-endian, low 8 bytes)
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Decode the low 8 bytes as an integer
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[24..]);
        u64::from_be_bytes(raw)
    }

    /// Check if every byte is zero
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Display for Word {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
