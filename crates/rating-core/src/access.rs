//! Access rights checked by the route table
//!
//! Rights are a small bit set. A caller is authorized for an operation when
//! its rights contain every bit the operation requires.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// A set of access rights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessRights(u8);

impl AccessRights {
    /// No rights at all (unauthenticated caller)
    pub const NONE: Self = Self(0);
    /// Read access to stocks and lists
    pub const GENERAL: Self = Self(1 << 0);
    /// Create, update and fetch stocks
    pub const WRITE_STOCKS: Self = Self(1 << 1);
    /// User management
    pub const ADMINISTRATIVE: Self = Self(1 << 7);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every right in `required` is present
    pub const fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for AccessRights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessRights {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
