//! Access keys, locks and permissions.
//!
//! A key is presented by the running activity (it lives in the
//! indicator/key register); a lock belongs to a bank.  The master key
//! (ring 0, domain 0) has every permission.  Otherwise the key gets
//! the bank's special permissions when its ring is lower than the
//! lock's ring or when the domains match, and the general
//! permissions in all other cases.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AccessKey {
    pub ring: u8,
    pub domain: u16,
}

impl AccessKey {
    pub const MASTER: AccessKey = AccessKey { ring: 0, domain: 0 };

    #[must_use]
    pub const fn new(ring: u8, domain: u16) -> AccessKey {
        AccessKey {
            ring: ring & 0o3,
            domain,
        }
    }

    /// Decodes the 18-bit form: ring in the top two bits, domain in
    /// the low sixteen.
    #[must_use]
    pub const fn from_composite(value: u64) -> AccessKey {
        AccessKey {
            ring: ((value >> 16) & 0o3) as u8,
            domain: (value & 0xFFFF) as u16,
        }
    }

    #[must_use]
    pub const fn composite(self) -> u64 {
        ((self.ring as u64 & 0o3) << 16) | self.domain as u64
    }
}

impl Display for AccessKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}:{:o}", self.ring, self.domain)
    }
}

/// A bank's lock has the same shape as a key.
pub type AccessLock = AccessKey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AccessPermissions {
    pub enter: bool,
    pub read: bool,
    pub write: bool,
}

impl AccessPermissions {
    pub const ALL: AccessPermissions = AccessPermissions {
        enter: true,
        read: true,
        write: true,
    };
    pub const NONE: AccessPermissions = AccessPermissions {
        enter: false,
        read: false,
        write: false,
    };

    /// Decodes the three-bit enter/read/write field of a bank
    /// descriptor.
    #[must_use]
    pub const fn from_bits(bits: u64) -> AccessPermissions {
        AccessPermissions {
            enter: bits & 0o4 != 0,
            read: bits & 0o2 != 0,
            write: bits & 0o1 != 0,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        (if self.enter { 0o4 } else { 0 })
            | (if self.read { 0o2 } else { 0 })
            | (if self.write { 0o1 } else { 0 })
    }

    #[must_use]
    pub const fn without_enter(self) -> AccessPermissions {
        AccessPermissions {
            enter: false,
            read: self.read,
            write: self.write,
        }
    }
}

#[must_use]
pub fn effective_permissions(
    key: AccessKey,
    lock: AccessLock,
    general: AccessPermissions,
    special: AccessPermissions,
) -> AccessPermissions {
    if key == AccessKey::MASTER {
        AccessPermissions::ALL
    } else if key.ring < lock.ring || key.domain == lock.domain {
        special
    } else {
        general
    }
}

#[cfg(test)]
mod tests {
    use test_strategy::proptest;

    use super::*;

    const GENERAL: AccessPermissions = AccessPermissions {
        enter: false,
        read: true,
        write: false,
    };
    const SPECIAL: AccessPermissions = AccessPermissions {
        enter: true,
        read: true,
        write: true,
    };

    #[test]
    fn test_master_key_has_everything() {
        let lock = AccessLock::new(3, 0o1234);
        assert_eq!(
            effective_permissions(AccessKey::MASTER, lock, AccessPermissions::NONE, AccessPermissions::NONE),
            AccessPermissions::ALL
        );
    }

    #[test]
    fn test_lower_ring_gets_special() {
        let lock = AccessLock::new(2, 5);
        assert_eq!(effective_permissions(AccessKey::new(1, 7), lock, GENERAL, SPECIAL), SPECIAL);
        assert_eq!(effective_permissions(AccessKey::new(2, 5), lock, GENERAL, SPECIAL), SPECIAL);
        assert_eq!(effective_permissions(AccessKey::new(3, 7), lock, GENERAL, SPECIAL), GENERAL);
        assert_eq!(effective_permissions(AccessKey::new(2, 7), lock, GENERAL, SPECIAL), GENERAL);
    }

    #[test]
    fn test_permission_bits() {
        assert_eq!(AccessPermissions::from_bits(0o5), AccessPermissions { enter: true, read: false, write: true });
        assert_eq!(AccessPermissions::from_bits(0o7).without_enter().bits(), 0o3);
    }

    #[proptest]
    fn composite_key_preserves_fields(#[strategy(0_u8..4)] ring: u8, domain: u16) {
        let key = AccessKey::new(ring, domain);
        assert_eq!(AccessKey::from_composite(key.composite()), key);
        assert!(key.composite() <= 0o777777);
    }
}
