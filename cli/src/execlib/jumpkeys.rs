//! Operator jump keys.
//!
//! There are 36 keys, numbered from 1.  Only some of them mean
//! anything to the exec; the rest may be set but are ignored.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

pub const JUMP_KEY_COUNT: u32 = 36;

/// Keys the exec looks at, with what setting them does.
pub const RECOGNISED: [(u32, &str); 8] = [
    (1, "Display the modify-configuration message before booting"),
    (2, "Produce a partial dump before each boot"),
    (3, "Inhibit auto-recovery; produce a final dump after the first stop"),
    (4, "Reload the system library (catalog LIB$, RUN$ and RLIB$)"),
    (6, "Make dumps full dumps, including main storage"),
    (7, "Solicit TIP initialization and pack recovery or initialization"),
    (9, "On initial boot, do not recover backlog and print queues"),
    (13, "Initialize mass storage on the initial boot (requires jump key 4)"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpKeyError {
    NotANumber(String),
    OutOfRange(u32),
}

impl Display for JumpKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            JumpKeyError::NotANumber(s) => write!(f, "jump key '{s}' is not a number"),
            JumpKeyError::OutOfRange(n) => {
                write!(f, "jump key {n} is not between 1 and {JUMP_KEY_COUNT}")
            }
        }
    }
}

impl Error for JumpKeyError {}

/// A set of jump keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JumpKeys(u64);

impl JumpKeys {
    pub const NONE: JumpKeys = JumpKeys(0);

    fn bit(key: u32) -> Result<u64, JumpKeyError> {
        if (1..=JUMP_KEY_COUNT).contains(&key) {
            Ok(1 << (key - 1))
        } else {
            Err(JumpKeyError::OutOfRange(key))
        }
    }

    pub fn set(&mut self, key: u32) -> Result<(), JumpKeyError> {
        self.0 |= JumpKeys::bit(key)?;
        Ok(())
    }

    /// Out-of-range keys are never set.
    pub fn is_set(self, key: u32) -> bool {
        JumpKeys::bit(key).is_ok_and(|bit| self.0 & bit != 0)
    }

    pub fn keys(self) -> impl Iterator<Item = u32> {
        (1..=JUMP_KEY_COUNT).filter(move |&k| self.is_set(k))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Text for `--help` listing the recognised keys.
    pub fn help() -> String {
        let mut text = String::from("Jump keys:\n");
        for (key, description) in RECOGNISED {
            text.push_str(&format!("  {key:>2}  {description}\n"));
        }
        text
    }
}

impl FromStr for JumpKeys {
    type Err = JumpKeyError;

    /// Parses a comma-separated list such as `2,4,13`.
    fn from_str(s: &str) -> Result<JumpKeys, JumpKeyError> {
        let mut keys = JumpKeys::NONE;
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let key: u32 = item
                .parse()
                .map_err(|_| JumpKeyError::NotANumber(item.to_string()))?;
            keys.set(key)?;
        }
        Ok(keys)
    }
}

impl Display for JumpKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        if self.is_empty() {
            return f.write_str("none");
        }
        let keys: Vec<String> = self.keys().map(|k| k.to_string()).collect();
        f.write_str(&keys.join(","))
    }
}

#[cfg(test)]
mod tests {
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn test_parse() {
        let keys: JumpKeys = "2, 4,13".parse().expect("valid keys");
        assert!(keys.is_set(2));
        assert!(keys.is_set(4));
        assert!(keys.is_set(13));
        assert!(!keys.is_set(3));
        assert_eq!(keys.to_string(), "2,4,13");
        assert_eq!(JumpKeys::NONE.to_string(), "none");
        assert_eq!("".parse::<JumpKeys>(), Ok(JumpKeys::NONE));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("0".parse::<JumpKeys>(), Err(JumpKeyError::OutOfRange(0)));
        assert_eq!("1,37".parse::<JumpKeys>(), Err(JumpKeyError::OutOfRange(37)));
        assert_eq!(
            "1,x".parse::<JumpKeys>(),
            Err(JumpKeyError::NotANumber("x".to_string()))
        );
        assert!(!JumpKeys::NONE.is_set(0));
        assert!(!JumpKeys::NONE.is_set(99));
    }

    #[test]
    fn test_help_mentions_recognised_keys() {
        let help = JumpKeys::help();
        for (key, _) in RECOGNISED {
            assert!(help.contains(&format!("{key:>2}  ")));
        }
    }

    #[proptest]
    fn test_display_parses_back(#[strategy(0u64..(1 << 36))] bits: u64) {
        let keys = JumpKeys(bits);
        let text = keys.to_string();
        let parsed: JumpKeys = if keys.is_empty() {
            JumpKeys::NONE
        } else {
            text.parse().expect("displayed keys parse")
        };
        assert_eq!(parsed, keys);
        assert_eq!(keys.keys().count() as u32, bits.count_ones());
    }
}
