//! Dotted schema version scalar (`major.minor.patch`).

use crate::db::DbError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// Version reported when nothing was ever installed.
    pub const NONE: Self = Self::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Accepts one to three numeric components; missing ones are zero
/// (`"4"` and `"4.0"` both equal `4.0.0`).
impl FromStr for SchemaVersion {
    type Err = DbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parts = trimmed.split('.').collect::<Vec<_>>();
        if trimmed.is_empty() || parts.len() > 3 {
            return Err(DbError::InvalidVersion(value.to_string()));
        }

        let mut numbers = [0_u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u32>()
                .map_err(|_| DbError::InvalidVersion(value.to_string()))?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaVersion;

    #[test]
    fn parses_partial_versions() {
        assert_eq!("4.0.0".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(4, 0, 0));
        assert_eq!("3.1".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(3, 1, 0));
        assert_eq!(" 2 ".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(2, 0, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<SchemaVersion>().is_err());
        assert!("1.x.0".parse::<SchemaVersion>().is_err());
        assert!("1.2.3.4".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn compares_numerically() {
        let older = "2.10.0".parse::<SchemaVersion>().unwrap();
        let newer = "10.0.0".parse::<SchemaVersion>().unwrap();
        assert!(older < newer);
        assert!(SchemaVersion::NONE < older);
        assert_eq!(newer.to_string(), "10.0.0");
    }
}
