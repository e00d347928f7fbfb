//! Environment-variable configuration helpers (§6), out of scope for the
//! core pipeline but carried as ambient stack so every binary parses
//! config the same way.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid SHARD expression {0:?}, expected \"i/N\" with 1 <= i <= N")]
    InvalidShard(String),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// A store instance's shard assignment: `index` is 0-based internally,
/// parsed from the 1-based `"i/N"` wire format (§6, §4.1 "Sharding").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: u32,
    pub count: u32,
}

impl Default for Shard {
    fn default() -> Self {
        Self { index: 0, count: 1 }
    }
}

impl Shard {
    /// Parse the `SHARD` environment variable format: `"i/N"`, 1-based.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (i, n) = raw
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidShard(raw.to_string()))?;
        let i: u32 = i
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidShard(raw.to_string()))?;
        let n: u32 = n
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidShard(raw.to_string()))?;
        if n == 0 || i == 0 || i > n {
            return Err(ConfigError::InvalidShard(raw.to_string()));
        }
        Ok(Self {
            index: i - 1,
            count: n,
        })
    }

    /// Whether an id belongs to this shard (§3 invariant 7).
    #[must_use]
    pub fn owns(&self, id: u64) -> bool {
        id % u64::from(self.count) == u64::from(self.index)
    }
}

/// Read an environment variable as an integer, falling back to `default`
/// when unset; errors if set but unparseable.
pub fn env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_shard() {
        assert_eq!(Shard::parse("1/1").unwrap(), Shard { index: 0, count: 1 });
        assert_eq!(Shard::parse("2/4").unwrap(), Shard { index: 1, count: 4 });
    }

    #[test]
    fn rejects_malformed_shard() {
        assert!(Shard::parse("0/4").is_err());
        assert!(Shard::parse("5/4").is_err());
        assert!(Shard::parse("abc").is_err());
        assert!(Shard::parse("1/0").is_err());
    }

    #[test]
    fn owns_filters_by_modulus() {
        let shard = Shard::parse("2/3").unwrap();
        assert!(shard.owns(1));
        assert!(shard.owns(4));
        assert!(!shard.owns(0));
        assert!(!shard.owns(2));
    }

    #[test]
    fn env_or_falls_back_to_default() {
        std::env::remove_var("MAILGUN_TEST_MISSING_VAR");
        let value: u64 = env_or("MAILGUN_TEST_MISSING_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
