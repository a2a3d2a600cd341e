//! Key pattern matching for `keys`/`scan`.

use glob::Pattern;

use super::error::CoreError;

/// Compiled key pattern. `*` and `?` behave as in Redis globs.
#[derive(Clone, Debug)]
pub struct KeyPattern {
    pattern: Pattern,
    match_all: bool,
}

impl KeyPattern {
    pub fn new(source: &str) -> Result<Self, CoreError> {
        let pattern = Pattern::new(source)
            .map_err(|err| CoreError::InvalidPattern(format!("{source}: {err}")))?;
        Ok(Self {
            pattern,
            match_all: source == "*",
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.match_all || self.pattern.matches(key)
    }
}
