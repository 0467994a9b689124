//! Small field validators shared by aggregates and request DTOs.

/// Collects validation messages so every problem is reported at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    /// Record `message` when `condition` fails.
    pub fn check(&mut self, condition: bool, message: impl Into<String>) {
        if !condition {
            self.push(message);
        }
    }

    pub fn require_non_empty(&mut self, value: &str, field: &str) {
        self.check(!value.trim().is_empty(), format!("{field} is required"));
    }

    pub fn require_email(&mut self, value: &str, field: &str) {
        self.check(is_valid_email(value), format!("{field} must be a valid email"));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> crate::DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(crate::DomainError::validation_all(self.0))
        }
    }
}

/// Pragmatic e-mail shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Uppercase code made of ASCII letters, digits and `-`.
pub fn is_code(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

/// Normalise an e-mail for uniqueness comparisons.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
