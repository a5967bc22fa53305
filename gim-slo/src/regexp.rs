use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref SLUG: Regex =
        Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,62}[a-z0-9])?$").unwrap();
}

/// Lowercase alphanumerics and inner dashes, at most 64 characters.
pub fn check_slug(value: &str) -> Result<(), ValidationError> {
    if SLUG.is_match(value) {
        return Ok(());
    }
    let mut err = ValidationError::new("slug");
    err.message = Some(Cow::from(
        "slug must be lowercase alphanumerics separated by dashes",
    ));
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug() {
        assert!(check_slug("platform-admins").is_ok());
        assert!(check_slug("a").is_ok());
        assert!(check_slug("-leading").is_err());
        assert!(check_slug("trailing-").is_err());
        assert!(check_slug("Upper").is_err());
        assert!(check_slug("").is_err());
        assert!(check_slug(&"a".repeat(65)).is_err());
    }
}
