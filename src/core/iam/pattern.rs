//! Pattern matching for IAM resource ARNs
//!
//! Supports the IAM wildcards:
//! - `*` - Matches any run of characters, including `/`
//! - `?` - Matches exactly one character
//!
//! Everything else is literal, so `arn:aws:s3:::bucket` does not match objects
//! inside the bucket while `arn:aws:s3:::bucket/*` does.

use regex::Regex;

/// Pattern matcher for resource ARNs
pub struct PatternMatcher;

impl PatternMatcher {
    /// Check if an ARN matches a pattern
    ///
    /// # Examples
    /// ```
    /// use stackfront::core::iam::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("arn:aws:s3:::media/*", "arn:aws:s3:::media/img/a.png"));
    /// assert!(!PatternMatcher::matches("arn:aws:s3:::media/*", "arn:aws:s3:::media"));
    /// assert!(!PatternMatcher::matches("arn:aws:s3:::media/*", "arn:aws:s3:::other/a.png"));
    /// ```
    pub fn matches(pattern: &str, arn: &str) -> bool {
        // Exact match
        if pattern == arn {
            return true;
        }

        if !pattern.contains(&['*', '?'][..]) {
            return false;
        }

        match Self::compile(pattern) {
            Some(re) => re.is_match(arn),
            None => false,
        }
    }

    /// Translate an IAM pattern into an anchored regex
    fn compile(pattern: &str) -> Option<Regex> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');
        Regex::new(&expr).ok()
    }

    /// True if the pattern grants more than a single bucket and its objects,
    /// e.g. `*` or `arn:aws:s3:::*`
    pub fn is_account_wide(pattern: &str) -> bool {
        match pattern.strip_prefix("arn:aws:s3:::") {
            Some(rest) => {
                let bucket = rest.split('/').next().unwrap_or_default();
                bucket.is_empty() || bucket.contains(&['*', '?'][..])
            }
            None => pattern.contains(&['*', '?'][..]),
        }
    }
}
