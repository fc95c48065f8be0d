use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

// Known browser families, checked first
const BROWSER_PATTERNS: &[&str] = &["chrome", "firefox", "safari", "edge", "opera", "msie|trident"];

// Automation markers, checked only when no browser pattern matched
const BOT_PATTERNS: &[&str] = &[
    "bot", "crawl", "scrape", "spider", "curl", "wget", "^$", "python", "go-http", "java",
];

lazy_static! {
    static ref BROWSERS: Vec<Regex> = compile(BROWSER_PATTERNS);
    static ref BOTS: Vec<Regex> = compile(BOT_PATTERNS);
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
}

/// Returns true if the user-agent looks automated.
///
/// A browser match wins even when a bot marker is also present. Strings that
/// match neither list are treated as benign.
pub fn is_suspicious_user_agent(user_agent: &str) -> bool {
    if BROWSERS.iter().any(|re| re.is_match(user_agent)) {
        return false;
    }
    BOTS.iter().any(|re| re.is_match(user_agent))
}
