//! Stable test identities
//!
//! A test is identified by the short hash of its full title (ancestor suite
//! titles followed by its own title) paired with the browser it runs in. The
//! same identifier must come out of a discovered test, a live execution result
//! and a persisted report entry, so every source implements [`TestIdentity`]
//! and shares the default methods.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator placed between titles when building a full title.
///
/// Titles may contain it too; two chains that flatten to the same string get
/// the same id and are rejected at registration time.
pub const TITLE_DELIMITER: char = ' ';

/// Number of hex characters kept from the title digest
pub const SHORT_HASH_LEN: usize = 7;

/// Join a title chain (root suite first, test title last) into a full title
pub fn mk_full_title<I, S>(titles: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut full = String::new();
    for title in titles {
        if !full.is_empty() {
            full.push(TITLE_DELIMITER);
        }
        full.push_str(title.as_ref());
    }
    full
}

/// Short SHA-256 digest of a full title
pub fn short_hash(full_title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_title.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Identifier joining discovered tests, live results and report entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Combine a title hash and a browser id
    pub fn format(hash: &str, browser_id: &str) -> Self {
        Self(format!("{}/{}", hash, browser_id))
    }

    pub fn from_full_title(full_title: &str, browser_id: &str) -> Self {
        Self::format(&short_hash(full_title), browser_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that carries a title chain and a browser target
pub trait TestIdentity {
    /// Suite titles from the root down, followed by the test title
    fn title_chain(&self) -> Vec<&str>;

    fn browser_id(&self) -> &str;

    fn full_title(&self) -> String {
        mk_full_title(self.title_chain())
    }

    fn title_hash(&self) -> String {
        short_hash(&self.full_title())
    }

    fn test_id(&self) -> TestId {
        TestId::format(&self.title_hash(), self.browser_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    struct Discovered {
        suites: Vec<String>,
        title: String,
        browser: String,
    }

    impl TestIdentity for Discovered {
        fn title_chain(&self) -> Vec<&str> {
            self.suites
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(self.title.as_str()))
                .collect()
        }

        fn browser_id(&self) -> &str {
            &self.browser
        }
    }

    struct Live<'a> {
        chain: Vec<&'a str>,
        browser: &'a str,
    }

    impl TestIdentity for Live<'_> {
        fn title_chain(&self) -> Vec<&str> {
            self.chain.clone()
        }

        fn browser_id(&self) -> &str {
            self.browser
        }
    }

    #[test_case(&["Login"], "opens"; "one suite")]
    #[test_case(&["Login", "Form"], "validates"; "nested suites")]
    #[test_case(&[], "root test"; "no suite")]
    fn test_same_id_from_discovery_and_live_result(suites: &[&str], title: &str) {
        let discovered = Discovered {
            suites: suites.iter().map(|s| s.to_string()).collect(),
            title: title.to_string(),
            browser: "chrome".to_string(),
        };
        let mut chain = suites.to_vec();
        chain.push(title);
        let live = Live {
            chain,
            browser: "chrome",
        };

        assert_eq!(discovered.test_id(), live.test_id());
    }

    #[test]
    fn test_browser_is_part_of_id() {
        let full = mk_full_title(["A", "t"]);
        assert_ne!(
            TestId::from_full_title(&full, "chrome"),
            TestId::from_full_title(&full, "firefox")
        );
    }

    #[test]
    fn test_short_hash_shape() {
        let hash = short_hash("A t");
        assert_eq!(hash.len(), SHORT_HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, short_hash("A t"));
    }

    #[test]
    fn test_delimiter_inside_title_flattens() {
        // Same flattened title, same id: registration has to catch this
        assert_eq!(mk_full_title(["a b", "c"]), mk_full_title(["a", "b c"]));
    }

    #[test]
    fn test_format_id() {
        assert_eq!(TestId::format("abc1234", "chrome").as_str(), "abc1234/chrome");
    }
}
