//! Type-prefixed identifiers accepted by the sandbox `identify` API.
//!
//! Every identifier is a `{prefix}:{value}` string where the prefix tells the sandbox how the
//! value was derived:
//!
//! | Prefix | Value |
//! |---|---|
//! | `e` | SHA-256 of the trimmed, lowercased email address, lowercase hex |
//! | `g` | trimmed, lowercased mobile advertising ID |
//! | `c` | trimmed, case-preserved custom ID provided by the app (e.g., a PPID) |
use std::{str::FromStr, sync::OnceLock};

use derive_more::{Display, Into};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{advertising_id::AdvertisingInfo, Error};

/// A normalized type-prefixed identifier.
///
/// Identifiers are compared by their exact string form.
///
/// ```
/// # use optable::identifiers::{cid, eid, Identifier};
/// assert_eq!(eid("Test@Example.com "), eid("test@example.com"));
/// assert_eq!(cid(" PPID-42 ").as_str(), "c:PPID-42");
///
/// let parsed: Identifier = "c:PPID-42".parse().unwrap();
/// assert_eq!(parsed, cid("PPID-42"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(#[serde(deserialize_with = "deserialize_checked")] String);

impl Identifier {
    fn with_prefix(prefix: char, value: &str) -> Identifier {
        Identifier(format!("{}:{}", prefix, value))
    }

    /// The `{prefix}:{value}` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type prefix, e.g. `e`.
    pub fn prefix(&self) -> &str {
        self.split().0
    }

    /// Everything after the first `:`.
    pub fn value(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        // Constructors guarantee the delimiter is present.
        self.0.split_once(':').unwrap_or(("", &self.0))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = Error;

    /// Accept an already-built identifier. The prefix must be non-empty.
    fn from_str(s: &str) -> Result<Identifier, Error> {
        match s.split_once(':') {
            Some((prefix, _)) if !prefix.is_empty() => Ok(Identifier(s.to_owned())),
            _ => Err(Error::InvalidIdentifier(s.to_owned())),
        }
    }
}

fn deserialize_checked<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<Identifier>()
        .map(String::from)
        .map_err(serde::de::Error::custom)
}

/// Type-prefixed SHA-256 of the trimmed, lowercased `email`.
pub fn eid(email: &str) -> Identifier {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    Identifier::with_prefix('e', &hex::encode(digest))
}

/// Type-prefixed advertising ID (Google Advertising ID, IDFA, ...).
pub fn gaid(advertising_id: &str) -> Identifier {
    Identifier::with_prefix('g', &advertising_id.trim().to_lowercase())
}

/// Type-prefixed custom ID. The case of `id` is preserved.
pub fn cid(id: &str) -> Identifier {
    Identifier::with_prefix('c', id.trim())
}

/// Look for an `oeid` query parameter holding a SHA-256 email digest in `uri`.
///
/// This is meant for incoming deep links, such as links in newsletter emails sent by the app
/// developer, that carry `oeid=sha256(lowercase(email))`. The parameter name is matched
/// case-insensitively. Returns `None` if `uri` does not parse, has no `oeid` parameter, or the
/// value is not 64 hex characters.
///
/// ```
/// # use optable::identifiers::eid_from_uri;
/// let link = "https://example.com/welcome?oEId=A665A45920422F9D417E4867EFDC4FB8A04A1F3FFF1FA07E998E86F7F7A27AE3";
/// assert_eq!(
///     eid_from_uri(link).unwrap().as_str(),
///     "e:a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
/// );
/// assert!(eid_from_uri("https://example.com/welcome").is_none());
/// ```
pub fn eid_from_uri(uri: &str) -> Option<Identifier> {
    // Lowercasing before parsing makes the parameter name case-insensitive.
    let url = Url::parse(&uri.to_lowercase()).ok()?;
    let (_, oeid) = url.query_pairs().find(|(name, _)| name == "oeid")?;

    if oeid.len() != 64 || !oeid.bytes().all(|b| b.is_ascii_hexdigit()) {
        log::debug!(target: "optable", "ignoring malformed oeid deep link parameter");
        return None;
    }

    Some(Identifier::with_prefix('e', &oeid))
}

/// Whether `email` looks like an email address.
///
/// The input is matched as is; surrounding whitespace makes it invalid.
pub fn is_email(email: &str) -> bool {
    static EMAIL_ADDRESS: OnceLock<Regex> = OnceLock::new();
    EMAIL_ADDRESS
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9+._%\-]{1,256}@[a-zA-Z0-9][a-zA-Z0-9\-]{0,64}(\.[a-zA-Z0-9][a-zA-Z0-9\-]{0,25})+$",
            )
            .expect("email pattern is valid")
        })
        .is_match(email)
}

/// Build the identifiers sent by [`OptableSdk::identify_email`](crate::OptableSdk::identify_email).
///
/// Identifiers are appended in a fixed order, each only when usable:
/// 1. `e:` when `email` is a valid email address,
/// 2. `g:` when `include_advertising_id` is set and `advertising_info` is known and usable,
/// 3. `c:` when `custom_id` is non-empty.
pub fn identifier_list(
    email: &str,
    include_advertising_id: bool,
    advertising_info: Option<&AdvertisingInfo>,
    custom_id: Option<&str>,
) -> Vec<Identifier> {
    let mut ids = Vec::with_capacity(3);

    if is_email(email) {
        ids.push(eid(email));
    }

    if include_advertising_id {
        if let Some(id) = advertising_info.and_then(AdvertisingInfo::usable_id) {
            ids.push(gaid(id));
        }
    }

    if let Some(custom_id) = custom_id.filter(|id| !id.is_empty()) {
        ids.push(cid(custom_id));
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    const EID_123: &str = "e:a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

    #[test]
    fn eid_is_correct() {
        assert_eq!(eid("123").as_str(), EID_123);
        assert_eq!(eid(" 123").as_str(), EID_123);
        assert_eq!(eid("123 ").as_str(), EID_123);
        assert_eq!(eid(" 123 ").as_str(), EID_123);
    }

    #[test]
    fn eid_ignores_case() {
        let expected = eid("tEsT@FooBarBaz.CoM");

        assert_eq!(eid("test@foobarbaz.com"), expected);
        assert_eq!(eid("TEST@FOOBARBAZ.COM"), expected);
        assert_eq!(eid("TeSt@fOObARbAZ.cOm"), expected);
    }

    #[test]
    fn gaid_is_correct_and_ignores_case() {
        let expected = "g:38400000-8cf0-11bd-b23e-10b96e40000d";

        assert_eq!(gaid("38400000-8cf0-11bd-b23e-10b96e40000d").as_str(), expected);
        assert_eq!(gaid("  38400000-8cf0-11bd-b23e-10b96e40000d").as_str(), expected);
        assert_eq!(gaid("38400000-8cf0-11bd-b23e-10b96e40000d  ").as_str(), expected);
        assert_eq!(gaid("38400000-8CF0-11BD-B23E-10B96E40000D").as_str(), expected);
    }

    #[test]
    fn cid_trims_and_preserves_case() {
        let expected = "c:FooBarBAZ-01234#98765.!!!";

        assert_eq!(cid("FooBarBAZ-01234#98765.!!!").as_str(), expected);
        assert_eq!(cid(" FooBarBAZ-01234#98765.!!!").as_str(), expected);
        assert_eq!(cid("  FooBarBAZ-01234#98765.!!!  ").as_str(), expected);
        assert_ne!(cid("foobarBAZ-01234#98765.!!!").as_str(), expected);
        assert_ne!(cid("foobar"), cid("FooBar"));
    }

    #[test]
    fn eid_from_uri_is_correct() {
        let url = "http://some.domain.com/some/path?some=query&something=else&oeid=a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3&foo=bar&baz";

        assert_eq!(eid_from_uri(url).unwrap().as_str(), EID_123);
    }

    #[test]
    fn eid_from_uri_returns_none_when_oeid_absent() {
        assert_eq!(
            eid_from_uri("http://some.domain.com/some/path?some=query&something=else"),
            None
        );
        assert_eq!(eid_from_uri("http://some.domain.com/some/path"), None);
        assert_eq!(eid_from_uri(""), None);
    }

    #[test]
    fn eid_from_uri_expects_sha256() {
        let too_long = "http://some.domain.com/some/path?oeid=AAAAAAAa665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3&foo=bar";
        let not_hex = "http://some.domain.com/some/path?oeid=z665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

        assert_eq!(eid_from_uri(too_long), None);
        assert_eq!(eid_from_uri(not_hex), None);
    }

    #[test]
    fn eid_from_uri_ignores_case() {
        let url = "http://some.domain.com/some/path?some=query&something=else&oEId=A665A45920422F9D417E4867EFDC4FB8A04A1F3FFF1FA07E998E86f7f7A27AE3&foo=bar&baz";

        assert_eq!(eid_from_uri(url).unwrap().as_str(), EID_123);
    }

    #[test]
    fn is_email_matches_addresses_only() {
        assert!(is_email("test@example.com"));
        assert!(is_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_email("test@example"));
        assert!(!is_email("not an email"));
        assert!(!is_email(" test@example.com"));
        assert!(!is_email(""));
    }

    #[test]
    fn identifier_list_keeps_order_and_skips_unusable() {
        let info = AdvertisingInfo::new("38400000-8CF0-11BD-B23E-10B96E40000D", false);

        let ids = identifier_list("test@example.com", true, Some(&info), Some("PPID"));
        assert_eq!(
            ids,
            vec![
                eid("test@example.com"),
                gaid("38400000-8cf0-11bd-b23e-10b96e40000d"),
                cid("PPID"),
            ]
        );

        let ids = identifier_list("invalid", true, None, Some(""));
        assert!(ids.is_empty());

        let ids = identifier_list("test@example.com", false, Some(&info), None);
        assert_eq!(ids, vec![eid("test@example.com")]);
    }

    #[test]
    fn identifier_list_respects_limit_ad_tracking() {
        let limited = AdvertisingInfo::new("38400000-8cf0-11bd-b23e-10b96e40000d", true);

        let ids = identifier_list("", true, Some(&limited), Some("ppid"));
        assert_eq!(ids, vec![cid("ppid")]);
    }

    #[test]
    fn parse_requires_prefix() {
        assert_eq!("e:abc".parse::<Identifier>().unwrap().prefix(), "e");
        assert_eq!("c:a:b".parse::<Identifier>().unwrap().value(), "a:b");
        assert!("abc".parse::<Identifier>().is_err());
        assert!(":abc".parse::<Identifier>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&vec![cid("x"), gaid("Y")]).unwrap();
        assert_eq!(json, r#"["c:x","g:y"]"#);

        assert!(serde_json::from_str::<Identifier>(r#""nope""#).is_err());
        assert_eq!(
            serde_json::from_str::<Identifier>(r#""c:x""#).unwrap(),
            cid("x")
        );
    }
}
