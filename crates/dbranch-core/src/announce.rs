//! Gossip announcements and article name validation.

use serde::{Deserialize, Serialize};

use crate::{ARTICLE_EXTENSIONS, ContentId, Error, Result};

/// An article announcement decoded from a gossip payload.
///
/// Wire format: `{"name": "<article filename>", "cid": "<content address>"}`.
/// Extra fields are ignored so the channel can carry richer payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingAnnouncement {
    pub name: String,
    pub cid: ContentId,
}

impl IncomingAnnouncement {
    /// Decode and validate a raw gossip payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let announcement: Self = serde_json::from_slice(payload)?;
        validate_article_name(&announcement.name)?;
        if announcement.cid.as_str().trim().is_empty() {
            return Err(Error::InvalidField {
                field: "cid",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(announcement)
    }

    /// Encode for publishing on the gossip channel.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Check that `name` is a plain file name with a recognized article extension.
///
/// Names become paths in the mutable store, so anything that could escape the
/// target directory is rejected.
pub fn validate_article_name(name: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("contains a path separator"));
    }
    if name == "." || name == ".." {
        return Err(invalid("relative path component"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }
    let has_extension = ARTICLE_EXTENSIONS
        .iter()
        .any(|ext| name.len() > ext.len() && name.ends_with(ext));
    if !has_extension {
        return Err(invalid("unrecognized article extension"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_announcement() {
        let ann = IncomingAnnouncement::decode(br#"{"name":"foo.news","cid":"Qm1"}"#).unwrap();
        assert_eq!(ann.name, "foo.news");
        assert_eq!(ann.cid, ContentId::from("Qm1"));
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let ann = IncomingAnnouncement {
            name: "foo.news".to_string(),
            cid: ContentId::from("Qm1"),
        };
        assert_eq!(ann.encode().unwrap(), br#"{"name":"foo.news","cid":"Qm1"}"#);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let ann =
            IncomingAnnouncement::decode(br#"{"name":"foo.news","cid":"Qm1","v":2}"#).unwrap();
        assert_eq!(ann.name, "foo.news");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            IncomingAnnouncement::decode(b"ping"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert!(IncomingAnnouncement::decode(br#"{"name":"foo.news"}"#).is_err());
        assert!(IncomingAnnouncement::decode(br#"{"cid":"Qm1"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_cid() {
        let err = IncomingAnnouncement::decode(br#"{"name":"foo.news","cid":" "}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "cid", .. }));
    }

    #[test]
    fn test_validate_article_name() {
        assert!(validate_article_name("foo.news").is_ok());
        assert!(validate_article_name("").is_err());
        assert!(validate_article_name(".news").is_err());
        assert!(validate_article_name("../foo.news").is_err());
        assert!(validate_article_name("a/b.news").is_err());
        assert!(validate_article_name("..").is_err());
        assert!(validate_article_name("foo.txt").is_err());
        assert!(validate_article_name("foo.news.json").is_err());
    }
}
