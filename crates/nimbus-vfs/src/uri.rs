//! `cdms3:` object-store addresses.
//!
//! Two spellings are accepted:
//!
//! ```text
//! cdms3:<bucket>[?<key>][#delimiter=<d>]
//! cdms3://[<profile>@]<host>[:<port>]/<bucket>[?<key>][#delimiter=<d>]
//! ```
//!
//! Without a `delimiter` the key is flat: the name of the object is the whole key and it has
//! no parent. With a delimiter the key reads like a path, and a key ending in the delimiter
//! addresses a directory-like prefix.

use std::fmt;

use crate::error::{Result, VfsError};

pub const CDMS3_SCHEME: &str = "cdms3:";

const DELIMITER_PARAM: &str = "delimiter";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectUri {
    raw: String,
    /// Everything between the scheme and the bucket, e.g. `//profile@host:9000/`.
    authority: Option<String>,
    bucket: String,
    key: String,
    /// Fragment text without the leading `#`.
    fragment: Option<String>,
    delimiter: Option<String>,
}

impl ObjectUri {
    pub fn is_object_uri(location: &str) -> bool {
        location.trim_start().starts_with(CDMS3_SCHEME)
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let raw = uri.trim();
        let invalid = |reason| VfsError::InvalidUri {
            uri: redact_userinfo(raw),
            reason,
        };

        let rest = raw
            .strip_prefix(CDMS3_SCHEME)
            .ok_or_else(|| invalid("missing cdms3: scheme"))?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_owned())),
            None => (rest, None),
        };
        let (rest, key) = match rest.split_once('?') {
            Some((rest, key)) => (rest, key.to_owned()),
            None => (rest, String::new()),
        };

        let (authority, bucket) = if let Some(after_slashes) = rest.strip_prefix("//") {
            let Some(idx) = after_slashes.rfind('/') else {
                return Err(invalid("authority form requires /<bucket> after the host"));
            };
            if idx == 0 {
                return Err(invalid("authority form requires a host"));
            }
            let split = idx + 2;
            (Some(rest[..=split].to_owned()), &rest[split + 1..])
        } else {
            (None, rest)
        };

        if bucket.is_empty() {
            return Err(invalid("missing bucket"));
        }
        if bucket.contains('/') {
            return Err(invalid("bucket names cannot contain '/'"));
        }

        let delimiter = fragment.as_deref().and_then(|fragment| {
            fragment.split('&').find_map(|param| {
                let (name, value) = param.split_once('=')?;
                (name == DELIMITER_PARAM && !value.is_empty()).then(|| value.to_owned())
            })
        });

        Ok(Self {
            raw: raw.to_owned(),
            authority,
            bucket: bucket.to_owned(),
            key,
            fragment,
            delimiter,
        })
    }

    /// The URI exactly as supplied (trimmed). This is the identity of the object.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The URI with its fragment removed.
    pub fn location(&self) -> &str {
        match self.raw.find('#') {
            Some(idx) => &self.raw[..idx],
            None => &self.raw,
        }
    }

    /// Whether the key ends in the delimiter, i.e. names a prefix rather than an object.
    pub fn is_prefix_address(&self) -> bool {
        match &self.delimiter {
            Some(d) => !self.key.is_empty() && self.key.ends_with(d.as_str()),
            None => false,
        }
    }

    /// Final key segment, with any trailing delimiter stripped.
    ///
    /// Without a delimiter this is the entire key.
    pub fn name(&self) -> &str {
        let Some(d) = self.delimiter.as_deref() else {
            return &self.key;
        };
        let trimmed = self.key.strip_suffix(d).unwrap_or(&self.key);
        match trimmed.rfind(d) {
            Some(idx) => &trimmed[idx + d.len()..],
            None => trimmed,
        }
    }

    /// Address of the enclosing prefix. The returned key keeps its trailing delimiter.
    ///
    /// Returns `None` without a delimiter, and for keys with a single segment.
    pub fn parent(&self) -> Option<ObjectUri> {
        let d = self.delimiter.as_deref()?;
        let trimmed = self.key.strip_suffix(d).unwrap_or(&self.key);
        let idx = trimmed.rfind(d)?;
        Some(self.with_key(&trimmed[..idx + d.len()]))
    }

    /// Address of `name` under this prefix. A missing delimiter between the two is inserted.
    pub fn child(&self, name: &str) -> ObjectUri {
        let mut key = self.key.clone();
        if let Some(d) = self.delimiter.as_deref() {
            if !key.is_empty() && !key.ends_with(d) {
                key.push_str(d);
            }
        }
        key.push_str(name);
        self.with_key(&key)
    }

    /// Address of `name` next to this object, under the same parent prefix.
    pub fn sibling(&self, name: &str) -> ObjectUri {
        match self.parent() {
            Some(parent) => parent.child(name),
            None => self.with_key(name),
        }
    }

    /// Same authority, bucket and fragment, different key.
    pub fn with_key(&self, key: &str) -> ObjectUri {
        let mut raw = String::from(CDMS3_SCHEME);
        if let Some(authority) = &self.authority {
            raw.push_str(authority);
        }
        raw.push_str(&self.bucket);
        if !key.is_empty() {
            raw.push('?');
            raw.push_str(key);
        }
        if let Some(fragment) = &self.fragment {
            raw.push('#');
            raw.push_str(fragment);
        }
        ObjectUri {
            raw,
            authority: self.authority.clone(),
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            fragment: self.fragment.clone(),
            delimiter: self.delimiter.clone(),
        }
    }

    /// Rendering safe to put in logs and error messages (profile names are redacted).
    pub fn redacted(&self) -> String {
        redact_userinfo(&self.raw)
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn redact_userinfo(uri: &str) -> String {
    let Some(rest) = uri.strip_prefix("cdms3://") else {
        return uri.to_owned();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("cdms3://<redacted>{}", &rest[at..]),
        None => uri.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_without_delimiter_is_flat() {
        let uri = ObjectUri::parse("cdms3:noaa-nbm?blend.20190720/00/core/a.grib2").unwrap();
        assert_eq!(uri.bucket(), "noaa-nbm");
        assert_eq!(uri.key(), "blend.20190720/00/core/a.grib2");
        assert_eq!(uri.name(), "blend.20190720/00/core/a.grib2");
        assert!(uri.parent().is_none());
        assert!(!uri.is_prefix_address());
        assert_eq!(uri.as_str(), "cdms3:noaa-nbm?blend.20190720/00/core/a.grib2");
    }

    #[test]
    fn bucket_only_uri_has_empty_name() {
        let uri = ObjectUri::parse("cdms3:thredds-test-data").unwrap();
        assert_eq!(uri.key(), "");
        assert_eq!(uri.name(), "");
        assert!(uri.parent().is_none());
    }

    #[test]
    fn delimited_keys_behave_like_paths() {
        let uri = ObjectUri::parse("cdms3:bucket?a/b/00/x.grib2#delimiter=/").unwrap();
        assert_eq!(uri.delimiter(), Some("/"));
        assert_eq!(uri.name(), "x.grib2");
        let parent = uri.parent().unwrap();
        assert_eq!(parent.as_str(), "cdms3:bucket?a/b/00/#delimiter=/");
        assert_eq!(parent.name(), "00");
        assert!(parent.is_prefix_address());

        let grandparent = parent.parent().unwrap();
        assert_eq!(grandparent.as_str(), "cdms3:bucket?a/b/#delimiter=/");
        assert_eq!(grandparent.name(), "b");
    }

    #[test]
    fn top_level_delimited_key_has_no_parent() {
        let uri = ObjectUri::parse("cdms3:bucket?x.grib2#delimiter=/").unwrap();
        assert_eq!(uri.name(), "x.grib2");
        assert!(uri.parent().is_none());
        assert_eq!(
            uri.sibling("x.grib2.gbx9").as_str(),
            "cdms3:bucket?x.grib2.gbx9#delimiter=/"
        );
    }

    #[test]
    fn authority_form_keeps_host_and_profile() {
        let uri =
            ObjectUri::parse("cdms3://analyst@minio.local:9000/bucket?dir/f.grib2#delimiter=/")
                .unwrap();
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "dir/f.grib2");
        assert_eq!(
            uri.sibling("f.grib2.gbx9").as_str(),
            "cdms3://analyst@minio.local:9000/bucket?dir/f.grib2.gbx9#delimiter=/"
        );
        assert_eq!(
            uri.redacted(),
            "cdms3://<redacted>@minio.local:9000/bucket?dir/f.grib2#delimiter=/"
        );
        assert_eq!(uri.location(), "cdms3://analyst@minio.local:9000/bucket?dir/f.grib2");
    }

    #[test]
    fn child_inserts_missing_delimiter() {
        let uri = ObjectUri::parse("cdms3:bucket?dir#delimiter=/").unwrap();
        assert_eq!(uri.child("f").key(), "dir/f");
        let uri = ObjectUri::parse("cdms3:bucket?dir/#delimiter=/").unwrap();
        assert_eq!(uri.child("f").key(), "dir/f");
    }

    #[test]
    fn malformed_uris_are_rejected() {
        for bad in ["s3:bucket?key", "cdms3:", "cdms3:?key", "cdms3://hostonly", "cdms3:a/b?k"] {
            let err = ObjectUri::parse(bad).unwrap_err();
            assert!(matches!(err, VfsError::InvalidUri { .. }), "{bad}: {err}");
        }
    }
}
