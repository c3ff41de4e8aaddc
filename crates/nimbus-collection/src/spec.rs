//! Collection specification strings.
//!
//! A spec is meant to be written by copying the path of one example data file and editing
//! its last segment into a filter:
//!
//! ```text
//! /data/ldm/GFS/Alaska_191km/**/GFS_Alaska_191km_#yyyyMMdd_HHmm#\.grib1$
//! ```
//!
//! The part before the split point is the root directory, `/**/` asks for recursion, and
//! the text between `#` marks is a date pattern: it matches any characters in the filter
//! and is later used to pull a date out of each file name.

use std::fmt;

use nimbus_vfs::ObjectUri;

use crate::date::DateExtractor;
use crate::error::{CollectionSpecError, Result};
use crate::matcher::PathMatcher;

pub const DEFAULT_DELIMITER: &str = "/";

const REGEX_PREFIX: &str = "regex:";
const GLOB_PREFIX: &str = "glob:";
const DELIMITER_FRAGMENT: &str = "#delimiter=";

const REGEX_META: &[char] = &['\\', '.', '^', '$', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}'];
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '\\'];

#[derive(Clone, Debug)]
pub struct CollectionSpec {
    spec: String,
    root_dir: String,
    delimiter: String,
    fragment: String,
    want_subdirs: bool,
    filter_on_name: bool,
    filter: Option<String>,
    date_format_mark: Option<String>,
    object_store: bool,
    matcher: PathMatcher,
}

impl CollectionSpec {
    /// Parse a single-string spec, using the current directory when it names no root.
    pub fn parse(spec: &str) -> Result<Self> {
        let default_root = std::env::current_dir()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_else(|_| ".".to_owned());
        Self::parse_with_default_root(spec, &default_root)
    }

    pub fn parse_with_default_root(spec: &str, default_root: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(CollectionSpecError::Empty);
        }

        let parsed = if let Some(pattern) = spec.strip_prefix(REGEX_PREFIX) {
            Self::from_pattern(spec, pattern, default_root, false)?
        } else if let Some(pattern) = spec.strip_prefix(GLOB_PREFIX) {
            Self::from_pattern(spec, pattern, default_root, true)?
        } else if ObjectUri::is_object_uri(spec) {
            Self::parse_object(spec)?
        } else {
            let (root, filter_and_mark) = split_on_last_delimiter(spec, DEFAULT_DELIMITER);
            Self::from_filter_and_mark(
                spec,
                root.unwrap_or(default_root).to_owned(),
                filter_and_mark,
                DEFAULT_DELIMITER,
                String::new(),
                spec.contains(&subdirs_mark(DEFAULT_DELIMITER)),
                false,
            )?
        };

        tracing::debug!(
            target = "nimbus.collection",
            spec = %parsed.spec,
            root = %parsed.root_dir,
            subdirs = parsed.want_subdirs,
            filter = ?parsed.filter,
            date_mark = ?parsed.date_format_mark,
            "parsed collection spec"
        );
        Ok(parsed)
    }

    /// Explicit root plus a regex that is matched against each file's full path.
    ///
    /// Always recursive. The effective pattern is `root + "/" + regex`.
    pub fn from_root_and_regex(root_dir: &str, regex: &str) -> Result<Self> {
        let root = root_dir.trim();
        let root = root.strip_suffix(DEFAULT_DELIMITER).unwrap_or(root);
        let spec = format!("{root}{DEFAULT_DELIMITER}{regex}");
        let matcher = PathMatcher::regex(&spec, false)?;
        Ok(Self {
            root_dir: root.to_owned(),
            delimiter: DEFAULT_DELIMITER.to_owned(),
            fragment: String::new(),
            want_subdirs: true,
            filter_on_name: false,
            filter: Some(spec.clone()),
            date_format_mark: None,
            object_store: false,
            matcher,
            spec,
        })
    }

    fn from_filter_and_mark(
        spec: &str,
        root_dir: String,
        filter_and_mark: Option<&str>,
        delimiter: &str,
        fragment: String,
        want_subdirs: bool,
        object_store: bool,
    ) -> Result<Self> {
        let filter = filter_and_mark.map(filter_regex);
        let date_format_mark = filter_and_mark.and_then(date_format_mark);
        let matcher = match &filter {
            Some(pattern) => PathMatcher::regex(pattern, true)?,
            None => PathMatcher::All,
        };
        Ok(Self {
            spec: spec.to_owned(),
            root_dir,
            delimiter: delimiter.to_owned(),
            fragment,
            want_subdirs,
            filter_on_name: true,
            filter,
            date_format_mark,
            object_store,
            matcher,
        })
    }

    fn from_pattern(spec: &str, pattern: &str, default_root: &str, glob: bool) -> Result<Self> {
        let meta = if glob { GLOB_META } else { REGEX_META };
        let matcher = if glob {
            PathMatcher::glob(pattern)?
        } else {
            PathMatcher::regex(pattern, false)?
        };
        let root_dir = literal_root(pattern, meta).unwrap_or(default_root).to_owned();
        Ok(Self {
            spec: spec.to_owned(),
            root_dir,
            delimiter: DEFAULT_DELIMITER.to_owned(),
            fragment: String::new(),
            want_subdirs: true,
            filter_on_name: false,
            filter: Some(pattern.to_owned()),
            date_format_mark: None,
            object_store: false,
            matcher,
        })
    }

    /// `cdms3:` specs split only inside the key, and keep their `#delimiter=` fragment aside.
    fn parse_object(spec: &str) -> Result<Self> {
        let (body, fragment) = match spec.rfind(DELIMITER_FRAGMENT) {
            Some(idx) => (&spec[..idx], &spec[idx..]),
            None => (spec, ""),
        };
        let delimiter = fragment
            .strip_prefix(DELIMITER_FRAGMENT)
            .and_then(|params| params.split('&').next())
            .unwrap_or("");
        let (bucket, key) = match body.split_once('?') {
            Some((bucket, key)) => (bucket, key),
            None => (body, ""),
        };
        let key_filter = (!key.is_empty()).then_some(key);

        if delimiter.is_empty() {
            return Self::from_filter_and_mark(
                spec,
                bucket.to_owned(),
                key_filter,
                "",
                fragment.to_owned(),
                false,
                true,
            );
        }

        let (key_root, filter_and_mark) = split_on_last_delimiter(key, delimiter);
        let root_dir = match key_root {
            Some(root) if root.ends_with(delimiter) => format!("{bucket}?{root}"),
            Some(root) => format!("{bucket}?{root}{delimiter}"),
            None => bucket.to_owned(),
        };
        Self::from_filter_and_mark(
            spec,
            root_dir,
            filter_and_mark,
            delimiter,
            fragment.to_owned(),
            key.contains(&subdirs_mark(delimiter)),
            true,
        )
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Root directory, or for object storage the prefix address (without fragment).
    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// URI fragment carried by object-store specs (`#delimiter=/`), empty otherwise.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn want_subdirs(&self) -> bool {
        self.want_subdirs
    }

    /// Whether the filter applies to file names (`true`) or to full paths.
    pub fn filter_on_name(&self) -> bool {
        self.filter_on_name
    }

    /// Filter regex (or glob) source. `None` means every file belongs.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn date_format_mark(&self) -> Option<&str> {
        self.date_format_mark.as_deref()
    }

    pub fn is_object_store(&self) -> bool {
        self.object_store
    }

    pub fn path_matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Location to open for the collection root, fragment included.
    pub fn root_location(&self) -> String {
        format!("{}{}", self.root_dir, self.fragment)
    }

    /// Location of `filename` directly under the root.
    pub fn file_path(&self, filename: &str) -> String {
        let d = self.delimiter.as_str();
        let mut path = if self.object_store && !self.root_dir.contains('?') {
            format!("{}?{filename}", self.root_dir)
        } else if d.is_empty() || self.root_dir.ends_with(d) || self.root_dir.ends_with('?') {
            format!("{}{filename}", self.root_dir)
        } else {
            format!("{}{d}{filename}", self.root_dir)
        };
        path.push_str(&self.fragment);
        path
    }

    /// Extractor for the date embedded in member file names, if the spec carries a mark.
    pub fn date_extractor(&self) -> Result<Option<DateExtractor>> {
        self.date_format_mark
            .as_deref()
            .map(DateExtractor::from_mark)
            .transpose()
    }
}

impl fmt::Display for CollectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

fn subdirs_mark(delimiter: &str) -> String {
    format!("{delimiter}**{delimiter}")
}

/// Split into `(root, filter)`. The first `/**/` wins over the last delimiter. A split at
/// position 0 keeps the delimiter itself as root. Empty halves are `None`.
fn split_on_last_delimiter<'a>(spec: &'a str, delimiter: &'a str) -> (Option<&'a str>, Option<&'a str>) {
    let non_empty = |s: &'a str| (!s.is_empty()).then_some(s);
    if delimiter.is_empty() {
        return (None, non_empty(spec));
    }

    let subdirs = subdirs_mark(delimiter);
    let (start, rest_start) = match spec.find(&subdirs) {
        Some(idx) => (idx, idx + subdirs.len()),
        None => match spec.rfind(delimiter) {
            Some(idx) => (idx, idx + delimiter.len()),
            None => return (None, non_empty(spec)),
        },
    };

    let root = if start == 0 { delimiter } else { &spec[..start] };
    (Some(root), non_empty(&spec[rest_start..]))
}

/// Filter regex for the text after the split point.
///
/// One `#`: everything before it followed by `*`. Two or more: `#`s removed and every
/// character from the first up to the last `#` replaced by `.`.
fn filter_regex(filter_and_mark: &str) -> String {
    let (Some(first), Some(last)) = (filter_and_mark.find('#'), filter_and_mark.rfind('#')) else {
        return filter_and_mark.to_owned();
    };
    if first == last {
        return format!("{}*", &filter_and_mark[..first]);
    }

    let first = filter_and_mark[..first].chars().count();
    let last = filter_and_mark[..last].chars().count();
    let mut chars: Vec<char> = filter_and_mark.chars().filter(|c| *c != '#').collect();
    for c in chars.iter_mut().take(last.saturating_sub(1)).skip(first) {
        *c = '.';
    }
    chars.into_iter().collect()
}

fn date_format_mark(filter_and_mark: &str) -> Option<String> {
    let first = filter_and_mark.find('#')?;
    let last = filter_and_mark.rfind('#')?;
    Some(if first == last {
        filter_and_mark.to_owned()
    } else {
        filter_and_mark[..=last].to_owned()
    })
}

/// Longest delimiter-terminated prefix free of pattern metacharacters.
fn literal_root<'a>(pattern: &'a str, meta: &[char]) -> Option<&'a str> {
    let cut = pattern.find(|c: char| meta.contains(&c)).unwrap_or(pattern.len());
    let idx = pattern[..cut].rfind(DEFAULT_DELIMITER)?;
    Some(if idx == 0 {
        DEFAULT_DELIMITER
    } else {
        &pattern[..idx]
    })
}
