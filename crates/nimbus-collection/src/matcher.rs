use globset::{GlobBuilder, GlobMatcher};
use nimbus_vfs::MFile;
use regex::Regex;

use crate::error::{CollectionSpecError, Result};

/// Decides whether a file belongs to a collection.
///
/// Regexes must match the whole name (or the whole path); a partial match is a miss.
#[derive(Clone, Debug)]
pub enum PathMatcher {
    /// No filter was given: every file belongs.
    All,
    FileName(Regex),
    FullPath(Regex),
    Glob(GlobMatcher),
}

impl PathMatcher {
    pub(crate) fn regex(pattern: &str, on_name: bool) -> Result<Self> {
        let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            CollectionSpecError::InvalidRegex {
                pattern: pattern.to_owned(),
                source: Box::new(err),
            }
        })?;
        Ok(if on_name {
            PathMatcher::FileName(anchored)
        } else {
            PathMatcher::FullPath(anchored)
        })
    }

    pub(crate) fn glob(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| CollectionSpecError::InvalidGlob {
                pattern: pattern.to_owned(),
                source: err,
            })?;
        Ok(PathMatcher::Glob(glob.compile_matcher()))
    }

    /// Test a file given its location (without URI fragment) and its name.
    pub fn matches_path(&self, location: &str, name: &str) -> bool {
        match self {
            PathMatcher::All => true,
            PathMatcher::FileName(re) => re.is_match(name),
            PathMatcher::FullPath(re) => re.is_match(location),
            PathMatcher::Glob(glob) => glob.is_match(location),
        }
    }

    pub fn matches(&self, file: &MFile) -> bool {
        self.matches_path(file.location(), file.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_matches_are_anchored() {
        let matcher = PathMatcher::regex(r".*\.grib2", true).unwrap();
        assert!(matcher.matches_path("/d/a.grib2", "a.grib2"));
        assert!(!matcher.matches_path("/d/a.grib2.gbx9", "a.grib2.gbx9"));
    }

    #[test]
    fn alternation_stays_inside_the_anchor() {
        let matcher = PathMatcher::regex("a|b", true).unwrap();
        assert!(matcher.matches_path("/a", "a"));
        assert!(!matcher.matches_path("/xa", "xa"));
        assert!(!matcher.matches_path("/bx", "bx"));
    }

    #[test]
    fn glob_star_stays_within_a_directory() {
        let matcher = PathMatcher::glob("/data/*.grib2").unwrap();
        assert!(matcher.matches_path("/data/a.grib2", "a.grib2"));
        assert!(!matcher.matches_path("/data/sub/a.grib2", "a.grib2"));

        let deep = PathMatcher::glob("/data/**/*.grib2").unwrap();
        assert!(deep.matches_path("/data/sub/a.grib2", "a.grib2"));
    }

    #[test]
    fn invalid_patterns_are_reported() {
        assert!(matches!(
            PathMatcher::regex("(", true),
            Err(CollectionSpecError::InvalidRegex { .. })
        ));
        assert!(matches!(
            PathMatcher::glob("["),
            Err(CollectionSpecError::InvalidGlob { .. })
        ));
    }
}
