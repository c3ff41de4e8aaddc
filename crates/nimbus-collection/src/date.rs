use time::format_description::{self, BorrowedFormatItem};
use time::parsing::Parsed;
use time::{Date, PrimitiveDateTime, Time};

use crate::error::{CollectionSpecError, Result};

/// Pulls a timestamp out of a file name using a date mark such as `GFS_#yyyyMMdd_HHmm`.
///
/// The text before `#` is searched for in the name; the characters right after it, as
/// many as the pattern is long, are parsed with the pattern. A trailing `#` closes the
/// pattern. Supported fields: `yyyy`, `yy`, `MM`, `dd`, `DDD`, `HH`, `mm`, `ss`; any other
/// non-letter character is literal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateExtractor {
    mark: String,
    prefix: String,
    width: usize,
    description: String,
}

impl DateExtractor {
    pub fn from_mark(mark: &str) -> Result<Self> {
        let unsupported = |reason: String| CollectionSpecError::UnsupportedDateFormat {
            mark: mark.to_owned(),
            reason,
        };

        let (prefix, pattern) = mark
            .split_once('#')
            .ok_or_else(|| unsupported("missing '#' before the date pattern".into()))?;
        let pattern = pattern.split('#').next().unwrap_or_default();
        if pattern.is_empty() {
            return Err(unsupported("empty date pattern".into()));
        }

        let description = translate(pattern).map_err(unsupported)?;
        format_description::parse(&description)
            .map_err(|err| unsupported(err.to_string()))?;

        Ok(Self {
            mark: mark.to_owned(),
            prefix: prefix.to_owned(),
            width: pattern.chars().count(),
            description,
        })
    }

    pub fn mark(&self) -> &str {
        &self.mark
    }

    /// `None` when the prefix is absent or the text does not parse as a date.
    pub fn extract(&self, name: &str) -> Option<PrimitiveDateTime> {
        let start = name.find(&self.prefix)? + self.prefix.len();
        let text: String = name[start..].chars().take(self.width).collect();
        if text.chars().count() != self.width {
            return None;
        }

        let items = format_description::parse(&self.description).ok()?;
        match parse_fields(&text, &items) {
            Some(date) => Some(date),
            None => {
                tracing::trace!(
                    target = "nimbus.collection",
                    name,
                    mark = %self.mark,
                    "file name does not carry a date matching the mark"
                );
                None
            }
        }
    }
}

fn parse_fields(text: &str, items: &[BorrowedFormatItem<'_>]) -> Option<PrimitiveDateTime> {
    let mut parsed = Parsed::new();
    let rest = parsed.parse_items(text.as_bytes(), items).ok()?;
    if !rest.is_empty() {
        return None;
    }

    let year = match (parsed.year(), parsed.year_last_two()) {
        (Some(year), _) => year,
        (None, Some(two)) => expand_two_digit_year(two),
        (None, None) => return None,
    };
    let date = match (parsed.month(), parsed.day(), parsed.ordinal()) {
        (_, _, Some(ordinal)) => Date::from_ordinal_date(year, ordinal.get()).ok()?,
        (Some(month), day, None) => {
            Date::from_calendar_date(year, month, day.map_or(1, |d| d.get())).ok()?
        }
        (None, _, None) => Date::from_ordinal_date(year, 1).ok()?,
    };
    let time = Time::from_hms(
        parsed.hour_24().unwrap_or(0),
        parsed.minute().unwrap_or(0),
        parsed.second().unwrap_or(0),
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Two-digit years below 70 are in the 2000s, the rest in the 1900s.
fn expand_two_digit_year(two: u8) -> i32 {
    let two = i32::from(two);
    if two < 70 {
        2000 + two
    } else {
        1900 + two
    }
}

/// Translate a `yyyyMMdd`-style pattern into a `time` format description.
fn translate(pattern: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !c.is_ascii_alphabetic() {
            if c == '[' {
                out.push_str("[[");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&next| next == c).count();
        let component = match (c, run) {
            ('y', 4) => "[year]",
            ('y', 2) => "[year repr:last_two]",
            ('M', 2) => "[month]",
            ('d', 2) => "[day]",
            ('D', 3) => "[ordinal]",
            ('H', 2) => "[hour]",
            ('m', 2) => "[minute]",
            ('s', 2) => "[second]",
            _ => {
                let field: String = std::iter::repeat(c).take(run).collect();
                return Err(format!("unsupported field {field:?}"));
            }
        };
        out.push_str(component);
        i += run;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn extracts_after_prefix() {
        let extractor = DateExtractor::from_mark("GFS_Alaska_191km_#yyyyMMdd_HHmm").unwrap();
        assert_eq!(
            extractor.extract("GFS_Alaska_191km_20190720_0600.grib1"),
            Some(datetime!(2019-07-20 06:00))
        );
        assert_eq!(extractor.extract("NAM_20190720_0600.grib1"), None);
    }

    #[test]
    fn trailing_hash_closes_the_pattern() {
        let extractor = DateExtractor::from_mark("#yyyyMMdd#").unwrap();
        assert_eq!(
            extractor.extract("20200131.grib2"),
            Some(datetime!(2020-01-31 00:00))
        );
        assert_eq!(extractor.extract("2020013.grib2"), None);
        assert_eq!(extractor.extract("2020"), None);
    }

    #[test]
    fn ordinal_and_short_years() {
        let extractor = DateExtractor::from_mark("ruc_#yyDDDHH").unwrap();
        assert_eq!(
            extractor.extract("ruc_0903212.grb"),
            Some(datetime!(2009-02-01 12:00))
        );
    }

    #[test]
    fn unsupported_fields_are_rejected() {
        let err = DateExtractor::from_mark("#yyyyMMMdd").unwrap_err();
        assert!(err.to_string().contains("MMM"), "{err}");
        assert!(DateExtractor::from_mark("no-hash").is_err());
        assert!(DateExtractor::from_mark("x#").is_err());
    }
}
