//! Date helper functions

use chrono::{DateTime, Locale, Utc};
use chrono_tz::Tz;

use crate::config::SiteConfig;

/// Formats dates with the site's pattern, locale and timezone
#[derive(Debug, Clone)]
pub struct DateFormatter {
    pattern: String,
    locale: Locale,
    timezone: Tz,
}

impl DateFormatter {
    pub fn new(pattern: &str, language: &str, timezone: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            locale: parse_locale(language),
            timezone: parse_timezone(timezone),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(&config.date_format, &config.language, &config.timezone)
    }

    /// Format with the site's default pattern
    pub fn format(&self, date: &DateTime<Utc>) -> String {
        self.format_with(date, &self.pattern)
    }

    /// Format with a date-fns style pattern
    ///
    /// # Examples
    /// ```ignore
    /// formatter.format_with(&date, "dd MMM yyyy") // -> "15 mar 2021"
    /// ```
    pub fn format_with(&self, date: &DateTime<Utc>, pattern: &str) -> String {
        let chrono_format = date_fns_to_chrono_format(pattern);
        date.with_timezone(&self.timezone)
            .format_localized(&chrono_format, self.locale)
            .to_string()
    }
}

/// Parse a locale name such as `pt_BR` or `pt-BR`, falling back to POSIX
fn parse_locale(language: &str) -> Locale {
    let name = language.replace('-', "_");
    Locale::try_from(name.as_str()).unwrap_or_else(|_| {
        tracing::warn!("Unknown language {:?}, using POSIX dates", language);
        Locale::POSIX
    })
}

/// Parse an IANA timezone name; empty means UTC
fn parse_timezone(timezone: &str) -> Tz {
    if timezone.is_empty() {
        return Tz::UTC;
    }
    timezone.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!("Unknown timezone {:?}, using UTC", timezone);
        Tz::UTC
    })
}

/// Convert a date-fns format string to a chrono format string.
/// Text in single quotes is copied literally.
fn date_fns_to_chrono_format(pattern: &str) -> String {
    let mut result = String::with_capacity(pattern.len() * 2);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut result, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut result, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let token: String = std::iter::repeat(c).take(run).collect();
        let replacement = match token.as_str() {
            "yyyy" => "%Y",
            "yy" => "%y",
            "MMMM" => "%B",
            "MMM" => "%b",
            "MM" => "%m",
            "M" => "%-m",
            "dd" => "%d",
            "d" => "%-d",
            "HH" => "%H",
            "H" => "%-H",
            "hh" => "%I",
            "mm" => "%M",
            "ss" => "%S",
            "EEEE" => "%A",
            "E" | "EE" | "EEE" => "%a",
            "a" => "%p",
            _ => {
                token.chars().for_each(|t| push_literal(&mut result, t));
                i += run;
                continue;
            }
        };
        result.push_str(replacement);
        i += run;
    }

    result
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
