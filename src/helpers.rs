use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::io::{BufRead, Write};
use url::Url;

use crate::error::{Error, Result};

pub(crate) const MAX_PAGE_SIZE: u32 = 1000;

/// Number of `$top=page_size` requests needed to cover `total` records.
pub(crate) fn page_count(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size))
}

pub(crate) fn validate_page_size(page_size: u32) -> Result<u32> {
    if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        Ok(page_size)
    } else {
        Err(Error::InvalidPageSize(page_size.to_string()))
    }
}

/// Asks the operator for a page size on `output` and reads one line from `input`.
pub(crate) fn prompt_page_size<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<u32> {
    write!(output, "Page size (1-{}): ", MAX_PAGE_SIZE)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim();

    let page_size = trimmed
        .parse::<u32>()
        .map_err(|_| Error::InvalidPageSize(trimmed.to_string()))?;
    validate_page_size(page_size)
}

/// Pulls the `$skiptoken` out of an `@odata.nextLink`, verbatim.
pub(crate) fn skiptoken_from_next_link(next_link: &str) -> Result<String> {
    let url = match Url::parse(next_link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/")?.join(next_link)?
        }
        Err(e) => return Err(e.into()),
    };

    url.query_pairs()
        .find(|(key, _)| key == "$skiptoken")
        .map(|(_, token)| token.into_owned())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::MissingSkipToken(next_link.to_string()))
}

/// `now - skew`, as whole-second UTC ISO-8601 (`2019-10-15T12:00:00Z`).
pub(crate) fn watermark(now: DateTime<Utc>, skew_minutes: i64) -> Result<String> {
    Duration::try_minutes(skew_minutes)
        .and_then(|skew| now.checked_sub_signed(skew))
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| {
            Error::InvalidInput(format!("watermark skew of {} minutes is out of range", skew_minutes))
        })
}
