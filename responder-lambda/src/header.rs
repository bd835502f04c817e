use crate::EventError;

use backtrace::Backtrace;
use http::header::{Entry, HOST, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

/// Response headers split into the single-value and multi-value maps used by Lambda outputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FoldedHeaders {
  /// Headers that occur exactly once.
  pub single: HeaderMap,
  /// Headers that occur more than once, with every value in its original order.
  pub multi: HeaderMap,
}

/// Split `headers` into single-value and multi-value maps.
///
/// A header name with exactly one value lands in [`FoldedHeaders::single`]. A name with several
/// values lands only in [`FoldedHeaders::multi`].
pub fn fold_headers(headers: &HeaderMap) -> FoldedHeaders {
  let mut folded = FoldedHeaders::default();
  for name in headers.keys() {
    let mut values = headers.get_all(name).iter();
    match (values.next(), values.next()) {
      (Some(value), None) => {
        folded.single.insert(name.clone(), value.clone());
      }
      (Some(_), Some(_)) => {
        for value in headers.get_all(name) {
          folded.multi.append(name.clone(), value.clone());
        }
      }
      (None, _) => {}
    }
  }
  folded
}

/// Merge single-value and multi-value header maps from a Lambda event into one header map.
///
/// Multi-value entries win: a single-value entry is dropped whenever the same name also appears in
/// `multi`.
pub fn unfold_headers(single: &HeaderMap, multi: &HeaderMap) -> HeaderMap {
  let mut headers = HeaderMap::with_capacity(single.len().max(multi.len()));
  for (name, value) in multi {
    headers.append(name.clone(), value.clone());
  }
  for (name, value) in single {
    if !multi.contains_key(name) {
      headers.append(name.clone(), value.clone());
    }
  }
  headers
}

/// Recover repeated headers from events that join them into one comma-separated value.
///
/// Each segment becomes its own header entry with leading whitespace removed. Empty segments are
/// skipped. Values that aren't visible ASCII are copied without splitting.
pub fn split_comma_joined(headers: &HeaderMap) -> Result<HeaderMap, EventError> {
  let mut split = HeaderMap::with_capacity(headers.len());
  for (name, value) in headers {
    let value_str = match value.to_str() {
      Ok(value_str) if value_str.contains(',') => value_str,
      _ => {
        split.append(name.clone(), value.clone());
        continue;
      }
    };

    for segment in value_str.split(',').filter(|segment| !segment.is_empty()) {
      let segment_value = HeaderValue::from_str(segment.trim_start()).map_err(|err| {
        EventError::InvalidHeaderValue(name.clone(), Box::new(err), Backtrace::new())
      })?;
      split.append(name.clone(), segment_value);
    }
  }
  Ok(split)
}

/// Remove the first `Host` header and return its value as the request authority.
///
/// Any additional `Host` values remain in `headers`.
pub fn take_authority(headers: &mut HeaderMap) -> Option<HeaderValue> {
  let mut hosts = match headers.entry(HOST) {
    Entry::Occupied(entry) => entry.remove_entry_mult().1.collect::<Vec<_>>().into_iter(),
    Entry::Vacant(_) => return None,
  };
  let authority = hosts.next();
  for host in hosts {
    headers.append(HOST, host);
  }
  authority
}

/// Remove every `Set-Cookie` header and return the cookie strings in order.
pub fn extract_set_cookies(headers: &mut HeaderMap) -> Result<Vec<String>, EventError> {
  let cookies = match headers.entry(SET_COOKIE) {
    Entry::Occupied(entry) => entry.remove_entry_mult().1.collect::<Vec<_>>(),
    Entry::Vacant(_) => return Ok(Vec::new()),
  };
  cookies
    .into_iter()
    .map(|cookie| {
      cookie
        .to_str()
        .map(str::to_owned)
        .map_err(|err| EventError::InvalidSetCookie(Box::new(err), Backtrace::new()))
    })
    .collect()
}
