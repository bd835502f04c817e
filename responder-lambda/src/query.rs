use indexmap::IndexMap;
use itertools::Itertools;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use std::borrow::Cow;

// Characters that are escaped within a query component. Everything else from the query-safe set
// (unreserved characters plus `!$'()*+,-./:;?@_~`) stays literal. `&` and `=` delimit pairs, and
// `%` must be escaped for decoding to be the exact inverse.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'%')
  .add(b'&')
  .add(b'<')
  .add(b'=')
  .add(b'>')
  .add(b'[')
  .add(b'\\')
  .add(b']')
  .add(b'^')
  .add(b'`')
  .add(b'{')
  .add(b'|')
  .add(b'}');

/// Encode a sequence of key/value pairs as a query string (without the leading `?`).
///
/// Pairs are emitted in iteration order, so repeated keys keep their relative order.
pub fn encode_query<I, K, V>(pairs: I) -> String
where
  I: IntoIterator<Item = (K, V)>,
  K: AsRef<str>,
  V: AsRef<str>,
{
  pairs
    .into_iter()
    .map(|(key, value)| {
      format!(
        "{}={}",
        utf8_percent_encode(key.as_ref(), QUERY_COMPONENT),
        utf8_percent_encode(value.as_ref(), QUERY_COMPONENT)
      )
    })
    .join("&")
}

/// Decode a query string (without the leading `?`) into key/value pairs.
///
/// Empty pairs are skipped and a pair without `=` decodes to an empty value. Invalid
/// percent-encoded UTF-8 is replaced with `U+FFFD`.
pub fn decode_query(query: &str) -> Vec<(String, String)> {
  query
    .split('&')
    .filter(|pair| !pair.is_empty())
    .map(|pair| {
      let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
      (decode_component(key), decode_component(value))
    })
    .collect()
}

fn decode_component(component: &str) -> String {
  urlencoding::decode(component)
    .map(Cow::into_owned)
    .unwrap_or_else(|_| {
      String::from_utf8_lossy(&urlencoding::decode_binary(component.as_bytes())).into_owned()
    })
}

/// Merge the single-value and multi-value query maps of a Lambda event into ordered pairs.
///
/// Every key in `multi` contributes each of its values in order, and its entry in `single` (which
/// API Gateway fills with the last value) is dropped. The remaining single-value entries follow.
pub fn merge_query_params<S>(
  single: S,
  multi: &IndexMap<String, Vec<String>>,
) -> Vec<(String, String)>
where
  S: IntoIterator<Item = (String, String)>,
{
  let mut pairs = multi
    .iter()
    .flat_map(|(key, values)| {
      values
        .iter()
        .map(move |value| (key.to_owned(), value.to_owned()))
    })
    .collect::<Vec<_>>();
  pairs.extend(
    single
      .into_iter()
      .filter(|(key, _)| !multi.contains_key(key)),
  );
  pairs
}

#[cfg(test)]
mod tests {
  use super::{decode_query, encode_query, merge_query_params};

  use indexmap::IndexMap;
  use pretty_assertions::assert_eq;

  fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
      .iter()
      .map(|(key, value)| (key.to_string(), value.to_string()))
      .collect()
  }

  #[test]
  fn test_encode_query_escapes_delimiters() {
    let encoded = encode_query(pairs(&[("a&b", "c=d e"), ("x", "y")]));
    assert_eq!(encoded, "a%26b=c%3Dd%20e&x=y");

    assert_eq!(
      decode_query(&encoded),
      pairs(&[("a&b", "c=d e"), ("x", "y")])
    );
  }

  #[test]
  fn test_encode_query_keeps_safe_characters() {
    assert_eq!(
      encode_query([("path", "/a/b?c"), ("list", "1,2;3"), ("at", "user@host:80")]),
      "path=/a/b?c&list=1,2;3&at=user@host:80"
    );
    assert_eq!(encode_query([("pct", "100%")]), "pct=100%25");
    assert_eq!(encode_query([("name", "café")]), "name=caf%C3%A9");
    assert_eq!(encode_query(Vec::<(String, String)>::new()), "");
  }

  #[test]
  fn test_decode_query() {
    assert_eq!(
      decode_query("foo=bar1&foo=bar2&&flag&empty="),
      pairs(&[
        ("foo", "bar1"),
        ("foo", "bar2"),
        ("flag", ""),
        ("empty", "")
      ])
    );
    assert_eq!(decode_query("a=1=2"), pairs(&[("a", "1=2")]));
    assert_eq!(decode_query(""), Vec::<(String, String)>::new());
    assert_eq!(decode_query("bad=%FF"), pairs(&[("bad", "\u{FFFD}")]));
  }

  #[test]
  fn test_merge_query_params() {
    let single = pairs(&[("foo", "bar2"), ("page", "3")]);
    let mut multi = IndexMap::new();
    multi.insert(
      "foo".to_string(),
      vec!["bar1".to_string(), "bar2".to_string()],
    );

    let merged = merge_query_params(single, &multi);
    assert_eq!(
      merged,
      pairs(&[("foo", "bar1"), ("foo", "bar2"), ("page", "3")])
    );
    assert_eq!(encode_query(merged), "foo=bar1&foo=bar2&page=3");
  }
}
