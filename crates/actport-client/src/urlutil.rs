//! URL origin and fragment-parameter helpers.
//!
//! Fragment parameters are `name=value` pairs joined with `&` inside the
//! URL fragment, values percent-encoded. The activity request and the
//! redirect result both travel this way.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use actport_core::{ActivityError, Result};

/// Characters escaped in fragment parameter values.
const VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Origin (`scheme://host[:port]`) of an absolute URL.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| ActivityError::Protocol(format!("invalid url: {e}")))?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(ActivityError::Protocol(format!("url has an opaque origin: {url}")));
    }
    Ok(origin.ascii_serialization())
}

/// URL with any fragment removed.
pub fn remove_fragment(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

/// Value of the named fragment parameter, percent-decoded.
pub fn get_fragment_param(url: &str, name: &str) -> Option<String> {
    let (_, fragment) = url.split_once('#')?;
    for pair in fragment.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return percent_decode_str(value)
                .decode_utf8()
                .ok()
                .map(|v| v.into_owned());
        }
    }
    None
}

/// URL with `name=value` appended to the fragment.
pub fn add_fragment_param(url: &str, name: &str, value: &str) -> String {
    let encoded = utf8_percent_encode(value, VALUE_SET);
    let sep = if url.contains('#') { '&' } else { '#' };
    format!("{url}{sep}{name}={encoded}")
}

/// URL with the named fragment parameter removed; drops the fragment
/// entirely when no parameters remain.
pub fn remove_fragment_param(url: &str, name: &str) -> String {
    let Some((base, fragment)) = url.split_once('#') else {
        return url.to_string();
    };
    let kept: Vec<&str> = fragment
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k).unwrap_or(pair) != name)
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}#{}", kept.join("&"))
    }
}
