use std::collections::HashMap;
use std::fmt::Write as _;

use foundation::MapLocation;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::request::DeepLinkRequest;

/// Characters escaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `layers` keeps its channel separators readable.
const LAYERS: &AsciiSet = &COMPONENT.remove(b',');

/// Fragment keys, in the order `encode` writes them.
pub mod keys {
    pub const INSTANCE_ID: &str = "instanceId";
    pub const DATASOURCE: &str = "datasource";
    pub const PRESET: &str = "preset";
    pub const LAYERS: &str = "layers";
    pub const TIME: &str = "time";
    pub const EVALSCRIPT: &str = "evalscript";
    pub const EVALSCRIPT_URL: &str = "evalscripturl";
    pub const GAIN: &str = "gain";
    pub const GAMMA: &str = "gamma";
    pub const ATM_FILTER: &str = "atmFilter";
    pub const LAT: &str = "lat";
    pub const LNG: &str = "lng";
    pub const ZOOM: &str = "zoom";
}

/// Strip an optional `#`, one leading `/` and one trailing `/`.
fn trim_fragment(text: &str) -> &str {
    let text = text.strip_prefix('#').unwrap_or(text);
    let text = text.strip_prefix('/').unwrap_or(text);
    text.strip_suffix('/').unwrap_or(text)
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Split a fragment into its key/value pairs.
///
/// Values are percent-decoded. A pair without `=` maps to `None`; empty
/// pairs are skipped and a repeated key keeps its last value.
pub fn fragment_params(fragment: &str) -> HashMap<&str, Option<String>> {
    trim_fragment(fragment)
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key, Some(decode_component(value))),
            None => (pair, None),
        })
        .collect()
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            tracing::debug!("ignoring non-numeric fragment value {raw:?}");
            None
        }
    }
}

fn parse_zoom(raw: Option<&str>) -> Option<u8> {
    let zoom = parse_number(raw)?.trunc();
    (0.0..=f64::from(u8::MAX)).contains(&zoom).then_some(zoom as u8)
}

/// Decode the fragment text (the part after `#`) into a request.
pub fn decode(fragment: &str) -> DeepLinkRequest {
    let mut params = fragment_params(fragment);
    let mut take = |key: &str| params.remove(key).flatten();

    let location = {
        let lat = parse_number(take(keys::LAT).as_deref());
        let lng = parse_number(take(keys::LNG).as_deref());
        let zoom = parse_zoom(take(keys::ZOOM).as_deref());
        match (lat, lng) {
            (Some(lat), Some(lng)) => MapLocation::from_coords(lat, lng, zoom),
            _ => None,
        }
    };

    DeepLinkRequest {
        instance_id: take(keys::INSTANCE_ID),
        datasource: take(keys::DATASOURCE),
        preset: take(keys::PRESET),
        time: take(keys::TIME),
        // Evalscripts are encoded twice by `encode`, so they are decoded twice.
        evalscript: take(keys::EVALSCRIPT).map(|script| decode_component(&script)),
        evalscript_url: take(keys::EVALSCRIPT_URL),
        gain: parse_number(take(keys::GAIN).as_deref()),
        gamma: parse_number(take(keys::GAMMA).as_deref()),
        atm_filter: take(keys::ATM_FILTER),
        raw_layers: take(keys::LAYERS),
        location,
    }
}

/// Decode the fragment of a full URL. A URL without `#` is "no deep link".
pub fn decode_url(url: &str) -> DeepLinkRequest {
    match url.split_once('#') {
        Some((_, fragment)) => decode(fragment),
        None => DeepLinkRequest::default(),
    }
}

/// Encode a request as fragment text (without the leading `#`).
pub fn encode(request: &DeepLinkRequest) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    let mut push = |key: &'static str, value: Option<String>| {
        if let Some(value) = value {
            pairs.push((key, value));
        }
    };

    let text = |value: &Option<String>| value.as_deref().map(encode_component);

    push(keys::INSTANCE_ID, text(&request.instance_id));
    push(keys::DATASOURCE, text(&request.datasource));
    push(keys::PRESET, text(&request.preset));
    push(
        keys::LAYERS,
        request
            .raw_layers
            .as_deref()
            .map(|layers| utf8_percent_encode(layers, LAYERS).to_string()),
    );
    push(keys::TIME, text(&request.time));
    push(
        keys::EVALSCRIPT,
        request
            .evalscript
            .as_deref()
            .map(|script| encode_component(&encode_component(script))),
    );
    push(keys::EVALSCRIPT_URL, text(&request.evalscript_url));
    push(keys::GAIN, request.gain.map(|v| v.to_string()));
    push(keys::GAMMA, request.gamma.map(|v| v.to_string()));
    push(keys::ATM_FILTER, text(&request.atm_filter));
    if let Some(location) = request.location {
        push(keys::LAT, Some(location.lat.to_string()));
        push(keys::LNG, Some(location.lng.to_string()));
        push(keys::ZOOM, location.zoom.map(|z| z.to_string()));
    }

    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        let _ = write!(out, "{key}={value}");
    }
    out
}
