//! Codec-specific parameter matching rules.

use std::collections::BTreeMap;

type Params = BTreeMap<String, String>;

/// Checks two codec parameter sets for compatibility under the codec's
/// matching rule.
pub(crate) fn params_match(mime_type: &str, a: &Params, b: &Params) -> bool {
    if mime_type.eq_ignore_ascii_case("video/h264") {
        h264_params_match(a, b)
    } else {
        params_consist(a, b)
    }
}

/// Generic rule: parameters defined on both sides must be equal
/// (case-insensitive); one-sided parameters are compatible.
fn params_consist(a: &Params, b: &Params) -> bool {
    for (k, v) in a {
        if let Some(vb) = b.get(k) {
            if !vb.eq_ignore_ascii_case(v) {
                return false;
            }
        }
    }
    true
}

/// H264 rule: packetization-mode must agree exactly, and profile-level-id is
/// compared on its profile part only (profile_idc plus profile_iop), ignoring
/// the level byte so that asymmetric levels still interoperate.
fn h264_params_match(a: &Params, b: &Params) -> bool {
    if a.get("packetization-mode") != b.get("packetization-mode") {
        return false;
    }

    match (a.get("profile-level-id"), b.get("profile-level-id")) {
        (None, None) => true,
        (Some(x), Some(y)) => match (profile_of(x), profile_of(y)) {
            (Some(px), Some(py)) => px == py,
            _ => false,
        },
        _ => false,
    }
}

/// The profile_idc/profile_iop part of a profile-level-id: the first four of
/// its six hex digits.
fn profile_of(profile_level_id: &str) -> Option<String> {
    let s = profile_level_id.trim().to_ascii_lowercase();
    if s.len() != 6 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(s[..4].to_owned())
}
