//! OAuth redirect into the Device Access partner connections flow.

use nestlink_core::config::endpoints::PARTNER_CONNECTIONS;

/// Partner connections authorization URL for `project_id`.
///
/// The incoming query is kept as is, except that `access_type=offline` and
/// `prompt=consent` are always set so Google issues a refresh token.
pub fn authorization_url(project_id: &str, query: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .filter(|(key, _)| key != "access_type" && key != "prompt")
        .collect();

    pairs.push(("access_type".to_string(), "offline".to_string()));
    pairs.push(("prompt".to_string(), "consent".to_string()));

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}/{}/auth?{}",
        PARTNER_CONNECTIONS,
        urlencoding::encode(project_id),
        query
    )
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
