//! Redis URL parsing.
//!
//! Supported forms:
//! - `redis://[[username:]password@]host[:port][/database][?query]`
//! - `rediss://[[username:]password@]host[:port][/database][?query]`
//!
//! Recognized query keys are `timeout`, `read_write_timeout`, `persistent`
//! and `prefix`; anything else is ignored.

use crate::error::{ConnectionError, ConnectionResult};
use crate::params::{parse_bool, Auth, PartialParams};
use url::Url;

pub const PLAIN_SCHEME: &str = "redis";
pub const TLS_SCHEME: &str = "rediss";

/// Parse a Redis URL into the parameters it specifies.
pub fn parse_url(raw: &str) -> ConnectionResult<PartialParams> {
    let url = Url::parse(raw)
        .map_err(|e| ConnectionError::configuration(format!("Invalid Redis URL: {} ({})", raw, e)))?;

    let mut params = PartialParams::default();

    match url.scheme() {
        PLAIN_SCHEME => {}
        TLS_SCHEME => params.ssl = Some(true),
        other => {
            return Err(ConnectionError::configuration(format!(
                "Invalid Redis URL scheme: {}",
                other
            )))
        }
    }

    if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
        params.host = Some(host.to_string());
    }
    params.port = url.port();
    params.auth = parse_auth(&url)?;
    params.database = parse_database(url.path());

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "timeout" => params.timeout = Some(parse_seconds("timeout", &value)?),
            "read_write_timeout" => {
                params.read_write_timeout = Some(parse_seconds("read_write_timeout", &value)?)
            }
            "persistent" => params.persistent = Some(parse_bool(&value)),
            "prefix" => params.prefix = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(params)
}

fn parse_auth(url: &Url) -> ConnectionResult<Option<Auth>> {
    let Some(password) = url.password() else {
        return Ok(None);
    };
    let password = decode(password)?;
    let username = decode(url.username())?;

    if username.is_empty() {
        Ok(Some(Auth::Password(password)))
    } else {
        Ok(Some(Auth::UserPassword { username, password }))
    }
}

fn decode(component: &str) -> ConnectionResult<String> {
    urlencoding::decode(component)
        .map(|s| s.into_owned())
        .map_err(|e| ConnectionError::configuration(format!("Invalid credentials encoding: {}", e)))
}

/// Database index from the path; anything but a plain integer is ignored.
fn parse_database(path: &str) -> Option<u32> {
    let index = path.trim_start_matches('/');
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

fn parse_seconds(key: &str, value: &str) -> ConnectionResult<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        ConnectionError::configuration(format!("Invalid value for '{}': {}", key, value))
    })
}
