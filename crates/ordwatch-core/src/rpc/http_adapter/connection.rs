use std::path::Path;

use reqwest::Url;

use crate::error::CoreError;

type Credentials = (String, String);

/// Pick RPC credentials.
///
/// Precedence: explicit `user` + `pass`, then the node's cookie file, then
/// no auth at all.
pub(super) fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
    cookie_file: Option<&Path>,
) -> Result<Option<Credentials>, CoreError> {
    match (user, pass, cookie_file) {
        (Some(u), Some(p), _) => Ok(Some((u.to_owned(), p.to_owned()))),
        (Some(_), None, _) | (None, Some(_), _) => Err(CoreError::Config(
            "both rpc user and rpc pass must be set together".to_owned(),
        )),
        (None, None, Some(path)) => read_cookie(path).map(Some),
        (None, None, None) => Ok(None),
    }
}

fn read_cookie(path: &Path) -> Result<Credentials, CoreError> {
    let invalid = |reason: &str| {
        CoreError::Config(format!("rpc cookie file {}: {reason}", path.display()))
    };

    let content = std::fs::read_to_string(path).map_err(|e| invalid(&e.to_string()))?;
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| invalid("file is empty"))?;

    match line.split_once(':') {
        Some((user, pass)) if !user.is_empty() && !pass.is_empty() => {
            Ok((user.to_owned(), pass.to_owned()))
        }
        _ => Err(invalid("expected non-empty `username:password`")),
    }
}

/// Normalize the RPC endpoint. A bare `host:port` is taken to mean plain
/// HTTP, which is how a local node is normally addressed.
pub(super) fn parse_connection(connection: &str) -> Result<String, CoreError> {
    let candidate = if connection.contains("://") {
        connection.to_owned()
    } else {
        format!("http://{connection}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| {
        CoreError::Config(format!(
            "invalid connection `{connection}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(candidate),
        other => Err(CoreError::Config(format!(
            "unsupported connection scheme `{other}`; expected http or https"
        ))),
    }
}
