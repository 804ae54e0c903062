//! Basic and token authorization.
//!
//! Both answer `401` with a `WWW-Authenticate` challenge when the validator
//! rejects the request, and pass it on otherwise.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::error::Result;
use crate::http::context::RouteContext;
use crate::http::request::{Request, USER_ATTR};

/// Validate `Authorization: Basic` credentials.
///
/// The validator sees `None` for whatever part is missing or undecodable.
/// An accepted user name is stored in the `user` request attribute.
pub fn basic_auth<V>(
    realm: &str,
    validator: V,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static
where
    V: Fn(Option<&str>, Option<&str>) -> bool + Send + Sync + 'static,
{
    let challenge = format!("Basic realm=\"{}\"", realm);
    move |ctx| {
        let (username, password) = match basic_credentials(&ctx.req) {
            Some((user, pass)) => (Some(user), pass),
            None => (None, None),
        };

        if validator(username.as_deref(), password.as_deref()) {
            if let Some(username) = username {
                ctx.req.attributes_mut().insert(USER_ATTR, username);
            }
            return Ok(false);
        }
        challenge_response(ctx, &challenge)
    }
}

/// Validate `Authorization: token="..."`.
pub fn token_auth<V>(
    realm: &str,
    validator: V,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static
where
    V: Fn(Option<&str>, &Request) -> bool + Send + Sync + 'static,
{
    let challenge = format!("Basic realm=\"{}\"", realm);
    move |ctx| {
        let token = token(&ctx.req);
        if validator(token.as_deref(), &ctx.req) {
            return Ok(false);
        }
        challenge_response(ctx, &challenge)
    }
}

fn challenge_response(ctx: &mut RouteContext, challenge: &str) -> Result<bool> {
    debug!(path = %ctx.req.path(), "Authorization rejected");
    ctx.res.set_header("WWW-Authenticate", challenge)?;
    ctx.res.send_status(401)?;
    Ok(true)
}

/// Decoded user name and optional password.
fn basic_credentials(req: &Request) -> Option<(String, Option<String>)> {
    let header = req.header("authorization")?;
    let (scheme, data) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(data.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    match decoded.split_once(':') {
        Some((user, pass)) => Some((user.to_string(), Some(pass.to_string()))),
        None => Some((decoded, None)),
    }
}

fn token(req: &Request) -> Option<String> {
    let header = req.header("authorization")?;
    let (kind, token) = header.split_once('=')?;
    if kind.trim() != "token" {
        return None;
    }
    let token = token.trim();
    let token = token.strip_prefix('"').unwrap_or(token);
    let token = token.strip_suffix('"').unwrap_or(token);
    Some(token.to_string())
}
