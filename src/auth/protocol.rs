//! radiko wire contract.
//!
//! Every header name, request shape and response parsing rule of the
//! handshake lives here. The server does not negotiate, so a server-side
//! change should only ever need an edit in this file.

use serde::Deserialize;

use super::key::KeyRangeError;
use super::{AuthError, Region, Stage, UpgradeHandle};
use crate::config::{ClientIdentity, Endpoints};
use crate::http_client::{WireRequest, WireResponse};

pub const HEADER_APP: &str = "X-Radiko-App";
pub const HEADER_APP_VERSION: &str = "X-Radiko-App-Version";
pub const HEADER_DEVICE: &str = "X-Radiko-Device";
pub const HEADER_USER: &str = "X-Radiko-User";
pub const HEADER_AUTH_TOKEN: &str = "X-Radiko-AuthToken";
pub const HEADER_KEY_OFFSET: &str = "X-Radiko-KeyOffset";
pub const HEADER_KEY_LENGTH: &str = "X-Radiko-KeyLength";
pub const HEADER_PARTIAL_KEY: &str = "X-Radiko-PartialKey";

/// Token header on playlist requests (note the lowercase `t`).
pub const STREAM_HEADER_TOKEN: &str = "X-Radiko-Authtoken";
pub const STREAM_HEADER_AREA: &str = "X-Radiko-AreaId";

/// auth2 body meaning "outside the service area".
const OUT_OF_AREA: &str = "OUT";

/// Stage 1 result. Only the token outlives the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge {
    pub token: String,
    pub offset: usize,
    pub length: usize,
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Challenge")
            .field("token", &super::mask(&self.token))
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

pub fn login_request(endpoints: &Endpoints, mail: &str, password: &str) -> WireRequest {
    WireRequest::post_form(
        endpoints.login.clone(),
        vec![
            ("mail".to_string(), mail.to_string()),
            ("pass".to_string(), password.to_string()),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    radiko_session: Option<String>,
    areafree: Option<serde_json::Value>,
}

pub fn parse_login(response: &WireResponse) -> Result<UpgradeHandle, AuthError> {
    if !response.is_success() {
        return Err(AuthError::Credential(format!(
            "login rejected with HTTP {}",
            response.status
        )));
    }

    let login: LoginResponse =
        serde_json::from_str(&response.body).map_err(|e| AuthError::Protocol {
            stage: Stage::Login,
            detail: format!("unreadable login response: {e}"),
        })?;

    let session_id = login
        .radiko_session
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::Credential("no session issued".to_string()))?;

    let area_free = match login.areafree {
        Some(serde_json::Value::String(s)) => s == "1",
        Some(serde_json::Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    };
    if !area_free {
        return Err(AuthError::Credential(
            "account has no area-free entitlement".to_string(),
        ));
    }

    Ok(UpgradeHandle {
        session_id,
        area_free,
    })
}

pub fn challenge_request(endpoints: &Endpoints, identity: &ClientIdentity) -> WireRequest {
    WireRequest::get(endpoints.auth1.clone())
        .header(HEADER_APP, identity.app.clone())
        .header(HEADER_APP_VERSION, identity.app_version.clone())
        .header(HEADER_DEVICE, identity.device.clone())
        .header(HEADER_USER, identity.user.clone())
}

pub fn parse_challenge(response: &WireResponse) -> Result<Challenge, AuthError> {
    if !response.is_success() {
        return Err(AuthError::Protocol {
            stage: Stage::Challenge,
            detail: format!("HTTP {}", response.status),
        });
    }

    let token = required_header(response, HEADER_AUTH_TOKEN)?;
    let offset = required_header(response, HEADER_KEY_OFFSET)?;
    let length = required_header(response, HEADER_KEY_LENGTH)?;

    Ok(Challenge {
        token: token.to_string(),
        offset: parse_key_number("offset", offset)?,
        length: parse_key_number("length", length)?,
    })
}

fn required_header<'a>(response: &'a WireResponse, name: &str) -> Result<&'a str, AuthError> {
    response
        .header(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Protocol {
            stage: Stage::Challenge,
            detail: format!("missing {name} header"),
        })
}

fn parse_key_number(field: &'static str, raw: &str) -> Result<usize, AuthError> {
    let value: i64 = raw.parse().map_err(|_| AuthError::Protocol {
        stage: Stage::Challenge,
        detail: format!("key {field} is not a number: {raw:?}"),
    })?;
    usize::try_from(value).map_err(|_| KeyRangeError::Negative { field, value }.into())
}

pub fn respond_request(
    endpoints: &Endpoints,
    identity: &ClientIdentity,
    token: &str,
    partial_key: &str,
    upgrade: Option<&UpgradeHandle>,
) -> WireRequest {
    let url = match upgrade {
        Some(handle) => format!(
            "{}?radiko_session={}",
            endpoints.auth2,
            urlencoding::encode(&handle.session_id)
        ),
        None => endpoints.auth2.clone(),
    };

    WireRequest::get(url)
        .header(HEADER_APP, identity.app.clone())
        .header(HEADER_APP_VERSION, identity.app_version.clone())
        .header(HEADER_DEVICE, identity.device.clone())
        .header(HEADER_USER, identity.user.clone())
        .header(HEADER_AUTH_TOKEN, token)
        .header(HEADER_PARTIAL_KEY, partial_key)
}

/// auth2 body: `JP13,JP,Tokyo` style text; denial sentinel wins over status.
pub fn parse_region(response: &WireResponse) -> Result<Region, AuthError> {
    let body = response.body.trim();
    if body.is_empty() || body == OUT_OF_AREA {
        return Err(AuthError::RegionDenied);
    }

    if !response.is_success() {
        return Err(AuthError::Protocol {
            stage: Stage::Respond,
            detail: format!("HTTP {}", response.status),
        });
    }

    let area = body
        .lines()
        .next()
        .and_then(|line| line.split(',').next())
        .map(str::trim)
        .unwrap_or_default();

    if area.is_empty() {
        return Err(AuthError::Protocol {
            stage: Stage::Respond,
            detail: format!("no area id in response body {body:?}"),
        });
    }
    if area == OUT_OF_AREA {
        return Err(AuthError::RegionDenied);
    }

    Ok(Region::new(area))
}

pub fn logout_request(endpoints: &Endpoints, handle: &UpgradeHandle) -> WireRequest {
    WireRequest::post_form(
        endpoints.logout.clone(),
        vec![("radiko_session".to_string(), handle.session_id.clone())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::Method;

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> WireResponse {
        WireResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: body.to_string(),
        }
    }

    #[test]
    fn challenge_headers_carry_identity() {
        let request = challenge_request(&Endpoints::default(), &ClientIdentity::default());
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url, "https://radiko.jp/v2/api/auth1");
        let names: Vec<&str> = request.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            [HEADER_APP, HEADER_APP_VERSION, HEADER_DEVICE, HEADER_USER]
        );
        assert_eq!(request.header_value(HEADER_APP), Some("pc_html5"));
        assert_eq!(request.header_value(HEADER_USER), Some("dummy_user"));
    }

    #[test]
    fn challenge_parsed_from_headers() {
        let resp = response(
            200,
            &[
                ("x-radiko-authtoken", "tok123"),
                ("x-radiko-keyoffset", "8"),
                ("x-radiko-keylength", " 16 "),
            ],
            "please send a partial key",
        );
        let challenge = parse_challenge(&resp).unwrap();
        assert_eq!(challenge.token, "tok123");
        assert_eq!(challenge.offset, 8);
        assert_eq!(challenge.length, 16);
    }

    #[test]
    fn challenge_missing_field_is_protocol_error() {
        let resp = response(
            200,
            &[("X-Radiko-AuthToken", "tok"), ("X-Radiko-KeyOffset", "8")],
            "",
        );
        match parse_challenge(&resp) {
            Err(AuthError::Protocol { stage, detail }) => {
                assert_eq!(stage, Stage::Challenge);
                assert!(detail.contains(HEADER_KEY_LENGTH));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn challenge_negative_offset_is_range_error() {
        let resp = response(
            200,
            &[
                ("X-Radiko-AuthToken", "tok"),
                ("X-Radiko-KeyOffset", "-4"),
                ("X-Radiko-KeyLength", "16"),
            ],
            "",
        );
        assert!(matches!(
            parse_challenge(&resp),
            Err(AuthError::Range(KeyRangeError::Negative {
                field: "offset",
                value: -4
            }))
        ));
    }

    #[test]
    fn challenge_garbage_number_is_protocol_error() {
        let resp = response(
            200,
            &[
                ("X-Radiko-AuthToken", "tok"),
                ("X-Radiko-KeyOffset", "eight"),
                ("X-Radiko-KeyLength", "16"),
            ],
            "",
        );
        assert!(matches!(
            parse_challenge(&resp),
            Err(AuthError::Protocol { .. })
        ));
    }

    #[test]
    fn region_is_first_field_of_first_line() {
        let resp = response(200, &[], "JP13,JP,Tokyo\nsecond line\n");
        assert_eq!(parse_region(&resp).unwrap().as_str(), "JP13");
    }

    #[test]
    fn region_sentinels_are_denials_whatever_the_status() {
        for status in [200, 401, 500] {
            for body in ["OUT", "", "  OUT\r\n", "\n"] {
                assert!(
                    matches!(
                        parse_region(&response(status, &[], body)),
                        Err(AuthError::RegionDenied)
                    ),
                    "status {status} body {body:?}"
                );
            }
        }
    }

    #[test]
    fn region_error_status_with_body_is_protocol_error() {
        assert!(matches!(
            parse_region(&response(403, &[], "forbidden")),
            Err(AuthError::Protocol {
                stage: Stage::Respond,
                ..
            })
        ));
    }

    #[test]
    fn respond_request_appends_session_when_upgraded() {
        let handle = UpgradeHandle {
            session_id: "s e/ss".to_string(),
            area_free: true,
        };
        let request = respond_request(
            &Endpoints::default(),
            &ClientIdentity::default(),
            "tok",
            "a2V5",
            Some(&handle),
        );
        assert_eq!(
            request.url,
            "https://radiko.jp/v2/api/auth2?radiko_session=s%20e%2Fss"
        );
        assert_eq!(request.header_value(HEADER_AUTH_TOKEN), Some("tok"));
        assert_eq!(request.header_value(HEADER_PARTIAL_KEY), Some("a2V5"));
        assert_eq!(request.header_value(HEADER_DEVICE), Some("pc"));
    }

    #[test]
    fn login_request_is_form_encoded() {
        let request = login_request(&Endpoints::default(), "me@example.com", "pw");
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.form,
            vec![
                ("mail".to_string(), "me@example.com".to_string()),
                ("pass".to_string(), "pw".to_string())
            ]
        );
    }

    #[test]
    fn login_accepts_string_or_number_entitlement() {
        for body in [
            r#"{"radiko_session":"abc","areafree":"1"}"#,
            r#"{"radiko_session":"abc","areafree":1}"#,
        ] {
            let handle = parse_login(&response(200, &[], body)).unwrap();
            assert_eq!(handle.session_id, "abc");
            assert!(handle.area_free);
        }
    }

    #[test]
    fn login_without_entitlement_is_credential_error() {
        let body = r#"{"radiko_session":"abc","areafree":"0"}"#;
        assert!(matches!(
            parse_login(&response(200, &[], body)),
            Err(AuthError::Credential(_))
        ));
        assert!(matches!(
            parse_login(&response(401, &[], "{}")),
            Err(AuthError::Credential(_))
        ));
        assert!(matches!(
            parse_login(&response(200, &[], "<html>")),
            Err(AuthError::Protocol {
                stage: Stage::Login,
                ..
            })
        ));
    }

    #[test]
    fn logout_posts_session() {
        let handle = UpgradeHandle {
            session_id: "abc".to_string(),
            area_free: true,
        };
        let request = logout_request(&Endpoints::default(), &handle);
        assert_eq!(request.url, "https://radiko.jp/v4/api/member/logout");
        assert_eq!(
            request.form,
            vec![("radiko_session".to_string(), "abc".to_string())]
        );
    }
}
