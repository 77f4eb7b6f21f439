//! Portal actions and the response record each one decodes into
//!
//! Every portal response is wrapped in a `{"js": ..., "text": ...}` envelope
//! whose `js` payload changes shape with the action. Each action gets one
//! named record here; [`decode`] turns a body into the record or a
//! `Protocol` error that keeps the body out of log output.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalAction {
    Handshake,
    DoAuth,
    GetProfile,
    Logout,
    GetGenres,
    GetAllChannels,
    CreateLink,
}

impl PortalAction {
    /// Value of the `type` query parameter
    pub fn kind(self) -> &'static str {
        match self {
            Self::Handshake | Self::DoAuth | Self::GetProfile | Self::Logout => "stb",
            Self::GetGenres | Self::GetAllChannels | Self::CreateLink => "itv",
        }
    }

    /// Value of the `action` query parameter
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::DoAuth => "do_auth",
            Self::GetProfile => "get_profile",
            Self::Logout => "logout",
            Self::GetGenres => "get_genres",
            Self::GetAllChannels => "get_all_channels",
            Self::CreateLink => "create_link",
        }
    }

    /// Recognize an action from a request's `type` and `action` parameters
    pub fn from_query(kind: &str, action: &str) -> Option<Self> {
        [
            Self::Handshake,
            Self::DoAuth,
            Self::GetProfile,
            Self::Logout,
            Self::GetGenres,
            Self::GetAllChannels,
            Self::CreateLink,
        ]
        .into_iter()
        .find(|a| a.kind().eq_ignore_ascii_case(kind) && a.as_str().eq_ignore_ascii_case(action))
    }
}

impl std::fmt::Display for PortalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode `body` as the record of `action`.
pub fn decode<T: DeserializeOwned>(action: PortalAction, body: &str) -> AppResult<T> {
    serde_json::from_str(body).map_err(|e| {
        // serde messages can quote body fragments; only report where it broke
        AppError::protocol(
            action.as_str(),
            format!(
                "malformed response ({:?} at line {} column {})",
                e.classify(),
                e.line(),
                e.column()
            ),
            body,
        )
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeResponse {
    /// A null or missing payload means no new token
    #[serde(rename = "js", default, deserialize_with = "object_or_default")]
    pub session: HandshakeSession,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeSession {
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    /// Only a literal `true` counts as success
    #[serde(rename = "js", default, deserialize_with = "true_only")]
    pub ok: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(rename = "js", default, deserialize_with = "object_or_default")]
    pub profile: StbProfile,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StbProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "fname", default, deserialize_with = "lenient_string")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenresResponse {
    #[serde(rename = "js", default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Genre {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsResponse {
    #[serde(rename = "js")]
    pub listing: ChannelListing,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelListing {
    #[serde(default)]
    pub data: Vec<PortalChannel>,
}

/// One entry of `get_all_channels`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalChannel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cmd: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logo: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tv_genre_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLinkResponse {
    #[serde(rename = "js")]
    pub link: CreatedLink,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedLink {
    #[serde(default, deserialize_with = "lenient_string")]
    pub cmd: String,
}

impl CreateLinkResponse {
    /// The playable URL: the last whitespace separated token of `cmd`
    /// (`"ffmpeg http://host/stream"` -> `"http://host/stream"`)
    pub fn playable_url(&self) -> Option<&str> {
        playable_url(&self.link.cmd)
    }
}

/// Last whitespace separated token of a channel command
pub fn playable_url(cmd: &str) -> Option<&str> {
    cmd.split_whitespace().last()
}

/// Strings, numbers and booleans as text; null and anything else as empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn true_only<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// Portals send `[]`, `false` or `null` where an object is expected
fn object_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_lookup() {
        assert_eq!(
            PortalAction::from_query("stb", "handshake"),
            Some(PortalAction::Handshake)
        );
        assert_eq!(
            PortalAction::from_query("ITV", "create_link"),
            Some(PortalAction::CreateLink)
        );
        assert_eq!(PortalAction::from_query("itv", "handshake"), None);
        assert_eq!(PortalAction::from_query("stb", "get_events"), None);
    }

    #[test]
    fn test_handshake_token_shapes() {
        let r: HandshakeResponse =
            decode(PortalAction::Handshake, r#"{"js":{"token":"XYZ"}}"#).unwrap();
        assert_eq!(r.session.token, "XYZ");

        let r: HandshakeResponse = decode(PortalAction::Handshake, r#"{"js":{}}"#).unwrap();
        assert!(r.session.token.is_empty());

        let r: HandshakeResponse =
            decode(PortalAction::Handshake, r#"{"js":{"token":null}}"#).unwrap();
        assert!(r.session.token.is_empty());

        for body in [r#"{"js":null}"#, "{}", r#"{"js":[]}"#] {
            let r: HandshakeResponse = decode(PortalAction::Handshake, body).unwrap();
            assert!(r.session.token.is_empty(), "{body}");
        }

        assert!(matches!(
            decode::<HandshakeResponse>(PortalAction::Handshake, "<html>secret</html>"),
            Err(AppError::Protocol { .. })
        ));
    }

    #[test]
    fn test_auth_only_true_is_success() {
        let r: AuthResponse =
            decode(PortalAction::DoAuth, r#"{"js":true,"text":"welcome"}"#).unwrap();
        assert!(r.ok);
        assert_eq!(r.text, "welcome");

        for body in [
            r#"{"js":false,"text":"bad password"}"#,
            r#"{"js":"true"}"#,
            r#"{"text":"nothing"}"#,
        ] {
            let r: AuthResponse = decode(PortalAction::DoAuth, body).unwrap();
            assert!(!r.ok, "{body}");
        }
    }

    #[test]
    fn test_profile_id_shapes() {
        let r: ProfileResponse =
            decode(PortalAction::GetProfile, r#"{"js":{"id":42,"fname":"A"}}"#).unwrap();
        assert_eq!(r.profile.id, "42");
        assert_eq!(r.profile.name, "A");

        let r: ProfileResponse =
            decode(PortalAction::GetProfile, r#"{"js":[],"text":"unknown device"}"#).unwrap();
        assert!(r.profile.id.is_empty());
        assert_eq!(r.text, "unknown device");
    }

    #[test]
    fn test_channel_listing() {
        let body = r#"{"js":{"total_items":2,"data":[
            {"id":"1","name":"News","cmd":"ffrt http://localhost/ch/1","logo":"1.png","tv_genre_id":"3"},
            {"id":2,"name":"Sport","cmd":"ffrt http://localhost/ch/2","logo":null,"tv_genre_id":4}
        ]}}"#;
        let r: ChannelsResponse = decode(PortalAction::GetAllChannels, body).unwrap();
        assert_eq!(r.listing.data.len(), 2);
        assert_eq!(r.listing.data[1].id, "2");
        assert_eq!(r.listing.data[1].tv_genre_id, "4");
        assert!(r.listing.data[1].logo.is_empty());
    }

    #[test]
    fn test_playable_url() {
        let r: CreateLinkResponse = decode(
            PortalAction::CreateLink,
            r#"{"js":{"cmd":"ffmpeg http://cdn.example/live/1.m3u8?t=abc"}}"#,
        )
        .unwrap();
        assert_eq!(
            r.playable_url(),
            Some("http://cdn.example/live/1.m3u8?t=abc")
        );
        assert_eq!(playable_url("   "), None);
    }
}
