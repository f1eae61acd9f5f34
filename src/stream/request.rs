//! Time-free playlist request construction.
//!
//! Pure: no I/O. The builder turns a station, a window and a session into the
//! URL + headers ffmpeg is pointed at.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;
use thiserror::Error;
use url::Url;

use super::window::StreamWindow;
use crate::auth::protocol::{STREAM_HEADER_AREA, STREAM_HEADER_TOKEN};
use crate::auth::Session;

/// Size of the random block the tracking digest is computed over.
const TRACKING_SEED_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid station id {0:?}")]
    InvalidStation(String),

    #[error("invalid playlist endpoint {0:?}")]
    InvalidEndpoint(String),
}

/// Per-request `lsid`: 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackingValue(String);

impl TrackingValue {
    /// MD5 over the base64 text of 100 fresh random bytes.
    pub fn generate() -> Self {
        let mut seed = [0u8; TRACKING_SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    fn from_seed(seed: &[u8]) -> Self {
        let encoded = STANDARD.encode(seed);
        Self(hex::encode(Md5::digest(encoded.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TrackingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrackingValue").field(&self.0).finish()
    }
}

/// Everything needed to fetch one program.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub station_id: String,
    pub window: StreamWindow,
    pub url: String,
    /// Transport headers, in the order they are sent.
    pub headers: Vec<(String, String)>,
    pub tracking: TrackingValue,
}

/// Builds [`StreamDescriptor`]s against a playlist endpoint.
#[derive(Debug, Clone)]
pub struct StreamRequestBuilder {
    playlist: String,
}

impl StreamRequestBuilder {
    pub fn new(playlist_endpoint: impl Into<String>) -> Self {
        Self {
            playlist: playlist_endpoint.into(),
        }
    }

    /// Build a descriptor with a freshly generated tracking value.
    pub fn build(
        &self,
        station_id: &str,
        window: &StreamWindow,
        session: &Session,
    ) -> Result<StreamDescriptor, RequestError> {
        self.build_with_tracking(station_id, window, session, TrackingValue::generate())
    }

    pub fn build_with_tracking(
        &self,
        station_id: &str,
        window: &StreamWindow,
        session: &Session,
        tracking: TrackingValue,
    ) -> Result<StreamDescriptor, RequestError> {
        validate_station_id(station_id)?;

        let start = window.start_stamp();
        let end = window.end_stamp();

        let mut url = Url::parse(&self.playlist)
            .map_err(|_| RequestError::InvalidEndpoint(self.playlist.clone()))?;
        url.query_pairs_mut()
            .append_pair("station_id", station_id)
            .append_pair("start_at", &start)
            .append_pair("ft", &start)
            .append_pair("end_at", &end)
            .append_pair("to", &end)
            .append_pair("seek", &start)
            .append_pair("l", "15")
            .append_pair("lsid", tracking.as_str())
            .append_pair("type", "c");

        let mut headers = vec![(STREAM_HEADER_TOKEN.to_string(), session.token().to_string())];
        let region = session.region().as_str();
        if !region.is_empty() {
            headers.push((STREAM_HEADER_AREA.to_string(), region.to_string()));
        }

        Ok(StreamDescriptor {
            station_id: station_id.to_string(),
            window: *window,
            url: url.into(),
            headers,
            tracking,
        })
    }
}

/// `dir/<station>_<start>_<end>.m4a`
pub fn output_path(dir: &Path, descriptor: &StreamDescriptor) -> PathBuf {
    dir.join(descriptor.window.file_name(&descriptor.station_id))
}

/// Station ids end up in a URL and a file name: ASCII letters, digits, `-`, `_`.
pub fn validate_station_id(station_id: &str) -> Result<(), RequestError> {
    let valid = !station_id.is_empty()
        && station_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(RequestError::InvalidStation(station_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Region;

    fn window() -> StreamWindow {
        StreamWindow::parse("20240521050000", "20240521053000").unwrap()
    }

    fn session(region: &str) -> Session {
        Session::new("tok123".into(), Region::new(region), None)
    }

    fn builder() -> StreamRequestBuilder {
        StreamRequestBuilder::new("https://radiko.jp/v2/api/ts/playlist.m3u8")
    }

    #[test]
    fn query_parameters_in_wire_order() {
        let tracking = TrackingValue::from_seed(&[7u8; 100]);
        let lsid = tracking.as_str().to_string();
        let descriptor = builder()
            .build_with_tracking("TBS", &window(), &session("JP13"), tracking)
            .unwrap();

        assert_eq!(
            descriptor.url,
            format!(
                "https://radiko.jp/v2/api/ts/playlist.m3u8?station_id=TBS\
                 &start_at=20240521050000&ft=20240521050000\
                 &end_at=20240521053000&to=20240521053000\
                 &seek=20240521050000&l=15&lsid={lsid}&type=c"
            )
        );
    }

    #[test]
    fn headers_carry_token_and_area() {
        let descriptor = builder().build("TBS", &window(), &session("JP13")).unwrap();
        assert_eq!(
            descriptor.headers,
            vec![
                ("X-Radiko-Authtoken".to_string(), "tok123".to_string()),
                ("X-Radiko-AreaId".to_string(), "JP13".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_area_is_omitted() {
        let descriptor = builder().build("TBS", &window(), &session("")).unwrap();
        assert_eq!(descriptor.headers.len(), 1);
    }

    #[test]
    fn tracking_is_32_lowercase_hex() {
        let tracking = TrackingValue::generate();
        assert_eq!(tracking.as_str().len(), 32);
        assert!(tracking
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn tracking_is_fresh_per_request() {
        let a = builder().build("TBS", &window(), &session("JP13")).unwrap();
        let b = builder().build("TBS", &window(), &session("JP13")).unwrap();
        assert_ne!(a.tracking, b.tracking);
        assert_ne!(a.url, b.url);
    }

    #[test]
    fn tracking_digest_is_md5_of_base64_seed() {
        // base64 of 3 zero bytes is "AAAA"; md5("AAAA")
        let tracking = TrackingValue::from_seed(&[0, 0, 0]);
        assert_eq!(tracking.as_str(), "098890dde069e9abad63f19a0d9e1f32");
    }

    #[test]
    fn station_ids_are_validated() {
        assert!(validate_station_id("FMJ").is_ok());
        assert!(validate_station_id("RADIONIKKEI-1").is_ok());
        for bad in ["", "TBS&l=1", "../etc", "T B S"] {
            assert!(matches!(
                builder().build(bad, &window(), &session("JP13")),
                Err(RequestError::InvalidStation(_))
            ));
        }
    }

    #[test]
    fn output_path_names_station_and_window() {
        let descriptor = builder().build("QRR", &window(), &session("JP13")).unwrap();
        assert_eq!(
            output_path(Path::new("/rec"), &descriptor),
            Path::new("/rec/QRR_20240521050000_20240521053000.m4a")
        );
    }

    #[test]
    fn bad_endpoint_is_reported() {
        let builder = StreamRequestBuilder::new("not a url");
        assert!(matches!(
            builder.build("TBS", &window(), &session("JP13")),
            Err(RequestError::InvalidEndpoint(_))
        ));
    }
}
