use super::{Cursor, NormalizedPage, Normalizer, RequestGenerator};
use crate::auth_cache::Credentials;
use crate::config::ProviderConfig;
use crate::error::{IngestError, Result};
use crate::http::{HttpRequest, ResponseEnvelope};
use crate::models::ReleaseInfo;
use crate::util::{endpoint, lenient, non_blank, parse_utc};
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Page size requested from /me/albums (the API maximum).
pub const PAGE_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    items: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SavedAlbum {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    added_at: Option<String>,
    #[serde(default)]
    album: Option<FullAlbum>,
}

#[derive(Debug, Deserialize)]
struct FullAlbum {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    uri: Option<String>,
    /// Array of simplified artist objects; anything else yields no artists.
    #[serde(default)]
    artists: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    release_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    popularity: Option<u32>,
    #[serde(default)]
    external_urls: Option<Value>,
}

impl FullAlbum {
    fn artist_names(&self) -> Vec<String> {
        self.artists
            .as_ref()
            .and_then(Value::as_array)
            .map(|artists| {
                artists
                    .iter()
                    .filter_map(|a| non_blank(a.get("name").and_then(Value::as_str)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn spotify_url(&self) -> Option<String> {
        non_blank(
            self.external_urls
                .as_ref()
                .and_then(|u| u.get("spotify"))
                .and_then(Value::as_str),
        )
    }
}

/// Token refresh and paging requests for the saved-albums endpoint.
///
/// The access token is refreshed with the stored refresh token whenever the
/// auth cache has no entry for the API base, i.e. on first use and after any
/// rejected page request.
pub struct SpotifySavedAlbumsRequests {
    config: Arc<ProviderConfig>,
    base: Url,
}

impl SpotifySavedAlbumsRequests {
    pub fn new(config: Arc<ProviderConfig>, base: Url) -> Self {
        Self { config, base }
    }

    /// Absolute next links are only followed on the API origin; a link to any
    /// other origin keeps its path and query but is sent to the API base, so
    /// the bearer token never leaves the configured host.
    fn rehome(&self, next: Url) -> String {
        let same_origin = next.scheme() == self.base.scheme()
            && next.host_str() == self.base.host_str()
            && next.port_or_known_default() == self.base.port_or_known_default();
        if same_origin {
            return next.into();
        }
        warn!(
            "{}: next link points at {}, following it on {} instead",
            self.config.name,
            next.origin().ascii_serialization(),
            self.base.origin().ascii_serialization()
        );
        let mut url = self.base.clone();
        url.set_path(next.path());
        url.set_query(next.query());
        url.set_fragment(None);
        url.into()
    }

    fn token_url(&self) -> Result<Url> {
        Url::parse(self.config.auth_base_url.trim())
            .map(|auth_base| endpoint(&auth_base, "api/token"))
            .map_err(|e| IngestError::config(&self.config.name, format!("auth_base_url: {}", e)))
    }
}

impl RequestGenerator for SpotifySavedAlbumsRequests {
    fn login_request(&self) -> Result<HttpRequest> {
        if self.config.client_id.is_empty()
            || self.config.client_secret.is_empty()
            || self.config.refresh_token.is_empty()
        {
            return Err(IngestError::config(
                &self.config.name,
                "client_id, client_secret and refresh_token are required",
            ));
        }
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.config.client_id, self.config.client_secret
            ))
        );
        Ok(HttpRequest::post(self.token_url()?.as_str())
            .header("Authorization", auth_header)
            .form_field("grant_type", "refresh_token")
            .form_field("refresh_token", self.config.refresh_token.clone()))
    }

    fn credentials_from_login(&self, response: ResponseEnvelope) -> Result<Credentials> {
        if response.status != 200 {
            return Err(IngestError::unexpected_response(
                &self.config.name,
                format!("Failed to refresh token: status {}", response.status),
                response,
            ));
        }
        let token = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|j| non_blank(j["access_token"].as_str()));
        match token {
            Some(token) => {
                debug!("{}: access token refreshed", self.config.name);
                Ok(Credentials::bearer(&token))
            }
            None => Err(IngestError::unexpected_response(
                &self.config.name,
                "Token response carried no access_token",
                response,
            )),
        }
    }

    fn page_request(&self, cursor: Option<&Cursor>) -> HttpRequest {
        let url = match cursor {
            Some(next) => match Url::parse(next.as_str()) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => self.rehome(url),
                // relative next link: resolve against the API base
                _ => format!(
                    "{}/{}",
                    self.config.base_url.trim().trim_end_matches('/'),
                    next.as_str().trim_start_matches('/')
                ),
            },
            None => {
                let mut url = endpoint(&self.base, "me/albums");
                url.query_pairs_mut().append_pair("limit", &PAGE_LIMIT.to_string());
                url.into()
            }
        };
        HttpRequest::get(url).header("Accept", "application/json")
    }
}

/// Normalizer for pages of saved albums.
pub struct SpotifySavedAlbumsParser {
    config: Arc<ProviderConfig>,
}

impl SpotifySavedAlbumsParser {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }

    fn release(&self, saved: SavedAlbum) -> Option<ReleaseInfo> {
        let album = saved.album?;
        let album_name = non_blank(album.name.as_deref())?;
        let artists = album.artist_names();
        let primary = artists.first()?.clone();

        let guid = non_blank(album.uri.as_deref())
            .or_else(|| non_blank(album.id.as_deref()).map(|id| format!("spotify:album:{}", id)))
            .unwrap_or_else(|| format!("spotify:saved:{}:{}", primary, album_name));

        let mut release = ReleaseInfo::new(
            guid,
            format!("{} - {}", primary, album_name),
            artists,
            &self.config.name,
        )?;
        release.album = Some(album_name);
        release.year = album
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok());
        release.popularity = album.popularity;
        release.publish_date = saved.added_at.as_deref().and_then(parse_utc);
        release.info_url = album.spotify_url();
        Some(release)
    }
}

impl Normalizer for SpotifySavedAlbumsParser {
    fn normalize(&self, page: Option<&Value>) -> NormalizedPage {
        let mut normalized = NormalizedPage::default();
        let Some(page) = page else {
            return normalized;
        };
        let Ok(paging) = serde_json::from_value::<Paging>(page.clone()) else {
            return normalized;
        };

        if let Some(items) = paging.items.as_ref().and_then(Value::as_array) {
            for raw in items {
                let release = serde_json::from_value::<Option<SavedAlbum>>(raw.clone())
                    .ok()
                    .flatten()
                    .and_then(|saved| self.release(saved));
                match release {
                    Some(release) => normalized.records.push(release),
                    None => normalized.dropped += 1,
                }
            }
        }

        normalized.next = non_blank(paging.next.as_deref()).map(Cursor::new);
        normalized
    }
}
