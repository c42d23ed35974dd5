//! Gazelle tracker JSON API (`ajax.php`).
//!
//! Browse results come grouped by release group; every torrent inside a group
//! becomes one record. Authentication is either a session cookie obtained from
//! `login.php` or an API key sent as the `Authorization` header.

use super::{Cursor, NormalizedPage, Normalizer, RequestGenerator};
use crate::auth_cache::Credentials;
use crate::config::ProviderConfig;
use crate::error::{IngestError, Result};
use crate::http::{HttpRequest, ResponseEnvelope};
use crate::models::{IndexerFlags, ReleaseInfo};
use crate::util::{endpoint, html_unescape, lenient, non_blank, parse_utc};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Deserialize)]
struct GazelleResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    response: Option<GazelleBrowse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GazelleBrowse {
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    current_page: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pages: Option<u32>,
    #[serde(default)]
    results: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GazelleRelease {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    group_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    group_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    artist: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    group_year: Option<u32>,
    #[serde(default)]
    torrents: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GazelleTorrent {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    torrent_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    format: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    encoding: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    media: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    has_cue: bool,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    seeders: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    leechers: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    time: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_freeleech: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_neutral_leech: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_freeload: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_personal_freeleech: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    can_use_token: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    scene: bool,
}

impl GazelleTorrent {
    fn is_free(&self) -> bool {
        self.is_freeleech || self.is_neutral_leech || self.is_freeload || self.is_personal_freeleech
    }

    /// A token can be spent on this torrent and would change anything.
    fn token_eligible(&self) -> bool {
        self.can_use_token && !self.is_free()
    }

    fn flags(&self) -> IndexerFlags {
        let mut flags = IndexerFlags::empty();
        if self.is_free() {
            flags |= IndexerFlags::FREELEECH;
        }
        if self.scene {
            flags |= IndexerFlags::SCENE;
        }
        flags
    }
}

/// Flags for one raw torrent entry. A malformed entry has no flags.
pub fn torrent_flags(torrent: &Value) -> IndexerFlags {
    serde_json::from_value::<GazelleTorrent>(torrent.clone())
        .map(|t| t.flags())
        .unwrap_or_default()
}

/// Login and browse requests for a Gazelle tracker.
pub struct GazelleRequests {
    config: Arc<ProviderConfig>,
    base: Url,
}

impl GazelleRequests {
    pub fn new(config: Arc<ProviderConfig>, base: Url) -> Self {
        Self { config, base }
    }
}

impl RequestGenerator for GazelleRequests {
    fn preset_credentials(&self) -> Option<Credentials> {
        non_blank(self.config.api_key.as_deref()).map(Credentials::authorization)
    }

    fn login_request(&self) -> Result<HttpRequest> {
        if self.config.username.is_empty() || self.config.password.is_empty() {
            return Err(IngestError::config(
                &self.config.name,
                "username and password are required to log in",
            ));
        }
        Ok(HttpRequest::post(endpoint(&self.base, "login.php").as_str())
            .form_field("username", self.config.username.clone())
            .form_field("password", self.config.password.clone())
            .form_field("keeplogged", "1"))
    }

    fn credentials_from_login(&self, response: ResponseEnvelope) -> Result<Credentials> {
        let redirected_to_login = response
            .header("location")
            .map(|l| l.contains("login.php"))
            .unwrap_or(false);
        let status_ok = response.status == 200 || (300..400).contains(&response.status);
        if !status_ok || redirected_to_login {
            return Err(IngestError::unexpected_response(
                &self.config.name,
                format!("Login failed with status {}", response.status),
                response,
            ));
        }
        let cookies = response.cookies();
        if cookies.is_empty() {
            return Err(IngestError::unexpected_response(
                &self.config.name,
                "Login response did not set a session cookie",
                response,
            ));
        }
        debug!("{}: logged in, {} cookie(s)", self.config.name, cookies.len());
        Ok(Credentials::from_cookies(cookies))
    }

    fn page_request(&self, cursor: Option<&Cursor>) -> HttpRequest {
        let mut url = endpoint(&self.base, "ajax.php");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", "browse");
            if !self.config.search_term.trim().is_empty() {
                query.append_pair("searchstr", self.config.search_term.trim());
            }
            if let Some(page) = cursor {
                query.append_pair("page", page.as_str());
            }
        }
        HttpRequest::get(url.as_str()).header("Accept", "application/json")
    }
}

/// Normalizer for Gazelle browse pages.
pub struct GazelleParser {
    config: Arc<ProviderConfig>,
    base: Url,
}

impl GazelleParser {
    pub fn new(config: Arc<ProviderConfig>, base: Url) -> Self {
        Self { config, base }
    }

    fn info_url(&self, group_id: Option<&str>, torrent_id: u64) -> String {
        let mut url = endpoint(&self.base, "torrents.php");
        {
            let mut query = url.query_pairs_mut();
            if let Some(group_id) = group_id {
                query.append_pair("id", group_id);
            }
            query.append_pair("torrentid", &torrent_id.to_string());
        }
        url.into()
    }

    fn download_url(&self, torrent_id: u64, token_eligible: bool) -> String {
        let mut url = endpoint(&self.base, "torrents.php");
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("action", "download")
                .append_pair("id", &torrent_id.to_string())
                .append_pair("authkey", &self.config.auth_key)
                .append_pair("torrent_pass", &self.config.pass_key);
            // Some trackers refuse the download when usetoken=0 is present,
            // so the parameter is either 1 or absent.
            if self.config.use_freeleech_token && token_eligible {
                query.append_pair("usetoken", "1");
            }
        }
        url.into()
    }

    fn release(
        &self,
        group: &GazelleRelease,
        artist: &str,
        album: &str,
        torrent: &GazelleTorrent,
        torrent_id: u64,
    ) -> Option<ReleaseInfo> {
        let mut title = format!("{} - {}", artist, album);
        if let Some(year) = group.group_year.filter(|y| *y > 0) {
            title.push_str(&format!(" ({})", year));
        }
        let format = non_blank(torrent.format.as_deref());
        let encoding = non_blank(torrent.encoding.as_deref());
        let media = non_blank(torrent.media.as_deref());
        let quality: Vec<&str> = [format.as_deref(), encoding.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !quality.is_empty() {
            title.push_str(&format!(" [{}]", quality.join(" ")));
        }
        if let Some(media) = &media {
            title.push_str(&format!(" [{}]", media));
        }
        if torrent.has_cue {
            title.push_str(" [Cue]");
        }

        let info_url = self.info_url(group.group_id.as_deref(), torrent_id);
        let mut release = ReleaseInfo::new(
            info_url.clone(),
            title,
            vec![artist.to_string()],
            &self.config.name,
        )?;
        release.album = Some(album.to_string());
        release.info_url = Some(info_url);
        release.download_url = Some(self.download_url(torrent_id, torrent.token_eligible()));
        release.codec = format;
        release.container = encoding;
        release.media = media;
        release.year = group.group_year.filter(|y| *y > 0);
        release.size = torrent.size;
        release.seeders = torrent.seeders;
        release.peers = match (torrent.seeders, torrent.leechers) {
            (Some(s), Some(l)) => Some(s.saturating_add(l)),
            _ => None,
        };
        release.publish_date = torrent.time.as_deref().and_then(parse_utc);
        release.flags = torrent.flags();
        Some(release)
    }

    fn normalize_group(&self, raw: &Value, page: &mut NormalizedPage) {
        let group = match serde_json::from_value::<GazelleRelease>(raw.clone()) {
            Ok(group) => group,
            Err(e) => {
                debug!("{}: skipping malformed group: {}", self.config.name, e);
                page.dropped += 1;
                return;
            }
        };
        let names = (
            non_blank(group.artist.as_deref()).map(|a| html_unescape(&a)),
            non_blank(group.group_name.as_deref()).map(|g| html_unescape(&g)),
        );
        let (artist, album) = match names {
            (Some(artist), Some(album)) if !artist.is_empty() && !album.is_empty() => {
                (artist, album)
            }
            _ => {
                page.dropped += 1;
                return;
            }
        };
        let Some(torrents) = group.torrents.as_ref().and_then(Value::as_array) else {
            debug!("{}: group '{}' has no torrent list", self.config.name, album);
            page.dropped += 1;
            return;
        };
        for raw_torrent in torrents {
            if raw_torrent.is_null() {
                page.dropped += 1;
                continue;
            }
            let torrent = match serde_json::from_value::<GazelleTorrent>(raw_torrent.clone()) {
                Ok(t) => t,
                Err(_) => {
                    page.dropped += 1;
                    continue;
                }
            };
            let Some(torrent_id) = torrent.torrent_id else {
                page.dropped += 1;
                continue;
            };
            match self.release(&group, &artist, &album, &torrent, torrent_id) {
                Some(release) => page.records.push(release),
                None => page.dropped += 1,
            }
        }
    }
}

impl Normalizer for GazelleParser {
    fn normalize(&self, page: Option<&Value>) -> NormalizedPage {
        let mut normalized = NormalizedPage::default();
        let Some(page) = page else {
            return normalized;
        };
        let Ok(response) = serde_json::from_value::<GazelleResponse>(page.clone()) else {
            return normalized;
        };
        if response.status.as_deref().map(str::trim) != Some("success") {
            return normalized;
        }
        let Some(browse) = response.response else {
            return normalized;
        };

        if let Some(results) = browse.results.as_ref().and_then(Value::as_array) {
            for raw in results {
                if raw.is_null() {
                    normalized.dropped += 1;
                    continue;
                }
                self.normalize_group(raw, &mut normalized);
            }
        }

        normalized.next = match (browse.current_page, browse.pages) {
            (Some(current), Some(pages)) if current < pages => {
                Some(Cursor::new((current + 1).to_string()))
            }
            _ => None,
        };
        normalized
    }
}
