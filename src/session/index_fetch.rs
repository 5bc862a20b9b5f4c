//! Paginated enumeration of the media index.

use std::collections::HashSet;

use indicatif::ProgressBar;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Session, SessionError, retry_fixed};
use crate::index::{MediaRecord, MediaType};

/// Items requested per index page.
pub const INDEX_PAGE_LIMIT: usize = 500;

/// One page of the media index endpoint.
#[derive(Debug, Deserialize)]
struct IndexPage {
    #[serde(default)]
    media: Vec<ApiMedia>,
    #[serde(default)]
    total: usize,
}

/// The fields of an API media item that a record keeps.
#[derive(Debug, Deserialize)]
struct ApiMedia {
    id: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

impl From<ApiMedia> for MediaRecord {
    fn from(item: ApiMedia) -> Self {
        let media_type = item.media_type.map(MediaType::from).unwrap_or_default();
        MediaRecord::new(item.id, media_type, item.format.unwrap_or_default())
    }
}

/// Fetches every media descriptor in the account, page by page.
///
/// Returned records are `pending` with zero retries, in listing order. An
/// id listed again on a later page (offset paging over a changing library)
/// is kept only at its first position. `progress` is sized from the first
/// page's `total` and advanced per page.
///
/// # Errors
///
/// Returns [`SessionError::MalformedIndex`] if a page is not valid JSON, or
/// a transport/status error once the session retry policy is exhausted.
#[instrument(skip_all, fields(api_url = %session.api_url()))]
pub async fn enumerate_media(
    session: &Session,
    progress: &ProgressBar,
) -> Result<Vec<MediaRecord>, SessionError> {
    let index_url = index_endpoint(session.api_url())?;
    let limit = INDEX_PAGE_LIMIT.to_string();

    let mut records: Vec<MediaRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates = 0usize;
    let mut offset = 0usize;
    let mut total: Option<usize> = None;

    while total.is_none_or(|total| offset < total) {
        let offset_text = offset.to_string();
        let form = [
            ("taken_at_after", "0"),
            ("include_hidden", "true"),
            ("show_invisible", "true"),
            ("warm_thumbs", "false"),
            ("include_names", "false"),
            ("include_comments", "false"),
            ("include_signature", "false"),
            ("include_access_info", "false"),
            ("include_likes", "false"),
            ("offset", offset_text.as_str()),
            ("limit", limit.as_str()),
            ("access_token", session.access_token()),
        ];

        let body = retry_fixed(session.retry_policy(), "media index", || async {
            let response = session
                .client()
                .post(index_url.clone())
                .form(&form)
                .send()
                .await
                .map_err(|e| SessionError::http(index_url.as_str(), e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(SessionError::http_status(index_url.as_str(), status.as_u16()));
            }
            response
                .bytes()
                .await
                .map_err(|e| SessionError::http(index_url.as_str(), e))
        })
        .await?;

        let page: IndexPage = serde_json::from_slice(&body)
            .map_err(|source| SessionError::MalformedIndex { offset, source })?;

        if total.is_none() {
            progress.set_length(page.total as u64);
        }
        total = Some(page.total);

        debug!(offset, items = page.media.len(), total = page.total, "index page received");
        for record in page.media.into_iter().map(MediaRecord::from) {
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                debug!(id = %record.id, offset, "media item listed twice");
                duplicates += 1;
            }
        }

        offset += INDEX_PAGE_LIMIT;
        progress.set_position(offset.min(page.total) as u64);
    }

    if duplicates > 0 {
        warn!(duplicates, "skipped media items listed more than once");
    }
    info!(records = records.len(), "media index enumerated");
    Ok(records)
}

fn index_endpoint(api_url: &Url) -> Result<Url, SessionError> {
    let raw = format!("{}/media/index", api_url.as_str().trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| SessionError::invalid_url(raw.clone(), e))
}
