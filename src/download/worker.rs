//! A single download attempt for one leased record.

use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use super::constants::MIN_MEDIA_BYTES;
use super::fetch::{ByteStream, Fetcher};
use super::DownloadError;
use crate::index::{MediaRecord, MediaStatus, RecordLease};

/// Runs exactly one attempt for the leased record and returns its terminal status.
///
/// On every failure path the destination file is removed, so a file exists
/// for the record afterwards only if the status is [`MediaStatus::Done`].
#[instrument(skip_all, fields(slot = lease.slot()))]
pub async fn download_record(
    lease: RecordLease,
    fetcher: &dyn Fetcher,
    media_dir: &Path,
) -> MediaStatus {
    let record = lease.begin();
    let path = media_dir.join(record.file_name());

    let status = match fetch_to_file(fetcher, &record, &path).await {
        Ok(bytes) => {
            debug!(
                id = %record.id,
                path = %path.display(),
                bytes,
                attempt = record.retries,
                "media saved"
            );
            MediaStatus::Done
        }
        Err(error) => {
            warn!(
                id = %record.id,
                attempt = record.retries,
                error = %error,
                "media download failed"
            );
            remove_partial(&path).await;
            MediaStatus::Failed
        }
    };

    lease.finish(status)
}

async fn fetch_to_file(
    fetcher: &dyn Fetcher,
    record: &MediaRecord,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::create_file(path, e))?;

    let stream = fetcher.fetch(&record.id).await?;
    let bytes = stream_to_file(&mut file, stream, path).await?;

    if bytes < MIN_MEDIA_BYTES {
        return Err(DownloadError::Truncated {
            path: path.to_path_buf(),
            bytes,
            minimum: MIN_MEDIA_BYTES,
        });
    }
    Ok(bytes)
}

/// Streams the body into `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    mut stream: ByteStream,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::write(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(path, e))?;

    Ok(bytes_written)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), %error, "failed to remove partial file"),
    }
}
