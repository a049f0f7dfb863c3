use std::io::SeekFrom;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

use super::{Source, SourceError};

/// How long to wait at end of file before checking for new data.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Follow `path` from its current end, like `tail -F`.
///
/// Fails immediately when the file cannot be opened. Afterwards the file
/// is reopened from the start whenever it is truncated or replaced.
pub async fn follow(path: &str) -> Result<Source, SourceError> {
    follow_with_interval(path, POLL_INTERVAL).await
}

pub async fn follow_with_interval(path: &str, poll: Duration) -> Result<Source, SourceError> {
    let open_err = |source| SourceError::Open {
        path: path.to_string(),
        source,
    };

    let mut file = File::open(path).await.map_err(open_err)?;
    let meta = file.metadata().await.map_err(open_err)?;
    let mut pos = file.seek(SeekFrom::End(0)).await.map_err(open_err)?;
    let mut identity = file_identity(&meta);

    let path = path.to_string();
    let name = path.clone();

    let lines = async_stream::stream! {
        let mut reader = BufReader::new(file);
        let mut buf: Vec<u8> = Vec::new();

        loop {
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    tokio::time::sleep(poll).await;

                    let Ok(meta) = tokio::fs::metadata(&path).await else {
                        // Rotated away and not yet recreated
                        continue;
                    };
                    let replaced = file_identity(&meta) != identity;
                    let truncated = meta.len() < pos;
                    if !replaced && !truncated {
                        continue;
                    }

                    match File::open(&path).await {
                        Ok(reopened) => {
                            info!(path = %path, replaced, truncated, "Reopening followed file");
                            identity = file_identity(&meta);
                            reader = BufReader::new(reopened);
                            buf.clear();
                            pos = 0;
                        }
                        Err(e) => debug!(path = %path, "reopen failed, retrying: {}", e),
                    }
                }
                Ok(n) => {
                    pos += n as u64;
                    // Partial line at EOF; wait for the rest
                    if buf.last() != Some(&b'\n') {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    buf.clear();
                    yield Ok(line);
                }
                Err(source) => {
                    yield Err(SourceError::Read { path: path.clone(), source });
                    break;
                }
            }
        }
    };

    Ok(Source::new(name, lines))
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> u64 {
    0
}
