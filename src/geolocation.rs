//! Location sources available to the host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use tracker::{Error, Geolocation, Position, PositionWatch, WatchId, WatchOptions};

const READING_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Source {
    /// A single known position, as from a desktop browser with no GPS.
    Fixed(Position),

    /// One reading per line on stdin, `lat,lon` or a JSON object.
    Stdin,

    /// No location access.
    Unavailable,
}

#[derive(Debug)]
pub struct DeviceGeolocation {
    source: Source,
    next_id: AtomicU64,
    watches: Mutex<HashMap<WatchId, AbortHandle>>,
}

impl DeviceGeolocation {
    #[must_use]
    pub fn new(source: Source) -> Self {
        Self { source, next_id: AtomicU64::new(1), watches: Mutex::new(HashMap::new()) }
    }
}

impl Geolocation for DeviceGeolocation {
    fn watch_position(&self, options: &WatchOptions) -> tracker::Result<PositionWatch> {
        let (tx, rx) = mpsc::channel(READING_BUFFER);

        let task = match self.source {
            Source::Unavailable => {
                return Err(Error::GeolocationUnavailable(
                    "no location source configured".to_string(),
                ));
            }
            Source::Fixed(position) => tokio::spawn(async move {
                if tx.send(Ok(position)).await.is_ok() {
                    // hold the stream open until the watch is cleared
                    tx.closed().await;
                }
            }),
            Source::Stdin => tokio::spawn(read_stdin(tx)),
        };

        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            watch_id = id.0,
            source = ?self.source,
            high_accuracy = options.enable_high_accuracy,
            "position watch started"
        );
        self.watches.lock().unwrap_or_else(PoisonError::into_inner).insert(id, task.abort_handle());

        Ok(PositionWatch { id, readings: rx })
    }

    fn clear_watch(&self, id: WatchId) {
        let watch = self.watches.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        if let Some(task) = watch {
            task.abort();
            debug!(watch_id = id.0, "position watch cleared");
        }
    }
}

async fn read_stdin(tx: mpsc::Sender<tracker::Result<Position>>) {
    forward_lines(BufReader::new(tokio::io::stdin()), tx).await;
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<tracker::Result<Position>>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                if tx.send(Err(Error::GeolocationUnavailable(e.to_string()))).await.is_err() {
                    debug!(error = %e, "position watch closed before read error was delivered");
                }
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(parse_reading(&line)).await.is_err() {
            break;
        }
    }
    debug!("position line stream closed");
}

fn parse_reading(line: &str) -> tracker::Result<Position> {
    let line = line.trim();
    if line.starts_with('{') {
        return Ok(serde_json::from_str(line)?);
    }
    line.parse().map_err(|e: anyhow::Error| Error::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_reading() {
        assert_eq!(parse_reading(" 11.0, 77.0\n").expect("parses"), Position::new(11.0, 77.0));
    }

    #[test]
    fn json_reading() {
        let position =
            parse_reading(r#"{"latitude": 11.342156, "longitude": 77.728901}"#).expect("parses");
        assert_eq!(position, Position::new(11.342_156, 77.728_901));
    }

    #[test]
    fn bad_reading() {
        let Err(err) = parse_reading("somewhere near the depot") else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn unavailable() {
        let geolocation = DeviceGeolocation::new(Source::Unavailable);
        let Err(err) = geolocation.watch_position(&WatchOptions::default()) else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::GeolocationUnavailable(_)));
    }

    #[tokio::test]
    async fn fixed_position() {
        let geolocation = DeviceGeolocation::new(Source::Fixed(Position::new(11.0, 77.0)));
        let mut watch = geolocation.watch_position(&WatchOptions::default()).expect("watching");

        let reading = watch.readings.recv().await.expect("a reading").expect("a position");
        assert_eq!(reading, Position::new(11.0, 77.0));

        geolocation.clear_watch(watch.id);
        assert!(geolocation.watches.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn forwards_lines() {
        let (tx, mut rx) = mpsc::channel(READING_BUFFER);
        forward_lines(&b"11.0,77.0\n\nnowhere\n"[..], tx).await;

        assert_eq!(rx.recv().await.expect("a reading"), Ok(Position::new(11.0, 77.0)));
        assert!(matches!(rx.recv().await, Some(Err(Error::InvalidFormat(_)))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unreadable_input() {
        let (tx, mut rx) = mpsc::channel(READING_BUFFER);
        forward_lines(&b"\xff\xfe\n"[..], tx).await;
        assert!(matches!(rx.recv().await, Some(Err(Error::GeolocationUnavailable(_)))));

        // nobody listening; the read error is dropped without panicking
        let (tx, rx) = mpsc::channel(READING_BUFFER);
        drop(rx);
        forward_lines(&b"\xff\xfe\n"[..], tx).await;
    }
}
