//! Shared helpers for backends / 后端通用工具

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::{DataStoreError, Result};

/// Run `fut` until it finishes or `cancel` fires, whichever comes first.
/// On cancellation the future is dropped, which aborts any in-flight I/O.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, path: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Operation cancelled: {}", path);
            Err(DataStoreError::Cancelled { path: path.to_string() })
        }
        res = fut => res,
    }
}

/// Reader that fails every read once the token fires / 可取消的读取器
pub struct CancellableReader<R> {
    inner: R,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancelled: Box::pin(cancel.cancelled_owned()),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CancellableReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                "read cancelled",
            )));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// Parse an HTTP-date in any of the three formats RFC 9110 allows.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    [IMF_FIXDATE, RFC850_DATE, ASCTIME_DATE]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a timestamp as an IMF-fixdate / 格式化为 HTTP 日期
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(IMF_FIXDATE).to_string()
}
