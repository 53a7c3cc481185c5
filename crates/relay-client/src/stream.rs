//! Pull-based row stream reconstructed from push-based delivery.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::ClientError;

/// A signal delivered into a query's buffer by the inbound router.
#[derive(Debug)]
pub(crate) enum RowSignal {
    /// One row, in emission order.
    Row(Value),
    /// Clean end of stream.
    End,
    /// Stream failed; rows already delivered remain valid.
    Failed(String),
}

/// The finite, ordered result stream of one query.
///
/// Each [`next`](RowStream::next) suspends until a row is buffered, the end
/// signal arrives, or an error is recorded. The stream is not restartable:
/// after the terminator, further pulls yield `Ok(None)`.
pub struct RowStream {
    rx: mpsc::UnboundedReceiver<RowSignal>,
    finished: bool,
}

impl RowStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<RowSignal>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Pull the next row.
    ///
    /// `Ok(Some(row))` for each row in emission order, `Ok(None)` on clean
    /// end, `Err` exactly once if the stream failed or the connection
    /// dropped mid-stream.
    pub async fn next(&mut self) -> Result<Option<Value>, ClientError> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(RowSignal::Row(row)) => Ok(Some(row)),
            Some(RowSignal::End) => {
                self.finished = true;
                Ok(None)
            }
            Some(RowSignal::Failed(err)) => {
                self.finished = true;
                Err(ClientError::Query(err))
            }
            // Sender dropped without a terminator: the connection is gone.
            None => {
                self.finished = true;
                Err(ClientError::Disconnected)
            }
        }
    }

    /// Drain the remaining rows into a vector.
    pub async fn collect(mut self) -> Result<Vec<Value>, ClientError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
