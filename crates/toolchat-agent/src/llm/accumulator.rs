//! Delta accumulation: from vendor stream frames to [`StreamEvent`]s.
//!
//! Every vendor streams tool calls differently.  A [`DeltaAccumulator`] owns
//! the per-turn state needed to translate one vendor's events into the
//! normalized vocabulary, and [`normalize_stream`] drives one over a raw
//! byte stream.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::error::{AdapterError, AdapterResult};
use crate::llm::sse::{MAX_BUFFERED_BYTES, SseDecoder, SseFrame};
use crate::llm::types::StreamEvent;

/// A stream of normalized events for one model turn.
///
/// The stream ends after `TurnComplete` or after the first error.
pub type EventStream = Pin<Box<dyn Stream<Item = AdapterResult<StreamEvent>> + Send>>;

/// Per-turn state machine translating one vendor's stream.
pub trait DeltaAccumulator: Send {
    /// Vendor-native event decoded from one SSE frame.
    type Raw;

    /// Decode a frame into a vendor event.
    ///
    /// Returns `Ok(None)` for frames that carry nothing of interest
    /// (keep-alives, unknown event types).
    fn decode(&self, frame: &SseFrame) -> AdapterResult<Option<Self::Raw>>;

    /// Consume one vendor event, returning the normalized events it produces.
    fn normalize(&mut self, raw: Self::Raw) -> AdapterResult<Vec<StreamEvent>>;

    /// Whether the vendor has signalled the end of the turn.
    fn is_done(&self) -> bool {
        false
    }

    /// Close the turn: validate leftover state and emit `TurnComplete`.
    fn finish(&mut self) -> AdapterResult<Vec<StreamEvent>>;
}

// ---------------------------------------------------------------------------
// Stream driver
// ---------------------------------------------------------------------------

struct Driver<S, A> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    accumulator: A,
    pending: VecDeque<AdapterResult<StreamEvent>>,
    finished: bool,
}

impl<S, A: DeltaAccumulator> Driver<S, A> {
    fn process_frames(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            if self.finished || self.accumulator.is_done() {
                break;
            }
            match self.accumulator.decode(&frame) {
                Ok(Some(raw)) => match self.accumulator.normalize(raw) {
                    Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
                    Err(e) => self.fail(e),
                },
                Ok(None) => {}
                Err(e) => self.fail(e),
            }
        }
        if !self.finished && self.accumulator.is_done() {
            self.complete();
        }
    }

    fn complete(&mut self) {
        match self.accumulator.finish() {
            Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
            Err(e) => self.pending.push_back(Err(e)),
        }
        self.finished = true;
    }

    fn fail(&mut self, err: AdapterError) {
        tracing::debug!(error = %err, "stream aborted");
        self.pending.push_back(Err(err));
        self.finished = true;
    }
}

/// Drive `accumulator` over an SSE byte stream.
///
/// Transport errors become [`AdapterError::Stream`].  If the byte stream ends
/// without the vendor's own end marker the accumulator is still finished, so
/// a well-formed turn always yields exactly one `TurnComplete`.
pub fn normalize_stream<S, B, E, A>(bytes: S, accumulator: A) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    A: DeltaAccumulator + 'static,
{
    let driver = Driver {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        accumulator,
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(driver, |mut driver| async move {
        loop {
            if let Some(item) = driver.pending.pop_front() {
                return Some((item, driver));
            }
            if driver.finished {
                return None;
            }

            match driver.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = driver.decoder.push(chunk.as_ref());
                    driver.process_frames(frames);
                    if !driver.finished && driver.decoder.buffered_len() > MAX_BUFFERED_BYTES {
                        driver.fail(AdapterError::Stream {
                            reason: "SSE stream buffer exceeded 16 MiB".into(),
                        });
                    }
                }
                Some(Err(e)) => driver.fail(AdapterError::Stream {
                    reason: format!("stream read error: {e}"),
                }),
                None => {
                    let trailing = driver.decoder.finish();
                    driver.process_frames(trailing.into_iter().collect());
                    if !driver.finished {
                        driver.complete();
                    }
                }
            }
        }
    });

    Box::pin(stream)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an SSE data payload, mapping errors to [`AdapterError::Parse`].
pub(crate) fn parse_json(data: &str) -> AdapterResult<serde_json::Value> {
    serde_json::from_str(data).map_err(|e| AdapterError::Parse {
        reason: format!("invalid JSON in SSE data: {e}"),
    })
}

/// Extract a string field from a JSON value, returning an empty string if
/// missing.
pub(crate) fn json_string(v: &serde_json::Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

/// Extract a token count, tolerating missing or oversized values.
pub(crate) fn json_u32(v: &serde_json::Value) -> u32 {
    v.as_u64()
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or_default()
}
