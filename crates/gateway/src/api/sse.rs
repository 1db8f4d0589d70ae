//! Shared helper turning a `Watch*`/`StreamLogs` stream into a
//! `text/event-stream` response. No teacher analog — the teacher's
//! dashboard polls instead of streaming — built directly against axum's
//! own `sse` module.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Serialize;

pub fn json_stream<T, S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize,
    S: Stream<Item = T> + Send + 'static,
{
    let events = stream.map(|item| Ok(Event::default().json_data(item).unwrap_or_else(|_| Event::default())));
    Sse::new(events).keep_alive(KeepAlive::default())
}
