use std::fmt::{self, Display};

use crate::chunks::{Chunks, Error as ChunksError};

/// Errors from reading an event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The underlying body stream failed.
    ChunksError(ChunksError),
    /// The stream contained bytes that are not a valid event.
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => write!(f, "{err}"),
            Error::InvalidPayload => write!(f, "invalid event stream payload"),
        }
    }
}

impl std::error::Error for Error {}

/// A single server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    /// The `event` field, if the server named the event.
    pub name: Option<String>,
    /// The `data` fields joined by line feeds.
    pub data: String,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    /// Creates a reader over `chunks`.
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    /// Reads the next event's data, ignoring its name.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        Ok(self.next_named_event().await?.map(|event| event.data))
    }

    /// Reads the next event.
    ///
    /// Returns `None` when the stream ends. Trailing bytes that don't form
    /// a complete event are discarded.
    pub async fn next_named_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            // Drain complete events from the buffer before reading more.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            let Ok(s) = str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            self.buf.push_str(s);
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<Event>, Error> {
        // For `end-of-line`, we only handle line feed.
        //
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        loop {
            let Some(eol_idx) = self.buf.find("\n\n") else {
                return Ok(None);
            };

            let mut event = Event::default();
            let mut has_data = false;
            for line in self.buf[0..eol_idx].split('\n') {
                if line.starts_with(':') {
                    continue;
                }
                let Some((name, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                let value = value.strip_prefix(' ').unwrap_or(value);
                match name {
                    "data" => {
                        if has_data {
                            event.data.push('\n');
                        }
                        event.data.push_str(value);
                        has_data = true;
                    }
                    "event" => event.name = Some(value.to_owned()),
                    // `id` and `retry` are not used by model providers.
                    _ => {}
                }
            }

            // Consume the bytes from the buffer.
            self.buf.drain(0..eol_idx + 2);

            if has_data {
                return Ok(Some(event));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\n"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_several_events_in_one_chunk() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: a\n\ndata: b\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "b");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_named_events() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b": keep-alive\n\nevent: ping\ndata: {}\n\nevent: message_stop\ndata: {\"a\":1}\ndata: {\"b\":2}\n\n",
            )]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(
            sse.next_named_event().await.unwrap().unwrap(),
            Event {
                name: Some("ping".to_owned()),
                data: "{}".to_owned(),
            }
        );
        assert_eq!(
            sse.next_named_event().await.unwrap().unwrap(),
            Event {
                name: Some("message_stop".to_owned()),
                data: "{\"a\":1}\n{\"b\":2}".to_owned(),
            }
        );
        assert_eq!(sse.next_named_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n"),
                Bytes::from_static(b"data: bye\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
