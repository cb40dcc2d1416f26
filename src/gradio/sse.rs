use serde_json::Value;

/// One server-sent event as it appeared on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined with newlines.
    pub data: String,
}

/// Events emitted by a Gradio `/call/{api}/{event_id}` stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Generating(Value),
    Complete(Value),
    Error(Option<String>),
    Heartbeat,
    Unknown(RawEvent),
}

impl CallEvent {
    pub fn from_raw(raw: RawEvent) -> Self {
        match raw.event.as_deref() {
            Some("complete") => match serde_json::from_str(&raw.data) {
                Ok(value) => CallEvent::Complete(value),
                Err(_) => CallEvent::Unknown(raw),
            },
            Some("generating") => {
                CallEvent::Generating(serde_json::from_str(&raw.data).unwrap_or(Value::Null))
            }
            Some("heartbeat") => CallEvent::Heartbeat,
            Some("error") => {
                let message = match serde_json::from_str::<Value>(&raw.data) {
                    Ok(Value::Null) => None,
                    Ok(Value::String(s)) => Some(s),
                    Ok(other) => Some(other.to_string()),
                    Err(_) if raw.data.trim().is_empty() => None,
                    Err(_) => Some(raw.data.clone()),
                };
                CallEvent::Error(message)
            }
            _ => CallEvent::Unknown(raw),
        }
    }
}

/// Incremental SSE parser. Chunks may split events (or UTF-8 sequences)
/// anywhere; only complete events are returned.
#[derive(Default)]
pub struct Parser {
    bytes: Vec<u8>,
}

impl Parser {
    pub fn process(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.bytes
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut events = vec![];

        while let Some(pos) = self.bytes.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.bytes.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_block(&block[..pos]) {
                events.push(event);
            }
        }

        events
    }

    /// Whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<RawEvent> {
        let block = std::mem::take(&mut self.bytes);
        Self::parse_block(&block)
    }

    fn parse_block(block: &[u8]) -> Option<RawEvent> {
        let text = String::from_utf8_lossy(block);
        let mut event = None;
        let mut data: Option<String> = None;

        for line in text.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event = Some(value.to_string()),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => log::trace!("ignoring SSE field '{}'", field),
            }
        }

        if event.is_none() && data.is_none() {
            return None;
        }
        Some(RawEvent {
            event,
            data: data.unwrap_or_default(),
        })
    }
}
