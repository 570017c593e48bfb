//! Line framing for text streams
//!
//! Text peers terminate messages with `\n`, `\r` or the literal `END`, and
//! mix them freely. The buffer is split at whichever terminator comes first,
//! repeatedly, until no complete terminator is left; the unterminated tail is
//! carried into the next call.
//!
//! ```text
//! "a\nb\rcENDd"  →  ["a", "b", "c"] + remainder "d"
//! "helloEN"      →  []              + remainder "helloEN"
//!   + "DworldEND" →  ["hello", "world"] + remainder ""
//! ```
//!
//! The remainder is kept as bytes: a multi-byte character cut in half by a
//! segment boundary stays undecoded until the rest of it arrives.

/// Explicit end-of-message sentinel
pub const END_MARKER: &str = "END";

const TERMINATORS: [&str; 3] = ["\n", "\r", END_MARKER];

/// Split `buffer + incoming` into complete messages and a remainder.
///
/// `buffer` is the remainder returned by the previous call. Invalid UTF-8 is
/// dropped; an incomplete sequence at the very end is carried in the
/// remainder, so feeding the bytes in any number of calls yields the same
/// messages as one call.
pub fn split(buffer: &[u8], incoming: &[u8]) -> (Vec<String>, Vec<u8>) {
    let mut bytes = Vec::with_capacity(buffer.len() + incoming.len());
    bytes.extend_from_slice(buffer);
    bytes.extend_from_slice(incoming);

    let mut text = String::with_capacity(bytes.len());
    let complete = decode_permissive(&bytes, &mut text);
    let messages = drain_messages(&mut text);

    let mut remainder = text.into_bytes();
    remainder.extend_from_slice(&bytes[complete..]);
    (messages, remainder)
}

/// Decode bytes to text, dropping invalid sequences
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    decode_permissive(bytes, &mut text);
    text
}

/// Stateful [`split`] for one connection
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: String,
    /// Leading bytes of a UTF-8 sequence whose tail has not arrived yet
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes and return every completed message
    pub fn push(&mut self, incoming: &[u8]) -> Vec<String> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(incoming);

        let complete = decode_permissive(&bytes, &mut self.buffer);
        self.pending = bytes[complete..].to_vec();
        drain_messages(&mut self.buffer)
    }

    /// Text received after the last terminator
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }
}

/// Append the valid UTF-8 of `bytes` to `out`.
///
/// Returns how many input bytes were consumed; anything after that index is an
/// incomplete sequence at the very end of the input.
fn decode_permissive(bytes: &[u8], out: &mut String) -> usize {
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return bytes.len();
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match err.error_len() {
                    Some(invalid) => rest = &after[invalid..],
                    None => return bytes.len() - after.len(),
                }
            }
        }
    }
}

fn next_terminator(text: &str) -> Option<(usize, usize)> {
    TERMINATORS
        .iter()
        .filter_map(|t| text.find(t).map(|index| (index, t.len())))
        .min_by_key(|(index, _)| *index)
}

fn drain_messages(buffer: &mut String) -> Vec<String> {
    let mut messages = Vec::new();
    while let Some((index, len)) = next_terminator(buffer) {
        let message = buffer[..index].trim().to_string();
        buffer.drain(..index + len);
        if !message.is_empty() {
            messages.push(message);
        }
    }
    messages
}
