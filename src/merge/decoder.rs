use std::str;

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Incremental UTF-8 decoder that replaces invalid sequences with U+FFFD.
///
/// Bytes of a multi-byte character split across two chunks are held back
/// until the next chunk arrives.
#[derive(Debug, Default)]
pub struct LossyDecoder {
    pending: Vec<u8>,
}

impl LossyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` and appends the text to `out`.
    pub fn decode(&mut self, chunk: &[u8], out: &mut String) {
        let mut owned;
        let mut input = if self.pending.is_empty() {
            chunk
        } else {
            owned = std::mem::take(&mut self.pending);
            owned.extend_from_slice(chunk);
            owned.as_slice()
        };

        loop {
            match str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    return;
                }
                Err(error) => {
                    let (valid, rest) = input.split_at(error.valid_up_to());
                    // Prefix was just validated.
                    out.push_str(str::from_utf8(valid).unwrap_or_default());
                    match error.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT);
                            input = &rest[invalid..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Flushes a truncated trailing sequence as a replacement character.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(REPLACEMENT);
        }
    }
}
