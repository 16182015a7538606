//! Byte encodings for text payloads
//!
//! Text columns store characters; streams carry bytes. The encoding decides
//! how one becomes the other at the stream boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{LobError, Result};

/// Byte encoding of the stream side of a text transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "iso-8859-1", alias = "latin1", alias = "ISO-8859-1")]
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
        }
    }

    /// Incremental decoder for bytes arriving in arbitrary chunks
    pub fn decoder(&self) -> TextDecoder {
        TextDecoder {
            encoding: *self,
            pending: Vec::new(),
        }
    }

    /// Encode text for the stream side.
    ///
    /// Characters Latin-1 cannot represent are written as `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = LobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            other => Err(LobError::InvalidDescriptor(format!(
                "unsupported text encoding '{}'",
                other
            ))),
        }
    }
}

/// Decodes a byte stream into text, carrying partial UTF-8 sequences
/// over chunk boundaries.
#[derive(Debug)]
pub struct TextDecoder {
    encoding: TextEncoding,
    pending: Vec<u8>,
}

impl TextDecoder {
    /// Decode the next chunk of bytes
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        match self.encoding {
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Utf8 => {
                self.pending.extend_from_slice(bytes);
                match std::str::from_utf8(&self.pending) {
                    Ok(text) => {
                        let text = text.to_string();
                        self.pending.clear();
                        Ok(text)
                    }
                    Err(e) if e.error_len().is_none() => {
                        // Incomplete sequence at the end: keep it for the next chunk
                        let valid = e.valid_up_to();
                        let tail = self.pending.split_off(valid);
                        let text = String::from_utf8(std::mem::replace(&mut self.pending, tail))
                            .map_err(|e| LobError::space("Invalid UTF-8 in text stream", e))?;
                        Ok(text)
                    }
                    Err(e) => Err(LobError::space("Invalid UTF-8 in text stream", e)),
                }
            }
        }
    }

    /// Finish decoding. Fails if the stream ended inside a UTF-8 sequence.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let len = self.pending.len();
        self.pending.clear();
        Err(LobError::space(
            "Invalid UTF-8 in text stream",
            format!("stream ended inside a {}-byte partial sequence", len),
        ))
    }
}
