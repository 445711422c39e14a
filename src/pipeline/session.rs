use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// The encoded output of a run, tagged with the mime type the encoder actually produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Accumulates encoder chunks in delivery order.
#[derive(Debug)]
pub(crate) struct CaptureSession {
    mime_type: String,
    chunks: Vec<Vec<u8>>,
    total_len: usize,
}

impl CaptureSession {
    pub(crate) fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            chunks: Vec::new(),
            total_len: 0,
        }
    }

    /// Append one delivered chunk; empty chunks carry nothing and are dropped.
    pub(crate) fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.total_len += chunk.len();
        self.chunks.push(chunk);
    }

    pub(crate) fn total_len(&self) -> usize {
        self.total_len
    }

    /// Concatenate all chunks into the final output.
    ///
    /// A session that produced zero bytes is a failure, never an empty success.
    pub(crate) fn finish(self) -> ReelmarkResult<ProcessOutput> {
        if self.total_len == 0 {
            return Err(ReelmarkError::empty_output(self.mime_type));
        }
        let mut bytes = Vec::with_capacity(self.total_len);
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk);
        }
        Ok(ProcessOutput {
            bytes,
            mime_type: self.mime_type,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/session.rs"]
mod tests;
