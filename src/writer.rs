//! Writing uploaded files through the shared line buffer.
//!
//! In text mode every assembled line is stored verbatim, except `M29` (close
//! the file) and `G998 P<n>` (a resend acknowledgement the host must answer).
//! In binary mode raw bytes are stored until the [`EOF_STRING`] trailer has
//! been seen or the announced size has been reached, and the sink's running
//! CRC is then checked against the expected one.

use crate::buffer::{GCodeBuffer, ObjectModel};
use crate::machine::FileInput;
use crate::types::FilePosition;
use crate::{ParseError, EOF_STRING};

/// An open file accepting the upload. The CRC must remain readable after
/// `close`.
pub trait FileSink {
    fn write(&mut self, data: &[u8]);
    fn length(&self) -> FilePosition;
    fn crc32(&self) -> u32;
    fn close(&mut self);
}

/// Opens upload sinks on the host's storage.
pub trait FileStore {
    type Sink: FileSink;

    fn open_for_write(&mut self, directory: &str, file_name: &str) -> Option<Self::Sink>;
}

/// What became of a text-mode line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteLineOutcome {
    /// The line was appended to the file.
    Written,
    /// `M29` ended the upload; the file has been closed.
    Closed,
    /// `G998 P<n>` was seen; the host should acknowledge line `n`. Nothing
    /// was written.
    Resend(i32),
}

/// Reported when a binary upload completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryWriteResult {
    pub crc_ok: bool,
}

/// One file upload in progress. Text lines are fed through the channel's
/// [`GCodeBuffer`]; binary bytes bypass it and come in through [`put`].
///
/// [`put`]: FileWriteSession::put
pub struct FileWriteSession<W: FileSink> {
    sink: W,
    size: FilePosition,
    expected_crc32: u32,
    binary: bool,
    eof_counter: usize,
}

impl<W: FileSink> FileWriteSession<W> {
    /// Open `file_name` under `directory` for writing. `size` of zero means
    /// the length is unknown and, in binary mode, the trailer terminates the
    /// upload. An `expected_crc32` of zero disables the CRC check.
    pub fn open<S>(
        store: &mut S,
        directory: &str,
        file_name: &str,
        size: FilePosition,
        binary: bool,
        expected_crc32: u32,
    ) -> Option<Self>
    where
        S: FileStore<Sink = W>,
    {
        let sink = store.open_for_write(directory, file_name)?;
        Some(Self {
            sink,
            size,
            expected_crc32,
            binary,
            eof_counter: 0,
        })
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Text mode: store the completed command sitting in `gb`.
    pub fn write_line<OM, F, const N: usize>(
        &mut self,
        gb: &mut GCodeBuffer<OM, F, N>,
    ) -> Result<WriteLineOutcome, ParseError>
    where
        OM: ObjectModel,
        F: FileInput,
    {
        if gb.command_letter() == 'M' && gb.command_number() == 29 {
            self.sink.close();
            gb.set_finished();
            return Ok(WriteLineOutcome::Closed);
        }
        if gb.command_letter() == 'G' && gb.command_number() == 998 && gb.seen(b'P') {
            let line = gb.get_i32()?;
            gb.set_finished();
            return Ok(WriteLineOutcome::Resend(line));
        }

        self.sink.write(gb.line());
        self.sink.write(b"\n");
        gb.set_finished();
        Ok(WriteLineOutcome::Written)
    }

    /// Binary mode: store one raw byte. Returns `Some` once the upload has
    /// finished and the file is closed.
    pub fn put(&mut self, b: u8) -> Option<BinaryWriteResult> {
        if self.size == 0 && EOF_STRING.get(self.eof_counter) == Some(&b) {
            self.eof_counter += 1;
            if self.eof_counter < EOF_STRING.len() {
                return None; // trailer not complete yet
            }
        } else {
            if self.eof_counter != 0 {
                // the partial trailer match turned out to be payload
                self.sink.write(&EOF_STRING[..self.eof_counter]);
                self.eof_counter = 0;
            }
            self.sink.write(&[b]);
            if self.size == 0 || self.sink.length() < self.size {
                return None;
            }
        }

        Some(self.finish())
    }

    /// Close the file and check the CRC.
    pub fn finish(&mut self) -> BinaryWriteResult {
        self.sink.close();
        let crc_ok = self.expected_crc32 == 0 || self.expected_crc32 == self.sink.crc32();
        BinaryWriteResult { crc_ok }
    }

    /// The input stream ended mid-upload. A binary upload is finished as-is;
    /// a text upload flushes the unterminated last line (unless it is `M29`)
    /// and closes the file.
    pub fn input_ended<OM, F, const N: usize>(
        &mut self,
        gb: &mut GCodeBuffer<OM, F, N>,
    ) -> Option<BinaryWriteResult>
    where
        OM: ObjectModel,
        F: FileInput,
    {
        if self.binary {
            return Some(self.finish());
        }

        let ready = gb.file_ended();
        if ready {
            if !(gb.command_letter() == 'M' && gb.command_number() == 29) {
                self.sink.write(gb.line());
                self.sink.write(b"\n");
            }
            gb.set_finished();
        }
        self.sink.close();
        None
    }
}
