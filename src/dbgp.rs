//! DBGp wire framing over TCP.
//!
//! Commands from the IDE are NUL-terminated text. Responses from the debug
//! engine are `<decimal-length>\0<xml>\0`, where the declared length must
//! equal the payload's byte length.

use anyhow::anyhow;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

pub struct DbgpStream {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl DbgpStream {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Read one command, without its NUL terminator. `None` on a cleanly
    /// closed peer.
    pub fn read_command(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(0, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&0) {
            return Err(anyhow!("connection closed mid-command"));
        }
        buf.pop();
        Ok(Some(buf))
    }

    /// Read one response as the full frame (`<length>\0<payload>\0`), so the
    /// length field stays available for repair after rewriting. `None` on a
    /// cleanly closed peer.
    pub fn read_response(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut frame = Vec::new();
        let n = self.reader.read_until(0, &mut frame)?;
        if n == 0 {
            return Ok(None);
        }
        if frame.last() != Some(&0) {
            return Err(anyhow!("connection closed mid-response"));
        }
        let n = self.reader.read_until(0, &mut frame)?;
        if n == 0 || frame.last() != Some(&0) {
            return Err(anyhow!("connection closed mid-response"));
        }
        Ok(Some(frame))
    }

    /// Write a command, appending the NUL terminator.
    pub fn write_command(&mut self, command: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(command)?;
        self.stream.write_all(&[0])?;
        self.stream.flush()?;
        Ok(())
    }

    /// Write an already framed response.
    pub fn write_frame(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(())
    }
}
