//! In-memory transport implementation for testing

use std::io::{self, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{DebugTransport, OutputStream};

/// In-memory transport for testing
///
/// This transport uses channels for bidirectional communication without
/// requiring actual network connections.
///
/// ```
/// use std::io::{Read, Write};
/// use transport::io::{DebugTransport, InMemoryTransport};
///
/// let (controller, server) = InMemoryTransport::pair();
/// let (_, mut controller_writer) = controller.split()?;
/// let (mut server_reader, _) = server.split()?;
///
/// controller_writer.write_all(br#"{"type":"run"}"#)?;
/// let mut buf = [0u8; 14];
/// server_reader.read_exact(&mut buf)?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

/// Reader half of in-memory transport
///
/// When the channel is empty, it returns `WouldBlock` to simulate the read
/// timeout of the TCP transport.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of in-memory transport
pub struct InMemoryWriter {
    tx: Option<Sender<Vec<u8>>>,
}

impl InMemoryTransport {
    /// Create a connected pair of in-memory transports
    ///
    /// Data written to one can be read from the other.
    pub fn pair() -> (Self, Self) {
        let (first_tx, second_rx) = crossbeam_channel::unbounded();
        let (second_tx, first_rx) = crossbeam_channel::unbounded();

        let first = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: first_rx,
            },
            writer: InMemoryWriter { tx: Some(first_tx) },
        };

        let second = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: second_rx,
            },
            writer: InMemoryWriter {
                tx: Some(second_tx),
            },
        };

        (first, second)
    }
}

impl DebugTransport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.try_recv() {
                Ok(data) => self.buffer = Cursor::new(data),
                Err(TryRecvError::Empty) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "no data available",
                    ));
                }
                // peer closed, end of stream
                Err(TryRecvError::Disconnected) => return Ok(0),
            }
        }

        self.buffer.read(buf)
    }
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"))?;
        tx.send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputStream for InMemoryWriter {
    fn close(&mut self) -> io::Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_communication() -> io::Result<()> {
        let (controller, server) = InMemoryTransport::pair();
        let (mut controller_reader, mut controller_writer) = controller.split().unwrap();
        let (mut server_reader, mut server_writer) = server.split().unwrap();

        let msg = b"{\"type\":\"pause\"}";
        controller_writer.write_all(msg)?;

        let mut buf = vec![0u8; msg.len()];
        server_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, msg);

        let response = b"{\"type\":\"break\"}";
        server_writer.write_all(response)?;

        let mut buf = vec![0u8; response.len()];
        controller_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, response);

        Ok(())
    }

    #[test]
    fn test_would_block_on_empty_channel() {
        let (controller, _server) = InMemoryTransport::pair();
        let (mut reader, _writer) = controller.split().unwrap();

        let mut buf = [0u8; 4];
        match reader.read(&mut buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            other => panic!("Expected WouldBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_eof_after_peer_closes() -> io::Result<()> {
        let (controller, server) = InMemoryTransport::pair();
        let (mut reader, _writer) = controller.split().unwrap();
        let (_server_reader, mut server_writer) = server.split().unwrap();

        server_writer.write_all(b"{}")?;
        server_writer.close()?;

        let mut received = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match reader.read(&mut buf)? {
                0 => break,
                n => received.extend_from_slice(&buf[..n]),
            }
        }
        assert_eq!(received, b"{}");

        assert!(server_writer.write_all(b"{}").is_err());
        Ok(())
    }

    #[test]
    fn test_reads_span_writes() -> io::Result<()> {
        let (controller, server) = InMemoryTransport::pair();
        let (mut controller_reader, _controller_writer) = controller.split().unwrap();
        let (_server_reader, mut server_writer) = server.split().unwrap();

        server_writer.write_all(b"First")?;
        server_writer.write_all(b"Second")?;

        let mut buf = vec![0u8; 5];
        controller_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, b"First");

        let mut buf = vec![0u8; 6];
        controller_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, b"Second");

        Ok(())
    }
}
