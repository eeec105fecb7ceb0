//! Length-prefixed framing over a byte stream (TCP or Unix socket)
//!
//! Frame: `[4-byte length BE] [payload]`
//!
//! Reads accumulate into a buffer that survives across calls, so a deadline
//! that elapses halfway through a frame does not desynchronize the stream:
//! the rest of the frame is picked up by the next `recv`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;

use super::{Transport, TransportError};

const READ_CHUNK: usize = 64 * 1024;

/// Stream operations the framed transport needs beyond Read + Write
trait FrameStream: Read + Write + Send {
    fn set_read_deadline(&self, timeout: Duration) -> io::Result<()>;
    fn set_write_deadline(&self, timeout: Duration) -> io::Result<()>;
    fn shutdown_both(&self) -> io::Result<()>;
}

impl FrameStream for TcpStream {
    fn set_read_deadline(&self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn set_write_deadline(&self, timeout: Duration) -> io::Result<()> {
        self.set_write_timeout(Some(timeout))
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl FrameStream for UnixStream {
    fn set_read_deadline(&self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn set_write_deadline(&self, timeout: Duration) -> io::Result<()> {
        self.set_write_timeout(Some(timeout))
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

pub struct FramedTransport {
    stream: Option<Box<dyn FrameStream>>,
    buf: Vec<u8>,
    max_message_size: usize,
}

impl FramedTransport {
    pub fn connect_tcp(
        host: &str,
        port: u16,
        timeout: Duration,
        max_message_size: usize,
    ) -> Result<Self, TransportError> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self::from_tcp(stream, max_message_size));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => TransportError::Io(e),
            None => TransportError::Protocol(format!("{}:{} resolved to no addresses", host, port)),
        })
    }

    #[cfg(unix)]
    pub fn connect_unix(path: &Path, max_message_size: usize) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)?;
        Ok(Self::from_unix(stream, max_message_size))
    }

    pub fn from_tcp(stream: TcpStream, max_message_size: usize) -> Self {
        Self::from_stream(Box::new(stream), max_message_size)
    }

    #[cfg(unix)]
    pub fn from_unix(stream: UnixStream, max_message_size: usize) -> Self {
        Self::from_stream(Box::new(stream), max_message_size)
    }

    fn from_stream(stream: Box<dyn FrameStream>, max_message_size: usize) -> Self {
        Self { stream: Some(stream), buf: Vec::new(), max_message_size }
    }

    /// Pop one complete frame off the read buffer, if there is one
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > self.max_message_size {
            return Err(TransportError::Protocol(format!("Message too large: {} bytes", len)));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let frame = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(frame))
    }
}

fn remaining(deadline: Instant) -> Result<Duration, TransportError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(TransportError::TimedOut)
    } else {
        Ok(left)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Transport for FramedTransport {
    fn send(&mut self, frame: &[u8], deadline: Instant) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.set_write_deadline(remaining(deadline)?)?;

        if frame.len() > self.max_message_size {
            return Err(TransportError::Protocol(format!("Message too large: {} bytes", frame.len())));
        }

        match write_frame(stream, frame) {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(TransportError::TimedOut),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn recv(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }

            let left = remaining(deadline)?;
            let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
            stream.set_read_deadline(left)?;

            match stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(TransportError::TimedOut),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.buf.clear();
        if let Some(stream) = self.stream.take() {
            match stream.shutdown_both() {
                Ok(()) => {}
                // Peer already gone
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Blocking frame helpers (server side, tests)
// ============================================================================

/// Read one frame; `Ok(None)` on clean EOF before the length prefix
pub fn read_frame<R: Read>(stream: &mut R, max_message_size: usize) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_message_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(Some(buf))
}

pub fn write_frame<W: Write>(stream: &mut W, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds 4 GiB"))?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (FramedTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (FramedTransport::from_tcp(client, 1024), server)
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_frame_helpers_roundtrip_over_cursor() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"hello").unwrap();
        write_frame(&mut wire, b"").unwrap();
        assert_eq!(&wire[..4], &[0, 0, 0, 5]);

        let mut cursor = io::Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor, 1024).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut cursor, 1024).unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut cursor, 1024).unwrap(), None);
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let mut cursor = io::Cursor::new(vec![0xff, 0xff, 0xff, 0xff]);
        let err = read_frame(&mut cursor, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_send_and_recv() {
        let (mut transport, mut server) = pair();

        transport.send(b"ping", soon()).unwrap();
        assert_eq!(read_frame(&mut server, 1024).unwrap(), Some(b"ping".to_vec()));

        write_frame(&mut server, b"pong").unwrap();
        assert_eq!(transport.recv(soon()).unwrap(), b"pong".to_vec());
    }

    #[test]
    fn test_partial_frame_survives_timeout() {
        let (mut transport, mut server) = pair();

        // Length prefix and half the payload
        server.write_all(&[0, 0, 0, 6, b'a', b'b', b'c']).unwrap();
        server.flush().unwrap();

        let err = transport.recv(Instant::now() + Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, TransportError::TimedOut));

        server.write_all(b"def").unwrap();
        assert_eq!(transport.recv(soon()).unwrap(), b"abcdef".to_vec());
    }

    #[test]
    fn test_recv_reports_oversized_frame() {
        let (mut transport, mut server) = pair();
        server.write_all(&(4096u32).to_be_bytes()).unwrap();
        let err = transport.recv(soon()).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_recv_on_peer_close() {
        let (mut transport, server) = pair();
        drop(server);
        let err = transport.recv(soon()).unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut transport, _server) = pair();
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.send(b"x", soon()), Err(TransportError::Closed)));
        assert!(matches!(transport.recv(soon()), Err(TransportError::Closed)));
    }

    #[test]
    fn test_frames_split_across_reads() {
        let (mut transport, mut server) = pair();
        let handle = thread::spawn(move || {
            let mut wire = Vec::new();
            write_frame(&mut wire, b"first").unwrap();
            write_frame(&mut wire, b"second").unwrap();
            for byte in wire {
                server.write_all(&[byte]).unwrap();
            }
            server
        });

        assert_eq!(transport.recv(soon()).unwrap(), b"first".to_vec());
        assert_eq!(transport.recv(soon()).unwrap(), b"second".to_vec());
        handle.join().unwrap();
    }
}
