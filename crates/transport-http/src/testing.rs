// Loopback HTTP server for transport and streaming tests
//
// Serves one in-memory body with HEAD and Range GET support. Every
// connection is answered once and closed.

use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Answer Range requests with 206; otherwise always send the full body with 200
    pub honor_ranges: bool,
    /// Reject HEAD with 405 so clients fall back to a range probe
    pub reject_head: bool,
    /// Hold back ranges that do not start at byte 0 this long
    pub stall_after_first_range: Duration,
    pub content_type: &'static str,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            honor_ranges: true,
            reject_head: false,
            stall_after_first_range: Duration::ZERO,
            content_type: "audio/wav",
        }
    }
}

/// A background server; it lives until the test process exits
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn serve(body: Vec<u8>, options: ServeOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(body);

        let seen = requests.clone();
        thread::Builder::new()
            .name("audiowave-test-http".to_string())
            .spawn(move || {
                for stream in listener.incoming().flatten() {
                    let body = body.clone();
                    let options = options.clone();
                    let seen = seen.clone();
                    thread::spawn(move || {
                        if let Err(e) = respond(stream, &body, &options, &seen) {
                            log::debug!("Test server connection ended: {}", e);
                        }
                    });
                }
            })?;

        Ok(Self { addr, requests })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Request lines with their Range header, e.g. `GET /a.wav bytes=0-99`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

fn parse_range(value: &str, len: u64) -> Option<(u64, u64)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => len.saturating_sub(1),
        e => e.parse::<u64>().ok()?.min(len.saturating_sub(1)),
    };
    Some((start, end))
}

fn respond(
    stream: TcpStream,
    body: &[u8],
    options: &ServeOptions,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut range = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("range") {
                range = Some(value.trim().to_string());
            }
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();
    seen.lock().push(match &range {
        Some(r) => format!("{} {} {}", method, path, r),
        None => format!("{} {}", method, path),
    });

    let len = body.len() as u64;
    let mut out = stream;
    let ranges = if options.honor_ranges { "bytes" } else { "none" };

    if method == "HEAD" {
        let head = if options.reject_head {
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                len, ranges, options.content_type
            )
        };
        return out.write_all(head.as_bytes());
    }

    match range.as_deref().and_then(|r| parse_range(r, len)) {
        Some((start, end)) if options.honor_ranges => {
            if start >= len || start > end {
                let head = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    len
                );
                return out.write_all(head.as_bytes());
            }
            if start > 0 && !options.stall_after_first_range.is_zero() {
                thread::sleep(options.stall_after_first_range);
            }
            let slice = &body[start as usize..=end as usize];
            let head = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                start,
                end,
                len,
                slice.len(),
                options.content_type
            );
            out.write_all(head.as_bytes())?;
            out.write_all(slice)
        }
        _ => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                len, options.content_type
            );
            out.write_all(head.as_bytes())?;
            out.write_all(body)
        }
    }
}

/// 16-bit PCM WAV with `channels` interleaved channels of a constant level
pub fn wav_i16(sample_rate: u32, channels: u16, frames: usize, level: i16) -> Vec<u8> {
    let data_len = (frames * channels as usize * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * channels as usize {
        out.extend_from_slice(&level.to_le_bytes());
    }
    out
}
