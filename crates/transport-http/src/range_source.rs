// HTTP Range-backed media source for remote playback

use crate::client::{HttpClient, ProbeInfo};
use audiowave_core::{AudioError, CancelToken, Result};
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};

/// Chunk size for Range requests (256KB)
const CHUNK_SIZE: usize = 256 * 1024;

/// Maximum bytes kept in the chunk cache (8MB)
const MAX_CACHE_SIZE: usize = 8 * 1024 * 1024;

struct CachedChunk {
    offset: u64,
    data: Vec<u8>,
}

/// Seekable reader over a remote resource.
///
/// Reads are served from cached chunks; misses fetch `CHUNK_SIZE` bytes with a
/// Range request. Tripping the cancel token makes every later read fail, which
/// unwinds the decoder reading from this source.
pub struct HttpRangeSource {
    client: HttpClient,
    url: String,
    total_size: Option<u64>,
    position: u64,
    cache: VecDeque<CachedChunk>,
    cached_bytes: usize,
    cancel: CancelToken,
}

impl HttpRangeSource {
    /// Probe `url` and build a source over it
    pub fn open(client: HttpClient, url: &str, cancel: CancelToken) -> Result<Self> {
        let info = client.probe(url, &cancel)?;
        Ok(Self::with_probe(client, url, info, cancel))
    }

    pub fn with_probe(client: HttpClient, url: &str, info: ProbeInfo, cancel: CancelToken) -> Self {
        match info.content_length {
            Some(size) => log::info!(
                "HTTP range source for {}: {} bytes ({:.2} MB)",
                url,
                size,
                size as f64 / 1024.0 / 1024.0
            ),
            None => log::warn!("Content-Length not available for {}", url),
        }
        if !info.accepts_ranges {
            log::warn!("{} did not advertise range support; seeking may fail", url);
        }

        Self {
            client,
            url: url.to_string(),
            total_size: info.content_length,
            position: 0,
            cache: VecDeque::new(),
            cached_bytes: 0,
            cancel,
        }
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    fn cached(&self, offset: u64, size: usize) -> Option<&[u8]> {
        self.cache.iter().find_map(|chunk| {
            let end = chunk.offset + chunk.data.len() as u64;
            if offset >= chunk.offset && offset < end {
                let start = (offset - chunk.offset) as usize;
                let len = size.min(chunk.data.len() - start);
                Some(&chunk.data[start..start + len])
            } else {
                None
            }
        })
    }

    fn fetch_chunk(&mut self, offset: u64) -> Result<()> {
        self.cancel.check()?;

        let mut end = offset + CHUNK_SIZE as u64 - 1;
        if let Some(total) = self.total_size {
            end = end.min(total.saturating_sub(1));
        }

        log::debug!("Fetching range: bytes={}-{}", offset, end);
        let response = self.client.get_with_range(&self.url, offset, Some(end))?;

        if offset > 0 && response.status() == 200 {
            return Err(AudioError::NetworkError(format!(
                "{} ignored the range request",
                self.url
            )));
        }

        let mut data = Vec::with_capacity((end - offset + 1) as usize);
        response
            .into_reader()
            .take(CHUNK_SIZE as u64)
            .read_to_end(&mut data)
            .map_err(|e| AudioError::NetworkError(format!("Failed to read response: {}", e)))?;

        self.cached_bytes += data.len();
        self.cache.push_back(CachedChunk { offset, data });
        while self.cached_bytes > MAX_CACHE_SIZE {
            match self.cache.pop_front() {
                Some(evicted) => self.cached_bytes -= evicted.data.len(),
                None => break,
            }
        }
        Ok(())
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Not `Interrupted`: symphonia retries those reads forever
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "remote source cancelled",
            ));
        }
        if let Some(total) = self.total_size {
            if self.position >= total {
                return Ok(0);
            }
        }

        if self.cached(self.position, buf.len()).is_none() {
            self.fetch_chunk(self.position)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        }

        let n = match self.cached(self.position, buf.len()) {
            Some(data) => {
                buf[..data.len()].copy_from_slice(data);
                data.len()
            }
            // Server returned an empty body: end of stream
            None => 0,
        };
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(pos) => pos,
            SeekFrom::Current(offset) => self.position.saturating_add_signed(offset),
            SeekFrom::End(offset) => match self.total_size {
                Some(total) => total.saturating_add_signed(offset),
                None => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "cannot seek from end: total size unknown",
                    ))
                }
            },
        };

        self.position = new_pos;
        Ok(new_pos)
    }
}

impl symphonia::core::io::MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        self.total_size.is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.total_size
    }
}
