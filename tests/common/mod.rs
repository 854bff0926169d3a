#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zip::write::SimpleFileOptions;

pub fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Flip one byte inside the first occurrence of `needle`.
pub fn corrupt(bytes: &mut [u8], needle: &[u8]) {
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle not in archive");
    bytes[at + needle.len() / 2] ^= 0x55;
}

pub fn manifest_plist(component: &str, path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>BuildIdentities</key>
    <array>
        <dict>
            <key>Manifest</key>
            <dict>
                <key>{component}</key>
                <dict>
                    <key>Info</key>
                    <dict>
                        <key>Path</key>
                        <string>{path}</string>
                    </dict>
                </dict>
            </dict>
        </dict>
    </array>
</dict>
</plist>
"#
    )
}

/// Deterministic, poorly compressible filler.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Honest range server.
    Normal,
    /// HEAD carries no Content-Length.
    NoLength,
    /// Range responses stop halfway.
    Truncated,
    /// Range responses advertise the full length but the connection closes
    /// halfway through the body.
    DropMidBody,
}

/// Minimal HTTP/1.1 server answering HEAD and ranged GET over a fixed buffer.
pub struct RangeServer {
    pub url: String,
    /// `"<METHOD> <Range header or ->"` for every request received.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl RangeServer {
    pub async fn start(data: Vec<u8>, mode: ServerMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/firmware.ipsw", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let data = Arc::new(data);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let data = Arc::clone(&data);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = handle(socket, &data, mode, &log).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with("GET"))
            .count()
    }
}

async fn handle(
    mut socket: TcpStream,
    data: &[u8],
    mode: ServerMode,
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut request: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let text = String::from_utf8_lossy(&request).to_string();
    let mut lines = text.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split(' ').next())
        .unwrap_or("")
        .to_string();
    let range = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("range"))
        .map(|(_, v)| v.trim().to_string());
    log.lock()
        .unwrap()
        .push(format!("{} {}", method, range.as_deref().unwrap_or("-")));

    let total = data.len();
    let (head, body): (String, &[u8]) = if method == "HEAD" {
        let length = match mode {
            ServerMode::NoLength => String::new(),
            _ => format!("Content-Length: {}\r\n", total),
        };
        (
            format!("HTTP/1.1 200 OK\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n", length),
            &[],
        )
    } else {
        let start = range
            .as_deref()
            .and_then(|r| r.strip_prefix("bytes="))
            .and_then(|r| r.strip_suffix('-'))
            .and_then(|r| r.parse::<usize>().ok());
        match start {
            Some(start) if start < total => {
                let full = &data[start..];
                let body = match mode {
                    ServerMode::Truncated | ServerMode::DropMidBody => &full[..full.len() / 2],
                    _ => full,
                };
                let declared = if mode == ServerMode::DropMidBody {
                    full.len()
                } else {
                    body.len()
                };
                (
                    format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        start,
                        total - 1,
                        total,
                        declared
                    ),
                    body,
                )
            }
            Some(_) => (
                format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    total
                ),
                &[],
            ),
            None => (
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    total
                ),
                data,
            ),
        }
    };

    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body).await?;
    socket.shutdown().await
}
