//! Test-only helpers: scratch generation directories and a canned HTTP server.

use std::cell::RefCell;
use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;

use tempfile::TempDir;

use crate::core::log_name::log_file_name;
use crate::errors::{EntrypointError, Result};
use crate::io::script::ScriptFetcher;

/// Invocation id used for recorded outputs created by tests.
pub const TEST_INVOCATION_ID: &str = "123e4567-e89b-12d3-a456-426655440000";

/// A temporary generation directory.
pub struct GenerationDir {
    temp: TempDir,
}

impl GenerationDir {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Create an empty `<stage>.<index>.<id>.out` file.
    pub fn record(&self, stage: &str, index: u64) -> io::Result<PathBuf> {
        self.write(&log_file_name(stage, index, TEST_INVOCATION_ID), b"")
    }

    pub fn touch(&self, name: &str) -> io::Result<PathBuf> {
        self.write(name, b"")
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Sorted names of every entry in the directory.
    pub fn names(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(self.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<_>>()?;
        names.sort();
        Ok(names)
    }
}

/// Fetcher that records requested URLs and either writes a fixed body or
/// fails like an HTTP 404.
pub struct ScriptedFetcher {
    body: Option<&'static [u8]>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn serving(body: &'static [u8]) -> Self {
        Self {
            body: Some(body),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl ScriptFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.borrow_mut().push(url.to_string());
        let failure = |reason: String| EntrypointError::Download {
            url: url.to_string(),
            path: dest.to_path_buf(),
            reason,
        };
        match self.body {
            Some(body) => {
                fs::write(dest, body).map_err(|err| failure(err.to_string()))?;
                Ok(body.len() as u64)
            }
            None => Err(failure("HTTP status 404 Not Found".to_string())),
        }
    }
}

/// Build a raw HTTP/1.1 response that closes the connection after the body.
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

/// Loopback HTTP server answering one connection per canned response, in
/// order, then exiting.
pub struct CannedServer {
    base_url: String,
    handle: thread::JoinHandle<io::Result<Vec<String>>>,
}

impl CannedServer {
    pub fn start(responses: Vec<Vec<u8>>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let mut request_lines = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept()?;
                let head = read_request_head(&mut stream)?;
                request_lines.push(head.lines().next().unwrap_or_default().to_string());
                stream.write_all(&response)?;
                stream.flush()?;
            }
            Ok(request_lines)
        });
        Ok(Self { base_url, handle })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Wait for every response to be served; returns the request lines seen.
    pub fn finish(self) -> io::Result<Vec<String>> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("canned server thread panicked"))?
    }
}

fn read_request_head(stream: &mut impl Read) -> io::Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte)? == 0 {
            break;
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
