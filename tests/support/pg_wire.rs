//! A tiny Postgres backend speaking just enough of protocol v3 for tokio-postgres: trust auth,
//! the extended-query flow (Parse/Describe/Bind/Execute/Close/Sync) and one canned result set
//! returned for every statement. Values are sent in binary, which is what the client asks for.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use deskgate::config::DbConfig;

pub const INT4: i32 = 23;
pub const INT8: i32 = 20;
pub const TEXT: i32 = 25;
pub const TIMESTAMP: i32 = 1114;
pub const TIMESTAMPTZ: i32 = 1184;

/// Column layout and rows handed back for every query.
#[derive(Clone, Default)]
pub struct CannedResult {
    pub columns: Vec<(&'static str, i32)>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

pub fn int4(v: i32) -> Option<Vec<u8>> {
    Some(v.to_be_bytes().to_vec())
}

pub fn int8(v: i64) -> Option<Vec<u8>> {
    Some(v.to_be_bytes().to_vec())
}

pub fn text(v: &str) -> Option<Vec<u8>> {
    Some(v.as_bytes().to_vec())
}

/// Microseconds since 2000-01-01T00:00:00Z, the wire form of both timestamp types.
pub fn micros_since_2000(v: i64) -> Option<Vec<u8>> {
    Some(v.to_be_bytes().to_vec())
}

pub struct FakePostgres {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl Drop for FakePostgres {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakePostgres {
    pub async fn start(result: CannedResult) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
        let port = listener.local_addr().expect("local addr").port();
        let handle = tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let result = result.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(sock, result).await {
                        eprintln!("fake postgres session ended: {e}");
                    }
                });
            }
        });
        Self { port, handle }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            username: "deskgate".to_string(),
            password: String::new(),
            name: "deskgate_test".to_string(),
            ssl_mode: "disable".to_string(),
        }
    }
}

fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(tag);
    out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn push_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

async fn serve(mut sock: TcpStream, result: CannedResult) -> std::io::Result<()> {
    // startup packet has no tag byte
    let len = sock.read_i32().await? as usize;
    let mut startup = vec![0u8; len.saturating_sub(4)];
    sock.read_exact(&mut startup).await?;

    let mut hello = message(b'R', &0i32.to_be_bytes());
    hello.extend(message(b'Z', b"I"));
    sock.write_all(&hello).await?;

    let mut params = 0;
    loop {
        let tag = sock.read_u8().await?;
        let len = sock.read_i32().await? as usize;
        let mut body = vec![0u8; len.saturating_sub(4)];
        sock.read_exact(&mut body).await?;

        let reply = match tag {
            b'P' => {
                params = placeholder_count(&body);
                message(b'1', &[])
            }
            b'D' => describe(params, &result),
            b'B' => message(b'2', &[]),
            b'E' => execute(&result),
            b'C' => message(b'3', &[]),
            b'S' => message(b'Z', b"I"),
            b'X' => return Ok(()),
            _ => Vec::new(),
        };
        sock.write_all(&reply).await?;
    }
}

/// Highest `$n` in the statement text of a Parse message.
fn placeholder_count(parse: &[u8]) -> usize {
    let mut parts = parse.split(|b| *b == 0);
    let _statement_name = parts.next();
    let query = parts.next().unwrap_or_default();

    let mut max = 0;
    let mut i = 0;
    while i < query.len() {
        if query[i] != b'$' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < query.len() && query[end].is_ascii_digit() {
            end += 1;
        }
        if let Ok(n) = std::str::from_utf8(&query[start..end]).unwrap_or("").parse::<usize>() {
            max = max.max(n);
        }
        i = end;
    }
    max
}

/// Every parameter is declared `text`; columns come from the canned layout.
fn describe(params: usize, result: &CannedResult) -> Vec<u8> {
    let mut pd = (params as i16).to_be_bytes().to_vec();
    for _ in 0..params {
        pd.extend_from_slice(&TEXT.to_be_bytes());
    }
    let mut out = message(b't', &pd);

    if result.columns.is_empty() {
        out.extend(message(b'n', &[]));
        return out;
    }
    let mut rd = (result.columns.len() as i16).to_be_bytes().to_vec();
    for (name, oid) in &result.columns {
        push_cstr(&mut rd, name);
        rd.extend_from_slice(&0i32.to_be_bytes());
        rd.extend_from_slice(&0i16.to_be_bytes());
        rd.extend_from_slice(&oid.to_be_bytes());
        rd.extend_from_slice(&(-1i16).to_be_bytes());
        rd.extend_from_slice(&(-1i32).to_be_bytes());
        rd.extend_from_slice(&0i16.to_be_bytes());
    }
    out.extend(message(b'T', &rd));
    out
}

fn execute(result: &CannedResult) -> Vec<u8> {
    let mut out = Vec::new();
    for row in &result.rows {
        let mut dr = (row.len() as i16).to_be_bytes().to_vec();
        for value in row {
            match value {
                Some(bytes) => {
                    dr.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    dr.extend_from_slice(bytes);
                }
                None => dr.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        out.extend(message(b'D', &dr));
    }
    let mut tag = Vec::new();
    push_cstr(&mut tag, &format!("SELECT {}", result.rows.len()));
    out.extend(message(b'C', &tag));
    out
}
