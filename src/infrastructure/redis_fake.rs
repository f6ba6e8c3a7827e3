//! Minimal RESP server for exercising the Redis-backed types
//!
//! Understands `GET`, `SET [EX]`, `SETEX`, `XADD`, `XREVRANGE` and `XREAD`;
//! every other command is answered with `+OK`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

type Fields = Vec<(Vec<u8>, Vec<u8>)>;

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    ttls: HashMap<String, u64>,
    streams: HashMap<String, Vec<(u64, Fields)>>,
    next_id: u64,
    connections: usize,
}

pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    /// The first connection is closed right after it answers one `GET`
    pub async fn start_dropping_first_connection() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(drop_first: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let index = {
                    let mut state = shared.lock().unwrap();
                    state.connections += 1;
                    state.connections - 1
                };
                let drop_after_get = drop_first && index == 0;
                tokio::spawn(serve(socket, shared.clone(), drop_after_get));
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// TTL in seconds of the last write to `key`
    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.state.lock().unwrap().ttls.get(key).copied()
    }

    pub fn stream_len(&self, key: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(key)
            .map_or(0, Vec::len)
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<State>>, drop_after_get: bool) -> io::Result<()> {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    while let Some(args) = read_command(&mut reader).await? {
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let reply = if name == "XREAD" {
            xread(&state, &args).await
        } else {
            execute(&state, &name, &args)
        };
        write.write_all(&reply).await?;
        if drop_after_get && name == "GET" {
            return Ok(());
        }
    }
    Ok(())
}

async fn read_command(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count = header(&line, '*')?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len = header(&line, '$')?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(buf);
    }
    Ok(Some(args))
}

fn header(line: &str, prefix: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad header {:?}", line)))
}

fn text(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

fn execute(state: &Mutex<State>, name: &str, args: &[Vec<u8>]) -> Vec<u8> {
    let mut state = state.lock().unwrap();
    match name {
        "GET" => match state.strings.get(&text(&args[1])) {
            Some(value) => bulk(value.as_bytes()),
            None => b"$-1\r\n".to_vec(),
        },
        "SET" => {
            let key = text(&args[1]);
            let ttl = args
                .iter()
                .position(|a| a.eq_ignore_ascii_case(b"EX"))
                .and_then(|i| text(&args[i + 1]).parse().ok());
            state.strings.insert(key.clone(), text(&args[2]));
            if let Some(ttl) = ttl {
                state.ttls.insert(key, ttl);
            }
            b"+OK\r\n".to_vec()
        }
        "SETEX" => {
            let key = text(&args[1]);
            if let Ok(ttl) = text(&args[2]).parse() {
                state.ttls.insert(key.clone(), ttl);
            }
            state.strings.insert(key, text(&args[3]));
            b"+OK\r\n".to_vec()
        }
        "XADD" => {
            let key = text(&args[1]);
            let star = args.iter().skip(2).position(|a| a == b"*").map_or(2, |i| i + 3);
            let fields = args[star..]
                .chunks(2)
                .filter(|pair| pair.len() == 2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            state.next_id += 1;
            let id = state.next_id;
            state.streams.entry(key).or_default().push((id, fields));
            bulk(format!("{}-0", id).as_bytes())
        }
        "XREVRANGE" => {
            let last = state.streams.get(&text(&args[1])).and_then(|s| s.last());
            match last {
                Some(entry) => {
                    let mut out = b"*1\r\n".to_vec();
                    out.extend(encode_entry(entry));
                    out
                }
                None => b"*0\r\n".to_vec(),
            }
        }
        _ => b"+OK\r\n".to_vec(),
    }
}

async fn xread(state: &Mutex<State>, args: &[Vec<u8>]) -> Vec<u8> {
    let block = args
        .iter()
        .position(|a| a.eq_ignore_ascii_case(b"BLOCK"))
        .and_then(|i| text(&args[i + 1]).parse::<u64>().ok());
    let streams = args
        .iter()
        .position(|a| a.eq_ignore_ascii_case(b"STREAMS"))
        .unwrap_or(args.len() - 3);
    let key = text(&args[streams + 1]);
    let after: u64 = text(&args[streams + 2])
        .split('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    let mut waited = 0;
    loop {
        let entries: Vec<(u64, Fields)> = state
            .lock()
            .unwrap()
            .streams
            .get(&key)
            .map(|s| s.iter().filter(|(id, _)| *id > after).cloned().collect())
            .unwrap_or_default();

        if !entries.is_empty() {
            let mut out = b"*1\r\n*2\r\n".to_vec();
            out.extend(bulk(key.as_bytes()));
            out.extend(format!("*{}\r\n", entries.len()).into_bytes());
            for entry in &entries {
                out.extend(encode_entry(entry));
            }
            return out;
        }
        match block {
            Some(ms) if waited < ms => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                waited += 20;
            }
            _ => return b"*-1\r\n".to_vec(),
        }
    }
}

fn encode_entry((id, fields): &(u64, Fields)) -> Vec<u8> {
    let mut out = b"*2\r\n".to_vec();
    out.extend(bulk(format!("{}-0", id).as_bytes()));
    out.extend(format!("*{}\r\n", fields.len() * 2).into_bytes());
    for (field, value) in fields {
        out.extend(bulk(field));
        out.extend(bulk(value));
    }
    out
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}
