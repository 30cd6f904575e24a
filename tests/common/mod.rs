//! An in-process stand-in for a redis server.
//!
//! It speaks just enough RESP for the broker: `PING`, `LPUSH`, `RPUSH`,
//! `BRPOP` and `LLEN` against lists, and a blanket `+OK` for anything
//! else (such as the client's `CLIENT SETINFO` handshake).  Lists live
//! in memory, and can be inspected and seeded directly by the test.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};

type Lists = Arc<Mutex<HashMap<Vec<u8>, VecDeque<Vec<u8>>>>>;

#[derive(Debug, Default)]
struct Switches {
    fail_writes: AtomicBool,
    drop_connections: AtomicUsize,
    accepted: AtomicUsize,
}

#[derive(Debug)]
pub struct FakeRedis {
    addr: SocketAddr,
    lists: Lists,
    switches: Arc<Switches>,
    server: tokio::task::JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let lists = Lists::default();
        let switches = Arc::new(Switches::default());

        let server = tokio::spawn({
            let lists = Arc::clone(&lists);
            let switches = Arc::clone(&switches);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    switches.accepted.fetch_add(1, Ordering::SeqCst);
                    let dropped = switches
                        .drop_connections
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok();
                    if dropped {
                        drop(stream);
                        continue;
                    }

                    tokio::spawn(serve(stream, Arc::clone(&lists), Arc::clone(&switches)));
                }
            }
        });

        Self {
            addr,
            lists,
            switches,
            server,
        }
    }

    pub fn url(&self) -> String { format!("redis://{}/0", self.addr) }

    /// Pushes onto the left of `key`, as `LPUSH` would.
    pub fn lpush(&self, key: &str, value: Vec<u8>) {
        self.lists
            .lock()
            .entry(key.as_bytes().to_vec())
            .or_default()
            .push_front(value);
    }

    /// The contents of `key`, in the order `BRPOP` would return them.
    pub fn pop_order(&self, key: &str) -> Vec<Vec<u8>> {
        self.lists
            .lock()
            .get(key.as_bytes())
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every write command fail with an error reply.
    pub fn fail_writes(&self, fail: bool) { self.switches.fail_writes.store(fail, Ordering::SeqCst); }

    /// Closes the next `count` connections as soon as they're accepted.
    pub fn drop_next_connections(&self, count: usize) {
        self.switches.drop_connections.store(count, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> usize { self.switches.accepted.load(Ordering::SeqCst) }
}

impl Drop for FakeRedis {
    fn drop(&mut self) { self.server.abort(); }
}

/// The address of a port nothing is listening on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);
    format!("redis://{addr}/0")
}

async fn serve(stream: TcpStream, lists: Lists, switches: Arc<Switches>) {
    let (read, mut write) = stream.into_split();
    let mut read = BufReader::new(read);

    while let Some(command) = read_command(&mut read).await {
        let reply = execute(&command, &lists, &switches).await;
        if write.write_all(&reply).await.is_err() {
            break;
        }
    }
}

async fn read_command<R>(read: &mut R) -> Option<Vec<Vec<u8>>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let count = read_header(read, b'*').await?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len = read_header(read, b'$').await?;
        let mut arg = vec![0; len + 2];
        read.read_exact(&mut arg).await.ok()?;
        arg.truncate(len);
        args.push(arg);
    }
    Some(args)
}

async fn read_header<R>(read: &mut R, prefix: u8) -> Option<usize>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if read.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let line = line.trim_end();
    line.strip_prefix(char::from(prefix))?.parse().ok()
}

async fn execute(command: &[Vec<u8>], lists: &Lists, switches: &Switches) -> Vec<u8> {
    let Some(name) = command.first() else {
        return b"-ERR empty command\r\n".to_vec();
    };

    match name.to_ascii_uppercase().as_slice() {
        b"PING" => b"+PONG\r\n".to_vec(),
        b"LPUSH" | b"RPUSH" if switches.fail_writes.load(Ordering::SeqCst) => {
            b"-ERR writes are failing\r\n".to_vec()
        }
        b"LPUSH" | b"RPUSH" => {
            let left = name.eq_ignore_ascii_case(b"LPUSH");
            let mut lists = lists.lock();
            let list = lists.entry(command[1].clone()).or_default();
            for value in &command[2..] {
                if left {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            format!(":{}\r\n", list.len()).into_bytes()
        }
        b"LLEN" => {
            let len = lists.lock().get(&command[1]).map_or(0, VecDeque::len);
            format!(":{len}\r\n").into_bytes()
        }
        b"BRPOP" => brpop(&command[1], &command[2], lists).await,
        _ => b"+OK\r\n".to_vec(),
    }
}

async fn brpop(key: &[u8], timeout: &[u8], lists: &Lists) -> Vec<u8> {
    let timeout = std::str::from_utf8(timeout)
        .ok()
        .and_then(|timeout| timeout.parse::<f64>().ok())
        .unwrap_or(0.0);
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(timeout);

    loop {
        let popped = lists.lock().get_mut(key).and_then(VecDeque::pop_back);
        if let Some(value) = popped {
            let mut reply = format!("*2\r\n${}\r\n", key.len()).into_bytes();
            reply.extend_from_slice(key);
            reply.extend_from_slice(format!("\r\n${}\r\n", value.len()).as_bytes());
            reply.extend_from_slice(&value);
            reply.extend_from_slice(b"\r\n");
            return reply;
        }

        if tokio::time::Instant::now() >= deadline {
            return b"*-1\r\n".to_vec();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
