//! Drives one client connection: telnet line input in, session output out.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use mudio::TelnetLineReader;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::World;
use crate::outbox::{self, Outbox};
use crate::session::{Departure, Session};

/// How long a finished session waits for its output to drain.
const WRITER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ConnOptions {
    /// Per-session output queue depth.
    pub outbox_capacity: usize,
    pub max_line_len: usize,
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self {
            outbox_capacity: outbox::DEFAULT_CAPACITY,
            max_line_len: mudio::line::DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Serve a client until it quits, disconnects or gets kicked.
///
/// Registry cleanup always happens before this returns, whatever the reason.
pub async fn serve<R, W>(
    rd: R,
    wr: W,
    peer: SocketAddr,
    world: World,
    opts: ConnOptions,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (ob, rx) = Outbox::channel(opts.outbox_capacity);
    let writer = tokio::spawn(outbox::pump(rx, wr));
    let mut disconnect_rx = ob.disconnected();

    info!(peer = %peer, "connected");
    let mut session = Session::open(world, peer, ob).await;
    let mut lines = TelnetLineReader::new(rd).max_line_len(opts.max_line_len);

    let res = async {
        while !session.is_disconnected() {
            if session.outbox().is_kicked() {
                warn!(session = %session.id(), peer = %peer, "kicked");
                break;
            }

            let line = tokio::select! {
                r = lines.read_line() => r.context("read line")?,
                _ = disconnect_rx.changed() => continue,
            };

            if let Some(replies) = lines.take_replies() {
                if session.outbox().send(replies).await.is_err() {
                    break;
                }
            }

            let Some(line) = line else {
                debug!(session = %session.id(), peer = %peer, "eof");
                break;
            };
            if session.handle_line(&line).await.is_err() {
                debug!(session = %session.id(), peer = %peer, "output closed");
                break;
            }
        }
        anyhow::Ok(())
    }
    .await;

    session.leave(Departure::Lost).await;
    let id = session.id();
    let kicked = session.outbox().is_kicked();
    drop(session);

    // A kicked client is not reading; its writer may be stuck forever.
    let mut writer = writer;
    if kicked {
        writer.abort();
    }
    match tokio::time::timeout(WRITER_GRACE, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(session = %id, peer = %peer, err = %e, "write failed"),
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => warn!(session = %id, peer = %peer, err = %e, "writer task failed"),
        Err(_) => {
            warn!(session = %id, peer = %peer, "output stalled; dropping it");
            writer.abort();
        }
    }
    info!(session = %id, peer = %peer, "disconnected");
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RoomGraph;
    use crate::registry::SessionKey;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn spawn_conn(
        world: &World,
        port: u16,
        opts: ConnOptions,
    ) -> (DuplexStream, tokio::task::JoinHandle<anyhow::Result<()>>) {
        spawn_conn_piped(world, port, opts, 4096)
    }

    fn spawn_conn_piped(
        world: &World,
        port: u16,
        opts: ConnOptions,
        pipe: usize,
    ) -> (DuplexStream, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let (client, server) = tokio::io::duplex(pipe);
        let (rd, wr) = tokio::io::split(server);
        let task = tokio::spawn(serve(rd, wr, addr(port), world.clone(), opts));
        (client, task)
    }

    /// Read until `want` shows up in the accumulated output.
    async fn expect(c: &mut DuplexStream, want: &str) -> String {
        let mut got = String::new();
        let mut buf = [0u8; 1024];
        tokio::time::timeout(Duration::from_secs(5), async {
            while !got.contains(want) {
                let n = c.read(&mut buf).await.unwrap();
                assert!(n > 0, "eof before {want:?}; got {got:?}");
                got.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want:?}; got {got:?}"));
        got
    }

    async fn login(c: &mut DuplexStream, name: &str) {
        expect(c, "Enter your name: ").await;
        c.write_all(format!("{name}\r\n").as_bytes()).await.unwrap();
        expect(c, "Enter your password: ").await;
        c.write_all(b"pass1\r\n").await.unwrap();
        expect(c, &format!("{name}: 100/100 > ")).await;
    }

    #[tokio::test]
    async fn full_session_over_telnet() {
        let world = World::new(RoomGraph::starter());
        let (mut c, task) = spawn_conn(&world, 4000, ConnOptions::default());

        login(&mut c, "alice").await;
        c.write_all(b"look\r\n").await.unwrap();
        let out = expect(&mut c, "alice: 100/100 > ").await;
        assert!(out.starts_with("Cavern\n"));
        assert!(out.contains("east - Tunnel\n"));

        c.write_all(b"quit\r\n").await.unwrap();
        let mut rest = String::new();
        c.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "Bye!\n");

        task.await.unwrap().unwrap();
        assert!(world.registry.is_empty().await);
    }

    #[tokio::test]
    async fn negotiation_is_refused_and_ignored() {
        let world = World::new(RoomGraph::starter());
        let (c, task) = spawn_conn(&world, 4000, ConnOptions::default());
        let mut c = BufReader::new(c);

        let mut banner = String::new();
        c.read_line(&mut banner).await.unwrap();
        assert_eq!(banner, "Welcome to the MUD!\n");

        c.get_mut()
            .write_all(&[255, 253, 1, b'b', b'o', b'b', b'\r', b'\n'])
            .await
            .unwrap();
        let mut got = Vec::new();
        while !got.ends_with(b"Enter your password: ") {
            let mut b = [0u8; 1];
            c.read_exact(&mut b).await.unwrap();
            got.push(b[0]);
        }
        assert!(got.windows(3).any(|w| w == [255, 252, 1]));
        assert!(world.registry.contains(&SessionKey::Name("bob".into())).await);

        drop(c);
        task.await.unwrap().unwrap();
        assert!(world.registry.is_empty().await);
    }

    #[tokio::test]
    async fn eof_while_playing_notifies_others() {
        let world = World::new(RoomGraph::starter());
        let (mut a, ta) = spawn_conn(&world, 4000, ConnOptions::default());
        let (mut b, tb) = spawn_conn(&world, 4001, ConnOptions::default());
        login(&mut a, "alice").await;
        login(&mut b, "bob").await;

        drop(a);
        ta.await.unwrap().unwrap();
        expect(&mut b, "alice has disconnected.\n").await;

        b.write_all(b"who\r\n").await.unwrap();
        let out = expect(&mut b, "bob: 100/100 > ").await;
        assert!(out.contains("Connected players:\n- bob\n"));
        assert!(!out.contains("- alice"));

        b.write_all(b"quit\n").await.unwrap();
        tb.await.unwrap().unwrap();
        assert!(world.registry.is_empty().await);
    }

    #[tokio::test]
    async fn overlong_line_ends_session() {
        let world = World::new(RoomGraph::starter());
        let opts = ConnOptions {
            max_line_len: 32,
            ..ConnOptions::default()
        };
        let (mut c, task) = spawn_conn(&world, 4000, opts);
        expect(&mut c, "Enter your name: ").await;

        c.write_all(&[b'x'; 200]).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(world.registry.is_empty().await);
    }

    #[tokio::test]
    async fn slow_reader_is_kicked_on_broadcast() {
        let world = World::new(RoomGraph::starter());
        let opts = ConnOptions {
            outbox_capacity: 1,
            ..ConnOptions::default()
        };
        let (mut slow, slow_task) = spawn_conn(&world, 4000, opts);
        login(&mut slow, "sloth").await;

        let (mut fast, fast_task) = spawn_conn(&world, 4001, ConnOptions::default());
        login(&mut fast, "hare").await;

        // Fill the slow client's socket buffer and queue by never reading.
        let spam = format!("say {}\r\n", "z".repeat(900));
        for _ in 0..16 {
            fast.write_all(spam.as_bytes()).await.unwrap();
            expect(&mut fast, "hare: 100/100 > ").await;
        }

        tokio::time::timeout(Duration::from_secs(5), slow_task)
            .await
            .expect("slow session should end")
            .unwrap()
            .unwrap();
        assert!(!world.registry.contains(&SessionKey::Name("sloth".into())).await);

        fast.write_all(b"quit\r\n").await.unwrap();
        fast_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn kick_lands_while_blocked_on_own_reply() {
        let world = World::new(RoomGraph::starter());
        let opts = ConnOptions {
            outbox_capacity: 2,
            ..ConnOptions::default()
        };
        let (mut slow, slow_task) = spawn_conn_piped(&world, 4000, opts, 64);
        login(&mut slow, "sloth").await;

        let (mut fast, fast_task) = spawn_conn(&world, 4001, ConnOptions::default());
        login(&mut fast, "hare").await;

        // Commands keep coming but replies are never read, so the session
        // ends up parked on its own output.
        let (_, mut slow_wr) = tokio::io::split(slow);
        let spammer = tokio::spawn(async move {
            for _ in 0..40 {
                if slow_wr.write_all(b"look\r\n").await.is_err() {
                    break;
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!slow_task.is_finished());

        for _ in 0..3 {
            fast.write_all(b"say hi\r\n").await.unwrap();
            expect(&mut fast, "hare: 100/100 > ").await;
        }

        tokio::time::timeout(Duration::from_secs(5), slow_task)
            .await
            .expect("kicked session should end")
            .unwrap()
            .unwrap();
        assert!(!world.registry.contains(&SessionKey::Name("sloth".into())).await);

        fast.write_all(b"who\r\n").await.unwrap();
        let out = expect(&mut fast, "hare: 100/100 > ").await;
        assert!(!out.contains("- sloth"));

        fast.write_all(b"quit\r\n").await.unwrap();
        fast_task.await.unwrap().unwrap();
        spammer.abort();
    }
}
