use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};
use bytes::BytesMut;
use memchr::memmem;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{Level, debug, info, warn};

const NAME_PROMPT: &str = "Enter your name: ";
const PASSWORD_PROMPT: &str = "Enter your password: ";
const NAME_TAKEN: &str = "already taken";
const BOT_PASSWORD: &str = "beep1234";
const WALK: [&str; 4] = ["east", "west", "north", "south"];

#[derive(Clone, Debug)]
struct Config {
    addr: SocketAddr,
    bots: u32,
    interval: Duration,
    // 0 runs forever.
    rounds: u32,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "bot_party\n\n\
USAGE:\n  bot_party [--addr HOST:PORT] [--bots N] [--interval-ms MS] [--rounds N]\n\n\
ENV:\n  GRIDMUD_ADDR  default 127.0.0.1:8080\n  BOTS          default 2\n"
    );
    std::process::exit(2);
}

fn parse_args() -> Config {
    parse_from(|k| std::env::var(k).ok(), std::env::args().skip(1))
        .unwrap_or_else(|| usage_and_exit())
}

/// `None` means print usage.
fn parse_from(
    env: impl Fn(&str) -> Option<String>,
    args: impl IntoIterator<Item = String>,
) -> Option<Config> {
    let mut addr: SocketAddr = env("GRIDMUD_ADDR")
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .ok()?;
    let mut bots = match env("BOTS") {
        Some(v) => positive(&v)?,
        None => 2,
    };
    let mut interval = Duration::from_millis(1000);
    let mut rounds = 0;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--addr" => addr = it.next()?.parse().ok()?,
            "--bots" => bots = positive(&it.next()?)?,
            "--interval-ms" => interval = Duration::from_millis(it.next()?.parse().ok()?),
            "--rounds" => rounds = it.next()?.parse().ok()?,
            _ => return None,
        }
    }

    Some(Config {
        addr,
        bots,
        interval,
        rounds,
    })
}

fn positive(v: &str) -> Option<u32> {
    v.trim().parse().ok().filter(|n| *n > 0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bot_party=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.addr, bots = cfg.bots, rounds = cfg.rounds, "bot party starting");

    let mut tasks = Vec::new();
    for i in 0..cfg.bots {
        let name = format!("Bot{}", i + 1);
        let cfg = cfg.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match bot_loop(&cfg, &name).await {
                    Ok(()) => break,
                    Err(e) => warn!(bot = %name, err = %e, "bot loop error; retrying"),
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }));
    }

    for t in tasks {
        t.await?;
    }
    Ok(())
}

async fn bot_loop(cfg: &Config, name: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect(cfg.addr)
        .await
        .with_context(|| format!("connect {}", cfg.addr))?;
    stream.set_nodelay(true)?;
    play(Client::new(stream), name, cfg.interval, cfg.rounds).await
}

/// Log in, then cycle through the command script. Quits after `rounds`
/// rounds, or never when `rounds` is 0.
async fn play<S>(mut c: Client<S>, name: &str, interval: Duration, rounds: u32) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    c.read_until(&[NAME_PROMPT]).await?;
    c.send_line(name).await?;
    let (which, _) = c.read_until(&[PASSWORD_PROMPT, NAME_TAKEN]).await?;
    if which == 1 {
        bail!("name {name} is taken");
    }
    c.send_line(BOT_PASSWORD).await?;
    c.read_prompt(name).await?;
    info!(bot = %name, "logged in");

    let mut round = 0u32;
    loop {
        let dir = WALK[round as usize % WALK.len()];
        let say = format!("say {name} checking in, round {}", round + 1);
        for cmd in ["look", dir, "who", say.as_str()] {
            c.send_line(cmd).await?;
            let reply = c.read_prompt(name).await?;
            debug!(bot = %name, cmd = %cmd, reply = %reply.trim_end(), "reply");
            info!(bot = %name, cmd = %cmd, first = %reply.lines().next().unwrap_or(""), "ok");
            tokio::time::sleep(interval).await;
        }

        round += 1;
        if rounds != 0 && round >= rounds {
            break;
        }
    }

    c.send_line("quit").await?;
    c.read_until(&["Bye!\n"]).await?;
    info!(bot = %name, rounds = round, "done");
    Ok(())
}

struct Client<S> {
    stream: S,
    buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.stream.write_all(format!("{line}\r\n").as_bytes()).await?;
        Ok(())
    }

    /// Consume input up to the earliest of `markers`. Returns the index of the
    /// marker that matched and the text consumed.
    async fn read_until(&mut self, markers: &[&str]) -> anyhow::Result<(usize, String)> {
        loop {
            if let Some((i, end)) = earliest(&self.buf, markers) {
                let chunk = self.buf.split_to(end);
                return Ok((i, String::from_utf8_lossy(&chunk).into_owned()));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                bail!("server closed the connection");
            }
        }
    }

    /// Consume input through the next `<name>: <hp>/<mana> > ` status line.
    async fn read_prompt(&mut self, name: &str) -> anyhow::Result<String> {
        let (_, mut text) = self.read_until(&[&format!("{name}: ")]).await?;
        let (_, tail) = self.read_until(&[" > "]).await?;
        text.push_str(&tail);
        Ok(text)
    }
}

fn earliest(hay: &[u8], markers: &[&str]) -> Option<(usize, usize)> {
    markers
        .iter()
        .enumerate()
        .filter_map(|(i, m)| memmem::find(hay, m.as_bytes()).map(|p| (i, p + m.len())))
        .min_by_key(|(_, end)| *end)
}
