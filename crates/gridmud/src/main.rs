use std::net::SocketAddr;

use mudcore::{ConnOptions, World};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};

fn usage_and_exit() -> ! {
    eprintln!(
        "gridmud (telnet MUD server)\n\n\
USAGE:\n  gridmud [--bind HOST:PORT] [--outbox N] [--max-line N]\n\n\
ENV:\n  GRIDMUD_BIND      default 127.0.0.1:8080\n  GRIDMUD_OUTBOX    optional; per-session output queue depth, default 128\n  GRIDMUD_MAX_LINE  optional; longest accepted input line in bytes, default 1024\n  RUST_LOG          optional; default info\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Config {
    bind: SocketAddr,
    outbox: usize,
    max_line: usize,
}

impl Config {
    fn conn_options(&self) -> ConnOptions {
        ConnOptions {
            outbox_capacity: self.outbox,
            max_line_len: self.max_line,
        }
    }
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
    let defaults = ConnOptions::default();

    let mut bind: SocketAddr = env("GRIDMUD_BIND")
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .ok()?;
    let mut outbox = match env("GRIDMUD_OUTBOX") {
        Some(v) => positive(&v)?,
        None => defaults.outbox_capacity,
    };
    let mut max_line = match env("GRIDMUD_MAX_LINE") {
        Some(v) => positive(&v)?,
        None => defaults.max_line_len,
    };

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => bind = it.next()?.parse().ok()?,
            "--outbox" => outbox = positive(&it.next()?)?,
            "--max-line" => max_line = positive(&it.next()?)?,
            _ => return None,
        }
    }

    Some(Config {
        bind,
        outbox,
        max_line,
    })
}

fn positive(v: &str) -> Option<usize> {
    v.trim().parse().ok().filter(|n| *n > 0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gridmud=info,mudcore=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    let world = World::starter();
    let listener = TcpListener::bind(cfg.bind).await?;
    let opts = cfg.conn_options();

    info!(
        bind = %cfg.bind,
        rooms = world.rooms.len(),
        outbox = opts.outbox_capacity,
        max_line = opts.max_line_len,
        "gridmud listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let world = world.clone();
        tokio::spawn(async move {
            let (rd, wr) = stream.into_split();
            if let Err(e) = mudcore::serve(rd, wr, peer, world, opts).await {
                warn!(peer = %peer, err = %e, "connection ended with error");
            }
        });
    }
}
