//! ringlet: a decentralized group-chat ring.
//!
//! `ringlet start <addr>` creates a new swarm and waits for the first
//! peer; `ringlet connect <listen-addr> <peer-addr>` joins an existing
//! one.  Every stdin line is sent to the swarm as a chat message, except
//! `!nick NAME`, which renames this node.

use {
    clap::{Arg, ArgMatches, Command},
    log::warn,
    ringlet_net::{create_swarm, join_swarm, ContentReceiver, RingNetConfig, SwarmHandle},
    std::{
        net::{SocketAddr, ToSocketAddrs},
        process,
        sync::Arc,
    },
    tokio::io::{AsyncBufReadExt, BufReader},
};

/// Prints each delivered message as `name: content`.
struct PrintReceiver;

impl ContentReceiver for PrintReceiver {
    fn receive_content(&self, sender: &str, content: &str) {
        println!("{sender}: {content}");
    }
}

fn cli() -> Command {
    Command::new("ringlet")
        .about("A decentralized chat application")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("start").about("Start a new swarm").arg(
                Arg::new("addr")
                    .help("The address to listen on")
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("connect")
                .about("Connect to an existing swarm")
                .arg(
                    Arg::new("listen-addr")
                        .help("The address to listen on once connected")
                        .required(true),
                )
                .arg(
                    Arg::new("connect-addr")
                        .help("The address to connect to")
                        .required(true),
                ),
        )
}

/// Resolve a `host:port` argument, exiting nonzero on failure.
fn resolve(matches: &ArgMatches, name: &str) -> SocketAddr {
    let text = matches.get_one::<String>(name).expect("required argument");
    match text.to_socket_addrs().ok().and_then(|mut addrs| addrs.next()) {
        Some(addr) => addr,
        None => {
            eprintln!("failed to resolve address {text:?}");
            process::exit(1);
        }
    }
}

/// The `!nick NAME` control token, if this line is one.
fn parse_nick(line: &str) -> Option<&str> {
    line.strip_prefix("!nick ")
        .and_then(|rest| rest.split_whitespace().next())
}

/// Feed stdin lines into the swarm until EOF.
async fn interact(swarm: SwarmHandle) {
    swarm.set_receiver(Arc::new(PrintReceiver));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let outcome = match parse_nick(&line) {
            Some(name) => swarm.change_nickname(name).await,
            None => swarm.send_content(&line).await,
        };
        if let Err(err) = outcome {
            warn!("send failed: {}", err);
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("start", sub)) => {
            let me = resolve(sub, "addr");
            println!("starting a new swarm on {me}...");
            match create_swarm(RingNetConfig::default(), me).await {
                Ok(swarm) => interact(swarm).await,
                Err(err) => {
                    eprintln!("failed to start swarm: {err}");
                    process::exit(1);
                }
            }
        }
        Some(("connect", sub)) => {
            let me = resolve(sub, "listen-addr");
            let them = resolve(sub, "connect-addr");
            println!("joining the swarm via {them}...");
            match join_swarm(RingNetConfig::default(), me, them).await {
                Ok(swarm) => interact(swarm).await,
                Err(err) => {
                    eprintln!("failed to join swarm: {err}");
                    process::exit(1);
                }
            }
        }
        _ => unreachable!("subcommand is required"),
    }
}
