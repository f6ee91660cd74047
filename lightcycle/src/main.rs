#[macro_use] extern crate log;

use std::net::IpAddr;
use std::time::Duration;

use structopt::StructOpt;
use tokio::io::AsyncBufReadExt;

use lightcycle::{Command, Input};

/// Period at which agreed commands are applied, roughly one frame.
const FRAME: Duration = Duration::from_millis(16);

#[derive(StructOpt)]
#[structopt(name = "lightcycle")]
struct Opt {
    /// Coordinator to join; omit to coordinate
    #[structopt(short = "c", long = "connect")]
    connect: Option<IpAddr>,

    /// Rendezvous port
    #[structopt(short = "p", long = "port", default_value = "2620")]
    port: u16,

    /// Local address to listen on
    #[structopt(short = "b", long = "bind", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Interval between leader heartbeats (in milliseconds)
    #[structopt(short = "t", long = "heartbeat", default_value = "100")]
    heartbeat: u64,

    /// Time allowed for all four players to join (in seconds)
    #[structopt(short = "s", long = "setup", default_value = "30")]
    setup: u64,

    /// Logging verbosity; repeat for more
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn setup_logging(verbose: u8) -> Result<(), fern::InitError> {
    let level = match verbose {
    | 0 => log::LevelFilter::Warn,
    | 1 => log::LevelFilter::Info,
    | 2 => log::LevelFilter::Debug,
    | _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}][{}] {}", record.level(), record.target(), message))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    if let Err(error) = setup_logging(opt.verbose) {
        eprintln!("[ERROR]: could not initialize logging: {}", error);
    }

    let mut config = synod::Config::new(opt.port)
        .with_bind(opt.bind)
        .with_heartbeat(Duration::from_millis(opt.heartbeat))
        .with_timeout(Duration::from_secs(opt.setup));

    if let Some(host) = opt.connect {
        config = config.with_coordinator(host);
    }

    let network = match config.start::<Command>().await {
    | Ok(network) => network,
    | Err(error) => {
        error!("rendezvous failed: {}", error);
        std::process::exit(1);
    }
    };

    let player = network.id();
    println!("[RESPONSE]: joined as player {} with {:?}", player, network.addresses());
    println!("{}", lightcycle::usage());
    network.broadcast(Command::Start(player));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut frame = tokio::time::interval(FRAME);

    loop {
        tokio::select! {
            _ = frame.tick() => {
                for command in network.poll_agreed() {
                    println!("[AGREED]: {:?}", command);
                }
            }
            line = lines.next_line() => {
                let line = match line {
                | Ok(Some(line)) => line,
                | Ok(None) => break,
                | Err(error) => {
                    error!("reading input: {}", error);
                    break
                }
                };
                let input = match line.parse::<Input>() {
                | Ok(input) => input,
                | Err(()) => {
                    println!("[ERROR]: could not parse command");
                    continue
                }
                };
                match input {
                | Input::Quit => break,
                | Input::Help => println!("{}", lightcycle::usage()),
                | _ => {
                    if let Some(command) = input.command(player) {
                        network.broadcast(command);
                    }
                }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    network.join().await;
}
