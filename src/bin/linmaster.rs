use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

use clap::{App, Arg, SubCommand};
use colored::*;

use linmaster::dispatch::ConsoleSink;
use linmaster::{BusMaster, ShellCommand, SignalDatabase, SimBus};

const DEFAULT_BOARDS: &str = "0,1,2,3";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("linmaster")
        .version("0.1.0")
        .about("LIN bus master - periodic frame scheduling, signal demos and an interactive shell")
        .arg(
            Arg::with_name("boards")
                .short("b")
                .long("boards")
                .value_name("LIST")
                .help("Comma-separated slave board numbers")
                .takes_value(true)
                .default_value(DEFAULT_BOARDS)
                .global(true),
        )
        .arg(
            Arg::with_name("db")
                .long("db")
                .value_name("FILE")
                .help("Signal database JSON file (defaults to the built-in evaluation network)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("baud")
                .long("baud")
                .value_name("RATE")
                .help("Bus baud rate")
                .takes_value(true)
                .default_value("19200")
                .global(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Baud rate must be a number".into()),
                }),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run the demo generators (color fade + LED chase) until interrupted"),
        )
        .subcommand(
            SubCommand::with_name("shell")
                .about("Interactive shell: rgb/led/off commands, bus monitor, status"),
        )
        .get_matches();

    let boards = parse_boards(matches.value_of("boards").unwrap_or(DEFAULT_BOARDS))?;
    let baud: u32 = matches.value_of("baud").unwrap_or("19200").parse()?;

    let db = match matches.value_of("db") {
        Some(path) => SignalDatabase::from_json(&fs::read_to_string(path)?)?,
        None => SignalDatabase::eval_network(&boards)?,
    };

    let mut master = BusMaster::new(db, SimBus::new(&boards), baud)?;

    let stop = master.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    })?;

    match matches.subcommand() {
        ("demo", _) => run_demo(&mut master, &boards)?,
        ("shell", _) => run_shell(&mut master)?,
        _ => {
            println!(
                "{}",
                "No command specified. Use --help for usage information.".yellow()
            );
            println!("{}", "Quick start:".bright_green());
            println!("  {} Run the signal demo", "linmaster demo".bright_cyan());
            println!("  {} Open the shell", "linmaster shell".bright_cyan());
        }
    }

    Ok(())
}

fn parse_boards(list: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<u8>()
                .map_err(|_| format!("invalid board number `{token}`").into())
        })
        .collect()
}

fn run_demo(
    master: &mut BusMaster<SimBus>,
    boards: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    for &board in boards {
        master.register_board(board)?;
        master.add_demo_generators(board)?;
    }
    println!(
        "{} boards {:?} (Ctrl+C to stop)",
        "Running signal demo on".bright_blue().bold(),
        boards
    );
    master.run_demo(&mut ConsoleSink)?;
    Ok(())
}

fn run_shell(master: &mut BusMaster<SimBus>) -> Result<(), Box<dyn std::error::Error>> {
    master.register_publishable()?;
    master.start_schedule()?;
    println!(
        "{} (type `help` for commands)",
        "LIN master shell".bright_blue().bold()
    );

    let stdin = io::stdin();
    let mut sink = ConsoleSink;
    loop {
        print!("{} ", "lin>".bright_green());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("{}", error.to_string().red());
                continue;
            }
        };
        // Command failures are per-line: report and keep the session.
        match master.execute(command, &mut sink) {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => println!("{}", error.to_string().red()),
        }
    }
    Ok(())
}
