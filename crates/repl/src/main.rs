use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use config::Config;
use crossbeam_channel::Receiver;
use debugger::{ControllerClient, Event};
use tracing_subscriber::filter::EnvFilter;
use transport::types::{CallstackFrame, Variable};

mod command;

use command::{BreakpointSpec, Command, HELP};

/// How long to wait for the first notification after connecting
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

struct App {
    client: ControllerClient,
    events: Receiver<Event>,
    input_rx: Receiver<String>,

    /// Innermost frame of the last call stack seen while paused
    current_frame: Option<CallstackFrame>,
}

impl App {
    fn new(client: ControllerClient) -> Self {
        let events = client.events();

        // handle input
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            let mut buffer = String::new();
            loop {
                match std::io::stdin().read_line(&mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        let input = buffer.trim().to_owned();
                        if input_tx.send(input).is_err() {
                            break;
                        }
                        buffer.clear();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reading from stdin");
                        break;
                    }
                }
            }
        });

        Self {
            client,
            events,
            input_rx,
            current_frame: None,
        }
    }

    fn loop_step(&mut self) -> eyre::Result<ShouldQuit> {
        print!("({}) ", self.client.state());
        std::io::stdout().flush()?;

        crossbeam_channel::select! {
            recv(self.input_rx) -> input => match input {
                Ok(input) => self.handle_input(&input).context("handling command"),
                // stdin closed
                Err(_) => Ok(ShouldQuit::True),
            },
            recv(self.events) -> event => match event {
                Ok(event) => self.handle_debugger_event(event).context("handling debugger event"),
                Err(_) => Ok(ShouldQuit::True),
            },
        }
    }

    #[tracing::instrument(skip(self))]
    fn handle_debugger_event(&mut self, event: Event) -> eyre::Result<ShouldQuit> {
        match event {
            Event::StateChanged { .. } => {}
            Event::ConnectionEstablished => println!("connected"),
            Event::ConnectionFailed => {
                println!("could not connect to the debug server");
                return Ok(ShouldQuit::True);
            }
            Event::ConnectionLost => {
                println!("connection to the debug server lost");
                return Ok(ShouldQuit::True);
            }
            Event::DebuggerRunning => {
                println!("program running");
                self.current_frame = None;
            }
            Event::DebuggerPaused => {
                println!("program paused");
                self.client.get_callstack().context("requesting call stack")?;
            }
            Event::DebuggerFinished => {
                println!("program completed");
                return Ok(ShouldQuit::True);
            }
            Event::SourceCode { path, text, .. } => self.print_source(&path, &text),
            Event::Breakpoints(entries) => {
                if entries.is_empty() {
                    println!("no breakpoints");
                }
                for entry in entries {
                    println!(
                        "{:>3} {}:{} in {}",
                        entry.id, entry.path, entry.line, entry.function_name
                    );
                }
            }
            Event::Callstack(frames) => {
                for (depth, frame) in frames.iter().enumerate() {
                    if frame.is_native() {
                        println!("#{depth:<2} {} <native>", frame.function_name);
                    } else {
                        println!(
                            "#{depth:<2} {} at {}:{}",
                            frame.function_name, frame.path, frame.line
                        );
                    }
                }
                self.current_frame = frames.into_iter().next();
            }
            Event::Variables { depth, variables } => {
                if variables.is_empty() {
                    println!("no variables in frame {depth}");
                }
                print_variables(&variables, 0);
            }
        }
        Ok(ShouldQuit::False)
    }

    fn print_source(&self, path: &str, text: &str) {
        if text.is_empty() {
            println!("no source for {path}");
            return;
        }
        let current_line = self
            .current_frame
            .as_ref()
            .filter(|frame| frame.path == path)
            .map(|frame| frame.line);
        for (number, line) in text.lines().enumerate() {
            let marker = if current_line == Some(number as i64) {
                ">"
            } else {
                " "
            };
            println!("{marker}{number:>4} {line}");
        }
    }

    fn handle_input(&mut self, input: &str) -> eyre::Result<ShouldQuit> {
        let command = match input.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                return Ok(ShouldQuit::False);
            }
        };
        tracing::debug!(?command, "executing command");

        let client = &self.client;
        match command {
            Command::Continue => client.run().context("resuming execution")?,
            Command::Pause => client.pause().context("pausing")?,
            Command::StepInto => client.step_into().context("stepping in")?,
            Command::StepOver => client.step_over().context("stepping over")?,
            Command::StepOut => client.step_out().context("stepping out")?,
            Command::Backtrace => client.get_callstack().context("requesting call stack")?,
            Command::Variables { depth } => client
                .get_variables(depth)
                .context("requesting variables")?,
            Command::Source { path } => client.get_source(path).context("requesting source")?,
            Command::Break(BreakpointSpec { path, line }) => {
                client
                    .add_breakpoint(path, line)
                    .context("adding breakpoint")?;
                client.get_breakpoints().context("listing breakpoints")?;
            }
            Command::Delete { id } => client
                .remove_breakpoint(id)
                .context("removing breakpoint")?,
            Command::ListBreakpoints => client.get_breakpoints().context("listing breakpoints")?,
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(ShouldQuit::True),
            Command::Empty => {}
        }
        Ok(ShouldQuit::False)
    }
}

fn print_variables(variables: &[Variable], indent: usize) {
    for variable in variables {
        let pad = "  ".repeat(indent);
        if variable.members.is_empty() {
            println!(
                "{pad}{} {} = {}",
                variable.type_name, variable.name, variable.value
            );
        } else {
            println!("{pad}{} {}", variable.type_name, variable.name);
            print_variables(&variable.members, indent + 1);
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Terminal controller for the gnk script debugger")]
struct Args {
    /// Host the debug server listens on
    #[clap(long)]
    host: Option<String>,

    /// Port the debug server listens on
    #[clap(short, long)]
    port: Option<u16>,

    /// Configuration file, defaults to the user config directory
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Breakpoints to set once connected, as path:line
    #[clap(short, long = "breakpoint")]
    breakpoints: Vec<BreakpointSpec>,

    /// Where to write logs
    #[clap(long, default_value = "gnk-repl.log")]
    log_file: PathBuf,
}

fn main() -> eyre::Result<()> {
    color_eyre::install().context("installing color_eyre")?;
    let args = Args::parse();

    let log_file = std::fs::File::create(&args.log_file)
        .with_context(|| format!("creating log file {}", args.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Mutex::new(log_file))
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = args.host {
        config.client.host = host;
    }
    if let Some(port) = args.port {
        config.client.port = port;
    }

    let client = ControllerClient::new();
    client
        .connect(&config.client)
        .context("connecting to debug server")?;
    client
        .wait_for_event(
            |event| matches!(event, Event::ConnectionEstablished),
            HANDSHAKE_TIMEOUT,
        )
        .ok_or_else(|| eyre::eyre!("debug server did not respond"))?;
    tracing::debug!("connected");

    for breakpoint in args.breakpoints {
        tracing::debug!(?breakpoint, "adding breakpoint");
        client
            .add_breakpoint(breakpoint.path, breakpoint.line)
            .context("adding breakpoint")?;
    }

    let mut app = App::new(client);
    println!("type help for commands");
    loop {
        match app.loop_step() {
            Ok(ShouldQuit::True) => break,
            Ok(ShouldQuit::False) => {}
            Err(e) => eyre::bail!("Error running command: {e}"),
        }
    }

    Ok(())
}

enum ShouldQuit {
    True,
    False,
}
