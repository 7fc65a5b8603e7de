//! Scripted rewind sessions against the GBX reference kernel.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kernel_core::CoreConfig;
use log::debug;
use rewind_core::{RewindConfig, RewindError};
use script::Step;
use services_kernel::KernelSession;
use std::fs;
use std::io::{self, Read, Write};
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};

/// Text rendering helpers, one line per executed script step.
mod render {
    use kernel_core::Cpu;
    use rewind_core::{EmuTime, GoOutcome, ReverseReply, ReverseStatus};
    use std::fmt::Display;

    pub fn ran(now: EmuTime) -> String {
        format!("t={now}")
    }

    pub fn input(label: &str, byte: u8, now: EmuTime) -> String {
        format!("{label}={byte:#04x} at t={now}")
    }

    /// Register file plus a digest of every state region.
    pub fn state(now: EmuTime, cpu: &Cpu, digest: u64) -> String {
        format!(
            "t={now} A={:02X} B={:02X} C={:02X} D={:02X} PC={:04X} HL={:04X} digest={digest:016x}",
            cpu.a, cpu.b, cpu.c, cpu.d, cpu.pc, cpu.hl
        )
    }

    pub fn reply(reply: &ReverseReply) -> String {
        match reply {
            ReverseReply::Started => "reverse: collecting".to_string(),
            ReverseReply::Stopped => "reverse: stopped".to_string(),
            ReverseReply::Status(status) => self::status(status),
            ReverseReply::Moved(outcome) => moved(outcome),
        }
    }

    pub fn status(status: &ReverseStatus) -> String {
        format!(
            "reverse: {} begin={} end={} current={} snapshots={} events={} last_event={} memory={}B",
            status.state,
            time_or_dash(status.begin),
            time_or_dash(status.end),
            status.current,
            status.snapshots.len(),
            status.event_count,
            time_or_dash(status.last_event),
            status.memory_bytes
        )
    }

    pub fn moved(outcome: &GoOutcome) -> String {
        let mut out = format!(
            "reverse: at t={} from snapshot t={}, replayed {} event(s)",
            outcome.target, outcome.snapshot_time, outcome.events_replayed
        );
        if outcome.requested != outcome.target {
            out.push_str(&format!(" (requested t={})", outcome.requested));
        }
        out
    }

    /// One JSON object per reply, tagged with `reply`.
    pub fn reply_json(reply: &ReverseReply) -> serde_json::Result<String> {
        serde_json::to_string(reply)
    }

    pub fn error(err: &impl Display) -> String {
        format!("error: {err}")
    }

    /// FNV-1a over the serialized machine state.
    pub fn digest(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
        })
    }

    fn time_or_dash(time: Option<EmuTime>) -> String {
        time.map_or_else(|| "-".to_string(), |t| t.to_string())
    }
}

/// Session script syntax: one command per line, `#` starts a comment.
mod script {
    use anyhow::{bail, Result};
    use rewind_core::ReverseCmd;

    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum Step {
        /// `run <cycles>`
        Run(u64),
        /// `input <mask>`
        Input(u8),
        /// `serial <byte>`
        Serial(u8),
        /// `state`
        State,
        /// `reverse ...`
        Reverse(ReverseCmd),
    }

    /// Parses one line; `None` for blank lines and comments.
    pub fn parse_line(line: &str) -> Result<Option<Step>> {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let step = match verb {
            "run" => Step::Run(parse_u64(single_arg(verb, rest)?)?),
            "input" => Step::Input(parse_u8(single_arg(verb, rest)?)?),
            "serial" => Step::Serial(parse_u8(single_arg(verb, rest)?)?),
            "state" => {
                if !rest.trim().is_empty() {
                    bail!("`state` takes no arguments");
                }
                Step::State
            }
            "reverse" => Step::Reverse(line.parse()?),
            other => bail!("unknown command `{other}`"),
        };
        Ok(Some(step))
    }

    fn single_arg<'a>(verb: &str, rest: &'a str) -> Result<&'a str> {
        let mut words = rest.split_whitespace();
        match (words.next(), words.next()) {
            (Some(arg), None) => Ok(arg),
            _ => bail!("`{verb}` takes exactly one argument"),
        }
    }

    pub fn parse_u64(input: &str) -> Result<u64> {
        let parsed = match input.strip_prefix("0x") {
            Some(stripped) => u64::from_str_radix(stripped, 16),
            None => input.parse::<u64>(),
        };
        match parsed {
            Ok(value) => Ok(value),
            Err(_) => bail!("invalid number '{input}'"),
        }
    }

    pub fn parse_u8(input: &str) -> Result<u8> {
        let value = parse_u64(input)?;
        match u8::try_from(value) {
            Ok(byte) => Ok(byte),
            Err(_) => bail!("'{input}' does not fit in a byte"),
        }
    }
}

/// Built-in session for `gbx-rewind demo`.
const DEMO_SCRIPT: &str = "\
# Record a short session, then travel back through it.
reverse start
run 1500
input 0x01
run 1000
state
run 500
serial 0x42
run 1500
input 0x00
run 1500
state
reverse status
# Back to t=2500: the state line must match the live one above.
reverse goto 2.5
state
# One second earlier, then a new branch without the later input.
reverse back 1
run 4500
state
reverse status
reverse stop
reverse goto 1
";

/// Drive the GBX reference kernel with rewind enabled.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Scripted rewind sessions on the GBX reference kernel",
    long_about = None
)]
struct Cli {
    /// JSON rewind configuration; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emulated cycles between snapshots [default: 1000].
    #[arg(long, value_name = "CYCLES")]
    interval: Option<NonZeroU64>,

    /// Snapshots kept at full density before older ones are thinned [default: 32].
    #[arg(long, value_name = "N")]
    keep_recent: Option<NonZeroUsize>,

    /// Hard cap on retained snapshots.
    #[arg(long, value_name = "N")]
    max_snapshots: Option<NonZeroUsize>,

    /// Cycles per second used by `reverse goto` and `reverse back` [default: 1000].
    #[arg(long, value_name = "CYCLES")]
    ticks_per_second: Option<NonZeroU64>,

    /// Print `reverse` replies as JSON lines.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a session script (`-` reads stdin).
    Run {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
    },
    /// Execute the built-in demo session.
    Demo,
}

/// Defaults sized for the reference kernel rather than real DMG timing.
fn cli_defaults() -> RewindConfig {
    let thousand = NonZeroU64::new(1_000).expect("non-zero");
    RewindConfig {
        ticks_per_second: thousand,
        ..RewindConfig::with_interval(thousand)
    }
}

impl Cli {
    fn rewind_config(&self) -> Result<RewindConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => cli_defaults(),
        };
        if let Some(interval) = self.interval {
            config.snapshot_interval = interval;
        }
        if let Some(tps) = self.ticks_per_second {
            config.ticks_per_second = tps;
        }
        if let Some(keep_recent) = self.keep_recent {
            config.retention.keep_recent = keep_recent;
        }
        if self.max_snapshots.is_some() {
            config.retention.max_snapshots = self.max_snapshots;
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Output {
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = cli.rewind_config()?;
    debug!("rewind config: {config:?}");
    let source = match &cli.command {
        Command::Run { script } => load_script(script)?,
        Command::Demo => DEMO_SCRIPT.to_string(),
    };

    let mut session = KernelSession::new(CoreConfig::default(), config);
    let output = Output { json: cli.json };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_script(&mut session, &source, output, &mut out)
}

fn load_config(path: &Path) -> Result<RewindConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read config {path:?}"))?;
    parse_config(&text).with_context(|| format!("invalid rewind config {path:?}"))
}

/// Parses a JSON rewind configuration. Missing fields take their defaults.
fn parse_config(text: &str) -> Result<RewindConfig> {
    Ok(serde_json::from_str(text)?)
}

fn load_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("failed to read script from stdin")?;
        return Ok(source);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read script {path:?}"))
}

/// Executes `source` line by line. Malformed lines stop the script; rewind
/// errors are printed and the script carries on.
fn run_script<W: Write>(
    session: &mut KernelSession,
    source: &str,
    output: Output,
    out: &mut W,
) -> Result<()> {
    for (idx, line) in source.lines().enumerate() {
        let lineno = idx + 1;
        let step = script::parse_line(line)
            .with_context(|| format!("line {lineno}: `{}`", line.trim()))?;
        let Some(step) = step else {
            continue;
        };
        debug!("script line {lineno}: {step:?}");
        let rendered = match execute(session, step, output) {
            Ok(text) => text,
            Err(err) => match err.downcast_ref::<RewindError>() {
                Some(rewind) => render::error(rewind),
                None => return Err(err.context(format!("line {lineno}"))),
            },
        };
        writeln!(out, "{rendered}").context("failed to write output")?;
    }
    Ok(())
}

fn execute(session: &mut KernelSession, step: Step, output: Output) -> Result<String> {
    let text = match step {
        Step::Run(cycles) => render::ran(session.tick(cycles)?),
        Step::Input(mask) => {
            session.set_inputs(mask)?;
            render::input("joypad", mask, session.now())
        }
        Step::Serial(byte) => {
            session.serial_in(byte)?;
            render::input("serial", byte, session.now())
        }
        Step::State => render::state(
            session.now(),
            &session.instance().core.cpu,
            render::digest(&session.full_state()),
        ),
        Step::Reverse(cmd) => {
            let reply = session.execute(cmd)?;
            if output.json {
                render::reply_json(&reply)?
            } else {
                render::reply(&reply)
            }
        }
    };
    Ok(text)
}
