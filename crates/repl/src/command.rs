use std::str::FromStr;

use color_eyre::eyre::{self, WrapErr};

/// A breakpoint given as `path:line`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub path: String,
    pub line: i64,
}

impl FromStr for BreakpointSpec {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, line) = s
            .rsplit_once(':')
            .ok_or_else(|| eyre::eyre!("expected path:line, got {s:?}"))?;
        eyre::ensure!(!path.is_empty(), "missing path in {s:?}");
        let line = line
            .parse()
            .wrap_err_with(|| format!("invalid line number {line:?}"))?;
        Ok(Self {
            path: path.to_string(),
            line,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Continue,
    Pause,
    StepInto,
    StepOver,
    StepOut,
    Backtrace,
    Variables { depth: i64 },
    Source { path: String },
    Break(BreakpointSpec),
    Delete { id: i64 },
    ListBreakpoints,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
c, run        continue
p, pause      pause the running script
s, step       step into
n, next       step over
o, out        step out
bt            show the call stack
vars [depth]  show variables of a frame (innermost by default)
src [path]    show source (current script by default)
b path:line   add a breakpoint
d id          delete a breakpoint
bl            list breakpoints
q             quit";

impl FromStr for Command {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Empty);
        };
        let argument = words.next();
        eyre::ensure!(words.next().is_none(), "too many arguments");

        let command = match (name, argument) {
            ("c" | "run", None) => Command::Continue,
            ("p" | "pause", None) => Command::Pause,
            ("s" | "step", None) => Command::StepInto,
            ("n" | "next", None) => Command::StepOver,
            ("o" | "out", None) => Command::StepOut,
            ("bt", None) => Command::Backtrace,
            ("vars", depth) => Command::Variables {
                depth: depth
                    .map(str::parse)
                    .transpose()
                    .wrap_err("invalid frame depth")?
                    .unwrap_or(-1),
            },
            ("src", path) => Command::Source {
                path: path.unwrap_or_default().to_string(),
            },
            ("b", Some(spec)) => Command::Break(spec.parse()?),
            ("d", Some(id)) => Command::Delete {
                id: id.parse().wrap_err("invalid breakpoint id")?,
            },
            ("bl", None) => Command::ListBreakpoints,
            ("h" | "help", None) => Command::Help,
            ("q", None) => Command::Quit,
            (other, _) => eyre::bail!("unknown command {other:?}, try help"),
        };
        Ok(command)
    }
}
