//! Developer console.
//!
//! Provides:
//! - Console variables (cvars) with typed values and flags
//! - Command registration and execution
//! - Command history
//! - Quote-aware argument parsing
//!
//! # Usage
//! ```ignore
//! let mut console = Console::new();
//! console.register_cvar("resource.autoload", CvarValue::Bool(false), "Load on first access", CvarFlags::NONE);
//! console.register_command("resource.reload_all", |_args, ctx| { ctx.print("done"); Ok(()) });
//! console.exec("resource.reload_all")?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Context};

/// Console variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum CvarValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl CvarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CvarValue::Int(v) => Some(*v),
            CvarValue::Float(v) => Some(*v as i64),
            CvarValue::Bool(v) => Some(i64::from(*v)),
            CvarValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            CvarValue::Bool(v) => *v,
            CvarValue::Int(v) => *v != 0,
            CvarValue::Float(v) => *v != 0.0,
            CvarValue::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            CvarValue::String(s) => s.clone(),
            CvarValue::Int(v) => v.to_string(),
            CvarValue::Float(v) => v.to_string(),
            CvarValue::Bool(v) => v.to_string(),
        }
    }

    /// Parses console input: int, then float, then bool, else string.
    pub fn parse(input: &str) -> Self {
        if let Ok(v) = input.parse::<i64>() {
            CvarValue::Int(v)
        } else if let Ok(v) = input.parse::<f64>() {
            CvarValue::Float(v)
        } else if input == "true" {
            CvarValue::Bool(true)
        } else if input == "false" {
            CvarValue::Bool(false)
        } else {
            CvarValue::String(input.trim_matches('"').to_string())
        }
    }
}

impl std::fmt::Display for CvarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvarValue::Int(v) => write!(f, "{}", v),
            CvarValue::Float(v) => write!(f, "{}", v),
            CvarValue::String(v) => write!(f, "\"{}\"", v),
            CvarValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Console variable metadata.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub value: CvarValue,
    pub default: CvarValue,
    pub description: String,
    pub flags: CvarFlags,
}

bitflags::bitflags! {
    /// Cvar flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        const NONE = 0;
        const ARCHIVE = 1 << 0;      // Written back to the config file
        const READ_ONLY = 1 << 1;    // Fixed after boot
        const DEVELOP = 1 << 2;      // Development builds only
    }
}

impl Default for CvarFlags {
    fn default() -> Self {
        Self::NONE
    }
}

type CvarTable = Arc<RwLock<HashMap<String, Cvar>>>;

/// Command handler function type.
pub type CommandHandler = Box<dyn Fn(&[&str], &mut ConsoleContext) -> anyhow::Result<()> + Send + Sync>;

/// Context passed to command handlers.
pub struct ConsoleContext {
    /// Lines printed by the command.
    pub output: Vec<String>,
    cvars: CvarTable,
}

impl ConsoleContext {
    pub fn print(&mut self, msg: impl Into<String>) {
        self.output.push(msg.into());
    }

    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        read_cvar(&self.cvars, name)
    }

    pub fn set_cvar(&self, name: &str, value: CvarValue) -> anyhow::Result<()> {
        write_cvar(&self.cvars, name, value)
    }
}

fn read_cvar(cvars: &CvarTable, name: &str) -> Option<CvarValue> {
    cvars
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .map(|c| c.value.clone())
}

fn write_cvar(cvars: &CvarTable, name: &str, value: CvarValue) -> anyhow::Result<()> {
    let mut cvars = cvars.write().unwrap_or_else(PoisonError::into_inner);
    let Some(cvar) = cvars.get_mut(name) else {
        bail!("unknown cvar: {}", name);
    };
    if cvar.flags.contains(CvarFlags::READ_ONLY) {
        bail!("cvar {} is read-only", name);
    }
    cvar.value = value;
    Ok(())
}

/// The console.
pub struct Console {
    cvars: CvarTable,
    commands: HashMap<String, CommandHandler>,
    history: Vec<String>,
    max_history: usize,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let mut console = Self {
            cvars: Arc::new(RwLock::new(HashMap::new())),
            commands: HashMap::new(),
            history: Vec::new(),
            max_history: 100,
        };
        console.register_builtin_commands();
        console
    }

    fn register_builtin_commands(&mut self) {
        self.register_command("echo", |args, ctx| {
            ctx.print(args.join(" "));
            Ok(())
        });

        // cvarlist [prefix]
        self.register_command("cvarlist", |args, ctx| {
            let prefix = args.first().copied().unwrap_or("");
            let mut lines: Vec<String> = ctx
                .cvars
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .filter(|c| c.name.starts_with(prefix))
                .map(|c| format!("  {} = {} (default: {}) - {}", c.name, c.value, c.default, c.description))
                .collect();
            lines.sort();
            for line in lines {
                ctx.print(line);
            }
            Ok(())
        });

        // set <cvar> <value>
        self.register_command("set", |args, ctx| {
            if args.len() < 2 {
                bail!("usage: set <cvar> <value>");
            }
            let value = CvarValue::parse(&args[1..].join(" "));
            let line = format!("{} = {}", args[0], value);
            ctx.set_cvar(args[0], value)?;
            ctx.print(line);
            Ok(())
        });
    }

    /// Registers a console variable.
    pub fn register_cvar(&mut self, name: &str, default: CvarValue, description: &str, flags: CvarFlags) {
        let cvar = Cvar {
            name: name.to_string(),
            value: default.clone(),
            default,
            description: description.to_string(),
            flags,
        };
        self.cvars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), cvar);
    }

    /// Registers a command, replacing any previous handler of the same name.
    pub fn register_command<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str], &mut ConsoleContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    /// Sorted names of all registered commands.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Executes a console command line and returns what it printed.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(Vec::new());
        }

        self.history.push(line.to_string());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        let tokens = parse_command_line(line);
        let Some((cmd_name, rest)) = tokens.split_first() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        let mut ctx = ConsoleContext {
            output: Vec::new(),
            cvars: Arc::clone(&self.cvars),
        };

        if cmd_name == "help" {
            ctx.print(format!("commands: {}", self.commands().join(", ")));
            return Ok(ctx.output);
        }

        if let Some(handler) = self.commands.get(cmd_name.as_str()) {
            handler(&args, &mut ctx).with_context(|| format!("command '{}'", cmd_name))?;
            return Ok(ctx.output);
        }

        // A bare cvar name prints it; a name followed by a value sets it.
        match read_cvar(&self.cvars, cmd_name) {
            Some(value) if args.is_empty() => ctx.print(format!("{} = {}", cmd_name, value)),
            Some(_) => {
                let value = CvarValue::parse(&args.join(" "));
                let line = format!("{} = {}", cmd_name, value);
                write_cvar(&self.cvars, cmd_name, value)?;
                ctx.print(line);
            }
            None => ctx.print(format!("Unknown command: {}", cmd_name)),
        }
        Ok(ctx.output)
    }

    /// Gets a cvar value.
    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        read_cvar(&self.cvars, name)
    }

    /// Sets a cvar value, honoring `READ_ONLY`.
    pub fn set_cvar(&self, name: &str, value: CvarValue) -> anyhow::Result<()> {
        write_cvar(&self.cvars, name, value)
    }

    /// Gets command history.
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

/// Parses a command line into tokens, respecting quotes.
fn parse_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
