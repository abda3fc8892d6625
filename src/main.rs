use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use crossterm::style::Stylize;
use syringe::{
    available_ports, logging, FieldMatching, PumpConfig, PumpSession, Recipe, StyledReporter,
    DEFAULT_FLUSH_LENGTH,
};

#[derive(Debug, Parser)]
#[command(name = "pump_cli", version, about = "Replay syringe pump recipes over a serial port")]
struct Cli {
    /// Log protocol exchanges and timing decisions.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the serial ports on this machine.
    Ports,
    /// Load a recipe and print the commands it would send.
    Check {
        #[command(flatten)]
        recipe: RecipeArgs,
    },
    /// Reset the pump, program the syringe and replay the recipe.
    Run {
        /// Serial port of the pump; prompts when omitted.
        #[arg(short, long)]
        port: Option<String>,
        #[command(flatten)]
        recipe: RecipeArgs,
        /// Flush the line with this volume before running.
        #[arg(long, value_name = "VOLUME", num_args = 0..=1, default_missing_value = "200")]
        flush: Option<u32>,
    },
    /// Reset the pump, program the syringe and flush air out of the line.
    Flush {
        #[arg(short, long)]
        port: Option<String>,
        #[command(flatten)]
        recipe: RecipeArgs,
        #[arg(long, default_value_t = DEFAULT_FLUSH_LENGTH)]
        volume: u32,
    },
}

#[derive(Debug, Args)]
struct RecipeArgs {
    /// Recipe file.
    #[arg(short, long)]
    recipe: PathBuf,
    /// TOML file with timing and response settings.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Treat any line mentioning `cycles` or `diameter` as that field.
    #[arg(long)]
    legacy_fields: bool,
}

impl RecipeArgs {
    fn load(&self) -> syringe::Result<(PumpConfig, Recipe)> {
        let mut config = match &self.config {
            Some(path) => PumpConfig::load(path)?,
            None => PumpConfig::default(),
        };
        if self.legacy_fields {
            config.recipe.field_matching = FieldMatching::Substring;
        }
        let recipe = Recipe::load_with(&self.recipe, config.recipe.field_matching)?;
        Ok((config, recipe))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for port in ports {
                println!("{port}");
            }
        }
        Command::Check { recipe } => {
            let (_, recipe) = recipe.load()?;
            print_recipe(&recipe);
        }
        Command::Run {
            port,
            recipe,
            flush,
        } => {
            let (config, recipe) = recipe.load()?;
            let port = resolve_port(port)?;
            print_banner(&port, &recipe);

            let mut session =
                PumpSession::open(&port, recipe, &config, Box::new(StyledReporter::stdout()))?;
            if let Some(volume) = flush {
                session.flush_line(volume)?;
            }
            session.run_recipe()?;
            println!("Recipe complete; port {port} closed.");
        }
        Command::Flush {
            port,
            recipe,
            volume,
        } => {
            let (config, recipe) = recipe.load()?;
            let port = resolve_port(port)?;
            print_banner(&port, &recipe);

            let mut session =
                PumpSession::open(&port, recipe, &config, Box::new(StyledReporter::stdout()))?;
            session.flush_line(volume)?;
            session.close()?;
        }
    }
    Ok(())
}

fn print_banner(port: &str, recipe: &Recipe) {
    println!("=========================");
    println!("   Syringe Pump Driver   ");
    println!("=========================");
    println!(
        "Port {} at {} baud, syringe {} mm, {} cycle(s) of {} command(s)",
        port,
        syringe::config::BAUD_RATE,
        recipe.diameter(),
        recipe.cycles(),
        recipe.commands().len()
    );
}

fn print_recipe(recipe: &Recipe) {
    println!("cycles:   {}", recipe.cycles());
    println!("diameter: {} mm", recipe.diameter());
    println!("setup:    {}", recipe.diameter_command());
    for (i, command) in recipe.commands().iter().enumerate() {
        println!("  {:>3}: {}", i + 1, command);
    }
}

// Uses the given port, or lists the available ones and asks for a choice.
fn resolve_port(port: Option<String>) -> Result<String, Box<dyn Error>> {
    if let Some(port) = port {
        return Ok(port);
    }

    let ports = available_ports()?;
    if ports.is_empty() {
        return Err("no serial ports found".into());
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port);
    }
    print!("Select a port (number): ");
    io::stdout().flush()?;

    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;
    let selected = choice
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|i| ports.get(i).cloned());
    selected.ok_or_else(|| format!("invalid port selection '{}'", choice.trim()).into())
}
