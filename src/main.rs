//! sigvm CLI - run and render VM patch scripts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use sigvm::patch::PatchConfig;
use sigvm::render::{RenderConfig, Renderer};
use sigvm::script::Interp;
use sigvm::vm::resolve_symbol;

#[derive(Parser)]
#[command(name = "sigvm")]
#[command(about = "Signal-graph VM patch runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and print the patch output of the final block
    Run {
        /// Script file
        script: PathBuf,

        /// Number of blocks to process (default: 1)
        #[arg(short, long, default_value = "1")]
        blocks: usize,

        /// Sample rate in Hz (default: 44100)
        #[arg(short, long, default_value = "44100")]
        sample_rate: u32,

        /// Block size in samples (default: 64)
        #[arg(long, default_value = "64")]
        block_size: usize,
    },

    /// Render a script to WAV
    Render {
        /// Script file
        script: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Duration in seconds (default: 1.0)
        #[arg(short, long, default_value = "1.0")]
        duration: f32,

        /// Sample rate in Hz (default: 44100)
        #[arg(short, long, default_value = "44100")]
        sample_rate: u32,

        /// Block size in samples (default: 64)
        #[arg(long, default_value = "64")]
        block_size: usize,

        /// Master gain 0.0-1.0 (default: 0.8)
        #[arg(short, long, default_value = "0.8")]
        gain: f32,
    },

    /// Resolve a symbol in a program image and print its address
    Sym {
        /// Program image path
        rom: PathBuf,

        /// Symbol name
        symbol: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Run {
            script,
            blocks,
            sample_rate,
            block_size,
        } => {
            let src = std::fs::read_to_string(&script)
                .map_err(|e| format!("could not read '{}': {e}", script.display()))?;

            let mut interp = Interp::new(PatchConfig {
                sample_rate,
                block_size,
                ..Default::default()
            });
            interp.eval_script(&src).map_err(|e| e.to_string())?;

            for _ in 0..blocks {
                interp.core.patch.process_block();
            }

            match interp.core.patch.output() {
                Some(out) => {
                    for (n, s) in interp.core.patch.cables().block(out).iter().enumerate() {
                        println!("{n}\t{s}");
                    }
                }
                None => println!("(script set no output)"),
            }
            Ok(())
        }

        Commands::Render {
            script,
            output,
            duration,
            sample_rate,
            block_size,
            gain,
        } => {
            let src = std::fs::read_to_string(&script)
                .map_err(|e| format!("could not read '{}': {e}", script.display()))?;

            let renderer = Renderer::new(RenderConfig {
                sample_rate,
                block_size,
                duration,
                master_gain: gain,
            });
            let stats = renderer
                .render_to_file(&src, &output)
                .map_err(|e| e.to_string())?;

            println!(
                "wrote {} ({} samples, peak {:.3}, rms {:.3})",
                output.display(),
                stats.sample_count,
                stats.peak,
                stats.rms
            );
            Ok(())
        }

        Commands::Sym { rom, symbol } => {
            let addr = resolve_symbol(&rom, &symbol);
            if addr == 0 {
                return Err(format!(
                    "symbol '{symbol}' not found in '{}'",
                    rom.display()
                ));
            }
            println!("{addr}");
            Ok(())
        }
    }
}
