use clap::{Parser, Subcommand};
use mono2midi::{validate_input, Config, MonoToMidi};
use std::path::PathBuf;

/// Monophonic Audio-to-MIDI Transcription
#[derive(Parser)]
#[command(name = "mono2midi")]
#[command(about = "Transcribe monophonic recordings into MIDI notes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze audio file and generate MIDI output
    Analyze {
        /// Input audio file (WAV)
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tempo used for the MIDI file and the quantization grid
        #[arg(long)]
        bpm: Option<u32>,

        /// Extend adjacent same-pitch notes
        #[arg(long)]
        legato: bool,

        /// Snap note starts to the sixteenth-note grid
        #[arg(long)]
        quantize: bool,

        /// Use the logarithmic velocity curve
        #[arg(long)]
        log_velocity: bool,

        /// Also write the conditioned audio as WAV
        #[arg(long)]
        export_conditioned: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            bpm,
            legato,
            quantize,
            log_velocity,
            export_conditioned,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_logging(verbose, quiet);

            // Load configuration
            let mut config = if let Some(config_path) = config {
                mono2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };

            // Command-line switches override the file
            if let Some(bpm) = bpm {
                config.postprocess.bpm = bpm;
            }
            if legato {
                config.postprocess.legato_enabled = true;
            }
            if quantize {
                config.postprocess.quantize_enabled = true;
            }
            if log_velocity {
                config.segmentation.velocity_curve = mono2midi::config::VelocityCurve::Logarithmic;
            }

            // Validate input
            validate_input(&input, &config)?;

            // Create processor
            let processor = MonoToMidi::new(config).with_conditioned_export(export_conditioned);

            // Process audio
            if !quiet {
                println!("Processing {}...", input.display());
            }

            let state = processor.process(&input, &output)?;

            if !quiet {
                println!(
                    "{} notes transcribed, results saved to {}",
                    state.notes.len(),
                    output.display()
                );
            }
        }
        Commands::ValidateConfig { config } => {
            init_logging(false, false);
            let config = mono2midi::config::load_config(config)?;
            let adjustments = mono2midi::config::validate_config(&config)?;
            if adjustments.is_empty() {
                println!("Configuration is valid");
            } else {
                println!("Configuration is usable after clamping:");
                for adjustment in &adjustments {
                    println!("  {}", adjustment);
                }
            }
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
