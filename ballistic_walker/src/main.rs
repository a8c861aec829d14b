use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use ballistic_walker::{
    IntegrationStatus,
    config::RunConfig,
    output::{write_sweep_summary, write_trajectory_csv},
    plots::{plot_angles, plot_energy, plot_stick_figures},
    sweep::SweepSummary,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ballistic", version, about = "Ballistic swing phase of a three-link walker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Simulate one swing from the configured initial conditions
    Run {
        /// RON run configuration, defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory for the result files
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
        /// Also draw SVG charts of the swing
        #[arg(long)]
        plot: bool,
    },
    /// Simulate the nominal and every sweep initial condition in parallel
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
    /// Write a configuration file with every default filled in
    InitConfig { path: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match execute(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load(config: Option<PathBuf>) -> Result<RunConfig, Box<dyn Error>> {
    match config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            Ok(RunConfig::load(path)?)
        }
        None => Ok(RunConfig::default()),
    }
}

fn execute(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    match cli.command {
        Commands::Run {
            config,
            output,
            plot,
        } => {
            let config = load(config)?;
            let params = config.parameters()?;
            let run = config.simulation().run(&params, &config.initial.to_state())?;
            let energies = run.energies(&params);

            fs::create_dir_all(&output)?;
            write_trajectory_csv(output.join("trajectory.csv"), &run, &energies)?;
            if plot {
                plot_angles(output.join("angles.svg"), &run)?;
                plot_energy(output.join("energy.svg"), &energies)?;
                plot_stick_figures(output.join("stick_figures.svg"), &params, &run, 8)?;
            }
            info!(path = %output.display(), samples = run.trajectory.len(), "results written");

            if !energies.is_empty() {
                match energies.check_conservation(config.energy_tolerance) {
                    Ok(()) => info!(drift = energies.max_relative_drift(), "energy conserved"),
                    Err(e) => warn!("{e}"),
                }
            }

            match &run.status {
                IntegrationStatus::TerminatedByEvent { t } => {
                    println!("knee locked at t = {t:.6} s");
                    Ok(ExitCode::SUCCESS)
                }
                IntegrationStatus::CompletedAtTf { t } => {
                    println!("reached t = {t} s without knee lock");
                    Ok(ExitCode::SUCCESS)
                }
                IntegrationStatus::FailedNumerically(failure) => {
                    eprintln!("swing failed: {failure}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Sweep { config, output } => {
            let config = load(config)?;
            let params = config.parameters()?;
            let outcomes = config.sweep().run(&params);

            fs::create_dir_all(&output)?;
            write_sweep_summary(output.join("sweep.csv"), &params, &outcomes)?;
            for outcome in &outcomes {
                if let Ok(run) = &outcome.run {
                    run.trajectory
                        .write_csv(output.join(format!("run{}.csv", outcome.index)))?;
                }
            }

            let summary = SweepSummary::from_outcomes(&outcomes);
            println!(
                "{} runs: {} knee lock, {} reached final time, {} failed, {} rejected",
                summary.total(),
                summary.terminated,
                summary.completed,
                summary.failed,
                summary.rejected
            );
            if summary.failed + summary.rejected > 0 {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::InitConfig { path } => {
            RunConfig::default().save(&path)?;
            println!("wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
