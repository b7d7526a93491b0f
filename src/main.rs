// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use padrec::audio;
use padrec::clock::SystemClock;
use padrec::config::PerformanceConfig;
use padrec::controller::{keyboard, Controller};
use padrec::performance::PerformanceSession;
use padrec::samples::{SampleBank, VoicePlaybackEngine};
use padrec::storage::{JsonStore, SessionId, SessionStore};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A pad sampler that records and replays performances."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the pads and the samples assigned to them.
    Pads {
        /// The path to the performance config.
        config_path: String,
    },
    /// Plays pads from the keyboard, recording and replaying takes.
    Perform {
        /// The path to the performance config.
        config_path: String,
    },
    /// Replays a stored session and exits once it finishes.
    Replay {
        /// The path to the performance config.
        config_path: String,
        /// The session to replay.
        session_id: u64,
    },
    /// Lists the stored sessions.
    Sessions {
        /// The path to the performance config.
        config_path: String,
    },
    /// Renames a stored session.
    Rename {
        /// The path to the performance config.
        config_path: String,
        /// The session to rename.
        session_id: u64,
        /// The new name.
        name: String,
    },
    /// Deletes a stored session.
    Delete {
        /// The path to the performance config.
        config_path: String,
        /// The session to delete.
        session_id: u64,
    },
}

/// Opens the audio output, loads the configured samples and creates a session.
fn init_session(config: &PerformanceConfig) -> Result<Arc<PerformanceSession>, Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    info!(device = %device, sample_rate = device.sample_rate(), "Audio output opened");

    let bank = Arc::new(SampleBank::new(config.grid(), device.sample_rate()));
    let engine = Arc::new(VoicePlaybackEngine::new(bank, device, config.max_voices()));
    config.load_samples(&engine);

    let session = Arc::new(PerformanceSession::new(
        engine,
        Arc::new(SystemClock),
        Handle::current(),
    ));
    session.set_master_volume(config.master_volume());
    session.set_bpm(config.bpm());
    session.set_sound_pack(config.sound_pack().map(str::to_string));
    Ok(session)
}

fn open_store(config: &PerformanceConfig) -> Result<JsonStore, Box<dyn Error>> {
    Ok(JsonStore::open(&config.sessions_dir())?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Pads { config_path } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let grid = config.grid();

            println!("Pads (rows: {}, columns: {}):", grid.rows(), grid.columns());
            for pad in grid.pads() {
                let (row, column) = grid.position(pad)?;
                match config.pads().iter().find(|sample| sample.pad() == pad) {
                    Some(sample) => println!(
                        "- {} (row {}, column {}): {} (volume: {})",
                        pad,
                        row,
                        column,
                        sample.file(),
                        sample.volume()
                    ),
                    None => println!("- {} (row {}, column {}): empty", pad, row, column),
                }
            }
        }
        Commands::Perform { config_path } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let session = init_session(&config)?;
            let store: Arc<dyn SessionStore> = Arc::new(open_store(&config)?);

            let mut controller =
                Controller::new(session, store, Arc::new(keyboard::Driver::new()));
            controller.join().await?;
        }
        Commands::Replay {
            config_path,
            session_id,
        } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let session = init_session(&config)?;
            let store = open_store(&config)?;

            session.replay_session(&store, SessionId::new(session_id))?;
            session.wait_replay().await;
            // Let the tail of the last sample ring out.
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            session.shutdown();
        }
        Commands::Sessions { config_path } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let sessions = open_store(&config)?.list_sessions()?;

            if sessions.is_empty() {
                println!("No sessions found in {}.", config.sessions_dir().display());
                return Ok(());
            }

            println!("Sessions (count: {}):", sessions.len());
            for summary in sessions {
                println!(
                    "- {}: {} (hits: {}, duration: {}ms, bpm: {}, sound pack: {}, modified: {})",
                    summary.id,
                    summary.name,
                    summary.hit_count,
                    summary.duration_ms,
                    summary.bpm,
                    summary.sound_pack.as_deref().unwrap_or("none"),
                    summary.modified_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
        Commands::Rename {
            config_path,
            session_id,
            name,
        } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let id = SessionId::new(session_id);
            open_store(&config)?.rename_session(id, &name)?;
            println!("Renamed session {} to {}.", id, name);
        }
        Commands::Delete {
            config_path,
            session_id,
        } => {
            let config = PerformanceConfig::deserialize(Path::new(&config_path))?;
            let id = SessionId::new(session_id);
            open_store(&config)?.delete_session(id)?;
            println!("Deleted session {}.", id);
        }
    }

    Ok(())
}
