use anyhow::Result;
use colored::Colorize;
use pulseclock::prelude::*;
use pulseclock::{ENGINE_NAME, VERSION};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration from an optional file plus the environment.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PulseclockConfig::load(config_path.as_deref())?;
    let tempo = config.tempo;

    // 3. Create the session and both engines.
    let session = Session::with_monotonic_clock(config);
    let metronome = session.metronome();
    let playback = session.playback(Timeline::new(demo_progression())?);

    // 4. Spawn listeners for the event streams.
    spawn_event_listeners(&session, &playback);

    // 5. Register a sink that "sounds" each click when its audio time arrives.
    register_click_printer(&session, &metronome).await;

    // 6. Run both engines until Ctrl+C.
    metronome.start(tempo).await?;
    playback.start().await;
    info!("{} v{} running. Press Ctrl+C to stop.", ENGINE_NAME, VERSION);
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Stopping engines...");
    metronome.stop().await;
    playback.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}

/// A short progression to exercise the timeline.
fn demo_progression() -> Vec<Segment> {
    vec![
        Segment::new(1, 0.0, 4.0, "G"),
        Segment::new(2, 4.0, 8.0, "Em"),
        Segment::new(3, 8.0, 12.0, "C"),
        Segment::new(4, 12.0, 16.0, "D"),
    ]
}

/// Spawns tasks that log the system and timeline event streams.
fn spawn_event_listeners(session: &Session, playback: &PlaybackEngine) {
    let mut system_rx = session.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut timeline_rx = playback.subscribe_timeline();
    tokio::spawn(async move {
        let mut last_active = None;
        while let Ok(event) = timeline_rx.recv().await {
            if event.state.active_segment_id != last_active {
                last_active = event.state.active_segment_id;
                info!(
                    "[TIMELINE] {} => segment {:?}",
                    format_timestamp(event.state.cursor),
                    last_active
                );
            }
        }
    });
}

/// Prints each pulse at its scheduled audio time rather than when the
/// scheduler hands it over.
async fn register_click_printer(session: &Session, metronome: &MetronomeEngine) {
    let clock = session.clock();
    metronome
        .on_pulse(move |pulse| {
            let delay = clock
                .now()
                .map(|now| (pulse.audio_time - now).max(0.0))
                .unwrap_or(0.0);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                let tone = pulse.click();
                if pulse.is_accent() {
                    println!("{} {:>6.0} Hz", "TICK".green().bold(), tone.frequency_hz);
                } else {
                    println!("{} {:>6.0} Hz", "tock".dimmed(), tone.frequency_hz);
                }
            });
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_progression_is_a_valid_timeline() {
        let timeline = Timeline::new(demo_progression()).unwrap();
        assert_eq!(timeline.max_end_time(), 16.0);
        assert_eq!(timeline.unique_labels(), vec!["G", "Em", "C", "D"]);
        assert!(!ENGINE_NAME.is_empty() && !VERSION.is_empty());
    }
}
