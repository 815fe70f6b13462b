use anyhow::Result;
use colored::Colorize;
use pulseclock::prelude::*;
use pulseclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const LOGO: &str = r"
    ____        __               __         ____
   / __ \__  __/ /_______  _____/ /_  ___  / / /
  / /_/ / / / / / ___/ _ \/ ___/ __ \/ _ \/ / /
 / ____/ /_/ / (__  )  __(__  ) / / /  __/ / /
/_/    \__,_/_/____/\___/____/_/ /_/\___/_/_/
";

/// Syntax highlighting for the prompt line.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LOGO.cyan());
    let rule = "-".repeat(64);
    println!("{}", rule.dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!(
        "{}",
        "\n    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.\n".dimmed()
    );
    println!("{}", rule.dimmed());
}

/// Flags the background listeners check before printing.
#[derive(Clone)]
struct ListenerFlags {
    pulses: Arc<AtomicBool>,
    timeline: Arc<AtomicBool>,
}

/// Spawns one task per event stream. Pulse and timeline output is gated by
/// the shared flags; system events always print.
fn spawn_event_listeners(
    session: &Session,
    metronome: &MetronomeEngine,
    playback: &PlaybackEngine,
    flags: ListenerFlags,
) {
    let mut system_rx = session.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM EVENT] {:?}", event);
        }
    });

    let mut pulse_rx = metronome.subscribe_pulses();
    let show_pulses = flags.pulses.clone();
    tokio::spawn(async move {
        while let Ok(pulse) = pulse_rx.recv().await {
            if show_pulses.load(Ordering::Relaxed) {
                let marker = if pulse.is_accent() {
                    "TICK".green().bold()
                } else {
                    "tock".dimmed()
                };
                println!(
                    "<-- [PULSE] {} beat {} at {:.3}s",
                    marker, pulse.beat_index, pulse.audio_time
                );
            }
        }
    });

    let mut timeline_rx = playback.subscribe_timeline();
    let show_timeline = flags.timeline;
    tokio::spawn(async move {
        let mut last_active = None;
        while let Ok(event) = timeline_rx.recv().await {
            let changed = event.state.active_segment_id != last_active;
            last_active = event.state.active_segment_id;
            if changed && show_timeline.load(Ordering::Relaxed) {
                let active = last_active
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "<-- [TIMELINE] {} active {} ({:?})",
                    format_timestamp(event.state.cursor),
                    active,
                    event.cause
                );
            }
        }
    });
}

/// The eight-chord progression used by `demo`.
fn demo_timeline() -> Result<Timeline> {
    let chords = [
        (1, 0.0, 15.5, "G"),
        (2, 15.5, 30.2, "Em"),
        (3, 30.2, 45.8, "C"),
        (4, 45.8, 61.1, "D"),
        (5, 61.1, 76.7, "G"),
        (6, 76.7, 92.3, "Em"),
        (7, 92.3, 108.0, "Am"),
        (8, 108.0, 123.5, "D7"),
    ];
    let segments = chords
        .into_iter()
        .map(|(id, start, end, label)| Segment::new(id, start, end, label))
        .collect();
    Ok(Timeline::new(segments)?)
}

async fn print_status(metronome: &MetronomeEngine, playback: &PlaybackEngine) {
    let tempo = metronome.tempo().await;
    let running = if metronome.is_running().await {
        "running".green()
    } else {
        "stopped".red()
    };
    println!(
        "Metronome: {} at {} bpm, {} beats per measure, next beat {}",
        running,
        tempo.beats_per_minute,
        tempo.beats_per_measure,
        metronome.next_beat().await
    );

    let state = playback.state().await;
    let timeline = playback.timeline().await;
    let active = state
        .active_segment_id
        .and_then(|id| timeline.get(id))
        .map(|segment| format!("{} {}", segment.id, segment.label))
        .unwrap_or_else(|| "none".to_string());
    println!(
        "Playback:  {} {} / {} ({:.0}%), active {}",
        if state.is_running { "playing".green() } else { "paused".red() },
        format_timestamp(state.cursor),
        format_timestamp(timeline.max_end_time()),
        timeline.progress(state.cursor) * 100.0,
        active
    );
    if !timeline.is_empty() {
        println!("Labels:    {}", timeline.unique_labels().join(" "));
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  metro start [BPM] [BEATS] - Starts the metronome.");
    println!("  metro stop                - Stops the metronome.");
    println!("  tempo <BPM>               - Changes the tempo while running.");
    println!("  measure <N|+|->           - Sets or nudges the beats per measure.");
    println!("  click add | remove <H> | list - Manages console click sinks.");
    println!("  play | pause | toggle     - Controls timeline playback.");
    println!("  seek <SECONDS>            - Moves the cursor and starts playback.");
    println!("  jump <ID>                 - Seeks to the start of a segment.");
    println!("  load <FILE>               - Loads segments from a TOML/JSON/YAML file.");
    println!("  demo                      - Loads the built-in chord progression.");
    println!("  status                    - Shows both engines.");
    println!("  pulses on|off             - Prints the pulse stream.");
    println!("  timeline on|off           - Prints active-segment changes.");
    println!("  exit                      - Quits the shell.");
}

fn parse_toggle(arg: Option<&&str>) -> Option<bool> {
    match arg.copied() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = env::var("PULSECLOCK_CONFIG").ok();
    let config = PulseclockConfig::load(config_path.as_deref().map(Path::new))?;
    let session = Session::with_monotonic_clock(config);
    let metronome = session.metronome();
    let playback = session.playback(Timeline::empty());

    let flags = ListenerFlags {
        pulses: Arc::new(AtomicBool::new(false)),
        timeline: Arc::new(AtomicBool::new(true)),
    };
    spawn_event_listeners(&session, &metronome, &playback, flags.clone());
    info!("{} session ready.", ENGINE_NAME.cyan());

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Console click sinks, addressed by a small shell-local handle.
    let mut click_sinks: HashMap<usize, SinkId> = HashMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!("{} is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting pulseshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "metro" => match args.get(1).copied() {
                Some("start") => {
                    let current = metronome.tempo().await;
                    let bpm = args
                        .get(2)
                        .and_then(|s| s.parse::<u16>().ok())
                        .unwrap_or(current.beats_per_minute);
                    let beats = args
                        .get(3)
                        .and_then(|s| s.parse::<u8>().ok())
                        .unwrap_or(current.beats_per_measure);
                    match TempoConfig::new(bpm, beats) {
                        Ok(tempo) => match metronome.start(tempo).await {
                            Ok(()) => println!("--> Metronome at {} bpm, {} beats.", bpm, beats),
                            Err(e) => println!("Error: {}", e),
                        },
                        Err(e) => println!("Error: {}", e),
                    }
                }
                Some("stop") => {
                    if !metronome.stop().await {
                        println!("--> Metronome was not running.");
                    }
                }
                _ => println!("Usage: metro start [BPM] [BEATS] | metro stop"),
            },
            "tempo" => match args.get(1).and_then(|s| s.parse::<u16>().ok()) {
                Some(bpm) => {
                    let result = match metronome.tempo().await.with_bpm(bpm) {
                        Ok(tempo) => metronome.update_config(tempo).await,
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(()) => println!("--> Tempo set to {} bpm.", bpm),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: tempo <BPM>"),
            },
            "measure" => {
                let current = metronome.tempo().await;
                let next = match args.get(1).copied() {
                    Some("+") => current.adjust_beats_per_measure(1),
                    Some("-") => current.adjust_beats_per_measure(-1),
                    Some(n) => n
                        .parse::<u8>()
                        .ok()
                        .and_then(|beats| current.with_beats_per_measure(beats).ok()),
                    None => None,
                };
                match next {
                    Some(tempo) => match metronome.update_config(tempo).await {
                        Ok(()) => println!("--> {} beats per measure.", tempo.beats_per_measure),
                        Err(e) => println!("Error: {}", e),
                    },
                    None => println!("Usage: measure <2-12|+|->"),
                }
            }
            "click" => match args.get(1).copied() {
                Some("add") => {
                    let handle = next_handle;
                    let clock = session.clock();
                    let sink_id = metronome
                        .on_pulse(move |pulse| {
                            let delay = clock
                                .now()
                                .map(|now| (pulse.audio_time - now).max(0.0))
                                .unwrap_or(0.0);
                            tokio::spawn(async move {
                                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                                let tone = pulse.click();
                                println!("<-- [CLICK #{}] {:.0} Hz", handle, tone.frequency_hz);
                            });
                        })
                        .await;
                    click_sinks.insert(handle, sink_id);
                    next_handle += 1;
                    println!("--> Added click sink with handle: #{}", handle);
                }
                Some("remove") => match args.get(2).and_then(|s| s.parse::<usize>().ok()) {
                    Some(handle) => match click_sinks.remove(&handle) {
                        Some(sink_id) => {
                            if metronome.remove_sink(sink_id).await {
                                println!("--> Click sink removed.");
                            } else {
                                println!("--> Error: Sink not found in engine.");
                            }
                        }
                        None => println!("Error: Invalid handle #{}. Use 'click list'.", handle),
                    },
                    None => println!("Usage: click remove <HANDLE>"),
                },
                Some("list") => {
                    println!("Click sinks:");
                    for (handle, id) in &click_sinks {
                        println!("  Handle #{}: {:?}", handle, id);
                    }
                }
                _ => println!("Usage: click add | click remove <HANDLE> | click list"),
            },
            "play" => {
                if !playback.start().await {
                    println!("--> Already playing.");
                }
            }
            "pause" => {
                if !playback.stop().await {
                    println!("--> Already paused.");
                }
            }
            "toggle" => {
                let playing = playback.toggle().await;
                println!("--> {}", if playing { "Playing." } else { "Paused." });
            }
            "seek" => match args.get(1).and_then(|s| s.parse::<f64>().ok()) {
                Some(time) => {
                    let state = playback.seek(time).await;
                    println!("--> Cursor at {}.", format_timestamp(state.cursor));
                }
                None => println!("Usage: seek <SECONDS>"),
            },
            "jump" => match args.get(1).and_then(|s| s.parse::<u32>().ok()) {
                Some(id) => match playback.jump_to(SegmentId(id)).await {
                    Ok(state) => println!("--> Cursor at {}.", format_timestamp(state.cursor)),
                    Err(e) => println!("Error: {}", e),
                },
                None => println!("Usage: jump <ID>"),
            },
            "load" => match args.get(1) {
                Some(path) => match SegmentFile::load(Path::new(path)) {
                    Ok(timeline) => {
                        playback.load(timeline).await;
                    }
                    Err(e) => println!("Error: {}", e),
                },
                None => println!("Usage: load <FILE>"),
            },
            "demo" => match demo_timeline() {
                Ok(timeline) => {
                    playback.load(timeline).await;
                }
                Err(e) => println!("Error: {}", e),
            },
            "status" => print_status(&metronome, &playback).await,
            "pulses" => match parse_toggle(args.get(1)) {
                Some(on) => flags.pulses.store(on, Ordering::Relaxed),
                None => println!("Usage: pulses on|off"),
            },
            "timeline" => match parse_toggle(args.get(1)) {
                Some(on) => flags.timeline.store(on, Ordering::Relaxed),
                None => println!("Usage: timeline on|off"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
        }
    }

    metronome.stop().await;
    playback.stop().await;
    Ok(())
}
