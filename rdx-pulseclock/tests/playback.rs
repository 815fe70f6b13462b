use pulseclock::prelude::*;
use std::io::Write;
use std::time::Duration;

fn progression() -> Timeline {
    Timeline::new(vec![
        Segment::new(1, 0.0, 5.0, "G"),
        Segment::new(2, 5.0, 10.0, "Em"),
        Segment::new(3, 10.0, 15.0, "C"),
    ])
    .unwrap()
}

fn session() -> Session {
    Session::with_monotonic_clock(PulseclockConfig::default())
}

#[tokio::test(start_paused = true)]
async fn seeking_matches_advancing_to_the_same_point() {
    let session = session();
    for boundary in [5.0, 10.0] {
        let seeked = session.playback(progression());
        let seek_state = seeked.seek(boundary).await;

        let played = session.playback(progression());
        played.start().await;
        let ticks = (boundary * 10.0) as u64;
        tokio::time::sleep(Duration::from_millis(ticks * 100 + 50)).await;
        let play_state = played.state().await;

        assert_eq!(play_state.cursor, boundary);
        assert_eq!(play_state.active_segment_id, seek_state.active_segment_id);
        seeked.stop().await;
        played.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn cursor_loops_past_the_last_segment() {
    let session = session();
    let playback = session.playback(progression());
    playback.seek(14.9).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    let at_end = playback.state().await;
    assert_eq!(at_end.cursor, 15.0);
    assert_eq!(at_end.active_segment_id, None);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let wrapped = playback.state().await;
    assert_eq!(wrapped.cursor, 0.0);
    assert_eq!(wrapped.active_segment_id, Some(SegmentId(1)));
    assert!(wrapped.is_running);
}

#[tokio::test(start_paused = true)]
async fn stop_freezes_and_start_resumes() {
    let session = session();
    let playback = session.playback(progression());
    assert!(playback.start().await);
    assert!(!playback.start().await);
    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert!(playback.stop().await);
    assert!(!playback.stop().await);
    assert_eq!(playback.state().await.cursor, 1.0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let paused = playback.state().await;
    assert_eq!(paused.cursor, 1.0);
    assert!(!paused.is_running);

    playback.start().await;
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(playback.state().await.cursor, 1.5);
}

#[tokio::test(start_paused = true)]
async fn toggle_alternates_play_and_pause() {
    let session = session();
    let playback = session.playback(progression());
    assert!(playback.toggle().await);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!playback.toggle().await);
    let paused_at = playback.state().await.cursor;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(playback.state().await.cursor, paused_at);
}

#[tokio::test(start_paused = true)]
async fn seek_publishes_immediately_and_ticks_follow() {
    let session = session();
    let playback = session.playback(progression());
    let mut updates = playback.subscribe_timeline();

    let state = playback.seek(7.0).await;
    assert!(state.is_running);
    let seek_event = updates.recv().await.unwrap();
    assert_eq!(seek_event.cause, TimelineCause::Seek);
    assert_eq!(seek_event.state.cursor, 7.0);
    assert_eq!(seek_event.state.active_segment_id, Some(SegmentId(2)));

    let tick_event = updates.recv().await.unwrap();
    assert_eq!(tick_event.cause, TimelineCause::Tick);
    assert_eq!(tick_event.state.cursor, 7.1);
    playback.stop().await;
}

#[tokio::test(start_paused = true)]
async fn jump_targets_a_segment_start() {
    let session = session();
    let playback = session.playback(progression());

    let state = playback.jump_to(SegmentId(3)).await.unwrap();
    assert_eq!(state.cursor, 10.0);
    assert_eq!(state.active_segment_id, Some(SegmentId(3)));

    let missing = playback.jump_to(SegmentId(42)).await;
    assert_eq!(missing, Err(PulseError::UnknownSegment(SegmentId(42))));
    playback.stop().await;
}

#[tokio::test(start_paused = true)]
async fn loading_replaces_the_timeline_and_rewinds() {
    let session = session();
    let mut system_rx = session.subscribe_system_events();
    let playback = session.playback(progression());
    playback.seek(12.0).await;

    let replacement = Timeline::new(vec![
        Segment::new(10, 0.0, 2.0, "Am"),
        Segment::new(11, 2.0, 4.0, "D7"),
    ])
    .unwrap();
    let state = playback.load(replacement).await;
    assert_eq!(state.cursor, 0.0);
    assert!(!state.is_running);
    assert_eq!(state.active_segment_id, Some(SegmentId(10)));
    assert_eq!(playback.timeline().await.max_end_time(), 4.0);

    let mut events = Vec::new();
    while let Ok(event) = system_rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&SystemEvent::SegmentsLoaded {
        count: 2,
        max_end_time: 4.0
    }));
    assert!(events.contains(&SystemEvent::EngineStopped {
        engine: EngineKind::Playback
    }));
}

#[tokio::test(start_paused = true)]
async fn empty_timeline_never_has_an_active_segment() {
    let session = session();
    let playback = session.playback(Timeline::empty());
    playback.start().await;
    tokio::time::sleep(Duration::from_millis(550)).await;
    let state = playback.state().await;
    assert_eq!(state.cursor, 0.0);
    assert_eq!(state.active_segment_id, None);
    playback.stop().await;
}

#[tokio::test(start_paused = true)]
async fn metronome_and_playback_run_independently() {
    let session = session();
    let metronome = session.metronome();
    let playback = session.playback(progression());

    metronome.start(TempoConfig::new(120, 4).unwrap()).await.unwrap();
    playback.start().await;
    tokio::time::sleep(Duration::from_millis(1050)).await;
    metronome.stop().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(playback.state().await.cursor, 1.5);
    assert!(!metronome.is_running().await);
    playback.stop().await;
}

#[test]
fn timeline_state_serializes_for_display_layers() {
    let state = TimelineState {
        cursor: 5.0,
        is_running: true,
        active_segment_id: Some(SegmentId(2)),
    };
    let json = serde_json::to_value(state).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "cursor": 5.0, "is_running": true, "active_segment_id": 2 })
    );
}

#[test]
fn segment_files_load_and_validate() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[[segments]]
id = 1
start_time = 0
end_time = 15.5
label = "G"

[[segments]]
id = 2
start_time = 15.5
end_time = 30.2
label = "Em"
"#
    )
    .unwrap();

    let timeline = SegmentFile::load(file.path()).unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline.max_end_time(), 30.2);
    assert_eq!(timeline.resolve(15.5), Some(SegmentId(2)));

    let mut broken = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        broken,
        "[[segments]]\nid = 1\nstart_time = 4\nend_time = 4\nlabel = \"C\"\n"
    )
    .unwrap();
    assert!(matches!(
        SegmentFile::load(broken.path()),
        Err(PulseError::InvalidSegment { .. })
    ));
}
