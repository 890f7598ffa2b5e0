//! Integration tests for the playback queue
//!
//! These tests walk through listening sessions the way a player drives the
//! queue: build it from a playlist, navigate, edit while playing, shuffle.

use core_library::models::Track;
use core_playback::{MusicQueue, QueueItem};

fn album(n: u32) -> Vec<Track> {
    (1..=n)
        .map(|i| {
            Track::new(
                format!("track-{}", i),
                format!("file:///music/album/{:02}.flac", i),
                format!("Track {}", i),
                "Band",
                240_000,
            )
            .with_album("Album")
        })
        .collect()
}

fn current_title(queue: &MusicQueue) -> &str {
    queue
        .current_track()
        .map(|t| t.title.as_str())
        .unwrap_or("<none>")
}

#[test]
fn test_play_through_album() {
    let mut queue = MusicQueue::from_tracks(album(3), 0);
    let mut played = vec![current_title(&queue).to_string()];

    while queue.skip_to_next() {
        played.push(current_title(&queue).to_string());
    }

    assert_eq!(played, vec!["Track 1", "Track 2", "Track 3"]);
    assert!(!queue.has_next());
    assert!(queue.has_previous());
}

#[test]
fn test_cursor_invariant_through_edits() {
    let mut queue = MusicQueue::from_tracks(album(5), 2);
    let extra = album(7).pop().unwrap();

    queue.insert_next(extra.clone());
    queue.remove_at(0);
    queue.move_item(3, 0);
    queue.add_to_end(extra);
    queue.remove_at(queue.len() - 1);
    queue.remove_at(queue.current_index());

    assert!(!queue.is_empty());
    assert!(queue.current_index() < queue.len());
}

#[test]
fn test_removing_everything_leaves_empty_queue() {
    let mut queue = MusicQueue::from_tracks(album(4), 3);
    while !queue.is_empty() {
        assert!(queue.remove_at(queue.current_index()));
        if !queue.is_empty() {
            assert!(queue.current_index() < queue.len());
        }
    }

    assert_eq!(queue.current_index(), 0);
    assert!(queue.current_item().is_none());
    assert!(!queue.remove_at(0));
}

#[test]
fn test_shuffle_then_unshuffle_session() {
    let mut queue = MusicQueue::from_tracks(album(8), 5);
    queue.shuffle();
    assert_eq!(current_title(&queue), "Track 6");

    queue.skip_to_next();
    let listening_to = current_title(&queue).to_string();

    queue.unshuffle();
    assert_eq!(current_title(&queue), listening_to);

    let order: Vec<&str> = queue
        .items()
        .iter()
        .map(|item: &QueueItem| item.track.title.as_str())
        .collect();
    let expected: Vec<String> = (1..=8).map(|i| format!("Track {}", i)).collect();
    assert_eq!(order, expected);
}

#[test]
fn test_queue_serializes_for_restore() {
    let mut queue = MusicQueue::from_tracks(album(3), 1);
    queue.shuffle();

    let json = serde_json::to_string(&queue).unwrap();
    let restored: MusicQueue = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, queue);
    assert!(restored.is_shuffled());
    assert_eq!(current_title(&restored), "Track 2");
}

#[test]
fn test_restore_clamps_out_of_range_cursor() {
    let queue = MusicQueue::from_tracks(album(1), 0);
    let mut value = serde_json::to_value(&queue).unwrap();
    value["current_index"] = serde_json::json!(5);

    let mut restored: MusicQueue = serde_json::from_value(value).unwrap();
    assert_eq!(restored.current_index(), 0);
    assert!(!restored.has_previous());
    assert_eq!(current_title(&restored), "Track 1");

    restored.insert_next(album(2).pop().unwrap());
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.items()[1].track.title, "Track 2");
}

#[test]
fn test_restore_empty_queue_with_stale_cursor() {
    let json = r#"{"items":[],"current_index":3,"shuffled":true,"next_key":0}"#;
    let mut restored: MusicQueue = serde_json::from_str(json).unwrap();

    assert_eq!(restored.current_index(), 0);
    assert!(!restored.has_previous());
    assert!(!restored.is_shuffled());
    assert!(restored.current_item().is_none());

    restored.insert_next(album(1).pop().unwrap());
    assert_eq!(current_title(&restored), "Track 1");
}

#[test]
fn test_restore_repairs_keys_and_positions() {
    let queue = MusicQueue::from_tracks(album(3), 0);
    let mut value = serde_json::to_value(&queue).unwrap();
    for item in value["items"].as_array_mut().unwrap() {
        item["key"] = serde_json::json!(7);
        item["original_index"] = serde_json::json!(40);
    }
    value["next_key"] = serde_json::json!(0);

    let mut restored: MusicQueue = serde_json::from_value(value).unwrap();
    restored.add_to_end(album(4).pop().unwrap());

    let mut keys: Vec<u64> = restored.items().iter().map(|item| item.key).collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 4);

    let mut positions: Vec<usize> = restored
        .items()
        .iter()
        .map(|item| item.original_index)
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![0, 1, 2, 3]);
}
