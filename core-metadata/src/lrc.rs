//! # LRC Parsing
//!
//! Parses synced lyrics in the LRC format:
//!
//! ```text
//! [ar:Artist]
//! [offset:+250]
//! [00:12.00]First line
//! [00:17.20][01:02.40]Repeated chorus
//! ```
//!
//! Timestamps accept `mm:ss`, `mm:ss.xx` and `mm:ss.xxx`. A line may carry
//! several timestamps. Metadata tags are skipped except `offset`, which
//! shifts every line (positive values show lines earlier). Lines without a
//! timestamp are ignored.

use std::time::Duration;

/// A timestamped lyric line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LrcLine {
    pub time: Duration,
    pub text: String,
}

/// Parse LRC text into lines sorted by time.
///
/// Lines sharing a timestamp keep their order of appearance. The `offset`
/// tag applies to the whole file wherever it appears; the last one wins.
pub fn parse_lrc(text: &str) -> Vec<LrcLine> {
    let mut offset_ms: i64 = 0;
    let mut stamped = Vec::new();

    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut stamps = Vec::new();

        while let Some(tag_body) = rest.strip_prefix('[') {
            let Some(end) = tag_body.find(']') else {
                break;
            };
            let tag = &tag_body[..end];
            rest = &tag_body[end + 1..];

            if let Some(ms) = parse_timestamp(tag) {
                stamps.push(ms);
            } else if let Some(value) = tag.strip_prefix("offset:") {
                offset_ms = value.trim().parse().unwrap_or(offset_ms);
            }
        }

        if !stamps.is_empty() {
            stamped.push((stamps, rest.trim()));
        }
    }

    let mut lines: Vec<LrcLine> = stamped
        .into_iter()
        .flat_map(|(stamps, text)| {
            stamps.into_iter().map(move |ms| LrcLine {
                time: Duration::from_millis(ms.saturating_sub(offset_ms).max(0) as u64),
                text: text.to_string(),
            })
        })
        .collect();

    lines.sort_by_key(|line| line.time);
    lines
}

/// Whether `text` contains at least one timestamped line.
pub fn is_synced(text: &str) -> bool {
    text.lines().any(|line| {
        line.trim()
            .strip_prefix('[')
            .and_then(|body| body.find(']').map(|end| &body[..end]))
            .and_then(parse_timestamp)
            .is_some()
    })
}

/// Index of the line active at `position`: the last line starting at or
/// before it. `None` before the first line.
pub fn line_at(lines: &[LrcLine], position: Duration) -> Option<usize> {
    let after = lines.partition_point(|line| line.time <= position);
    after.checked_sub(1)
}

/// `mm:ss`, `mm:ss.xx` or `mm:ss.xxx` in milliseconds.
fn parse_timestamp(tag: &str) -> Option<i64> {
    let (minutes, seconds) = tag.split_once(':')?;
    if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minutes: i64 = minutes.parse().ok()?;

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (seconds, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) || fraction.len() > 3 {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    if whole >= 60 {
        return None;
    }

    let fraction_ms = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 100,
        2 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse::<i64>().ok()?,
    };

    minutes
        .checked_mul(60_000)?
        .checked_add(whole * 1000 + fraction_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONG: &str = "\
[ti:Song]
[ar:Artist]
[00:12.00]First line
[00:17.20][01:02.40]Chorus
[00:05.5]Intro
plain text without time
[00:30]Bridge
";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_parse_sorted_with_repeats() {
        let lines = parse_lrc(SONG);
        let rendered: Vec<(u64, &str)> = lines
            .iter()
            .map(|l| (l.time.as_millis() as u64, l.text.as_str()))
            .collect();

        assert_eq!(
            rendered,
            vec![
                (5_500, "Intro"),
                (12_000, "First line"),
                (17_200, "Chorus"),
                (30_000, "Bridge"),
                (62_400, "Chorus"),
            ]
        );
    }

    #[test]
    fn test_millisecond_precision() {
        let lines = parse_lrc("[01:02.345]Precise");
        assert_eq!(lines[0].time, ms(62_345));
    }

    #[test]
    fn test_offset_shifts_lines() {
        let lines = parse_lrc("[offset:+500]\n[00:01.00]One\n[00:00.20]Zero");
        assert_eq!(lines[0].time, ms(0));
        assert_eq!(lines[1].time, ms(500));

        let later = parse_lrc("[offset:-250]\n[00:01.00]One");
        assert_eq!(later[0].time, ms(1_250));
    }

    #[test]
    fn test_offset_applies_regardless_of_position() {
        let trailing = parse_lrc("[00:01.00]One\n[00:02.00]Two\n[offset:+500]");
        assert_eq!(trailing[0].time, ms(500));
        assert_eq!(trailing[1].time, ms(1_500));
    }

    #[test]
    fn test_huge_minutes_are_not_timestamps() {
        assert!(parse_lrc("[99999999999999999:00]boom").is_empty());
        assert!(!is_synced("[99999999999999999:00]boom"));
    }

    #[test]
    fn test_extreme_offsets_saturate() {
        let early = parse_lrc("[offset:-9223372036854775808]\n[00:01]x");
        assert_eq!(early[0].time, Duration::from_millis(i64::MAX as u64));

        let late = parse_lrc("[offset:9223372036854775807]\n[00:01]x");
        assert_eq!(late[0].time, ms(0));
    }

    #[test]
    fn test_invalid_timestamps_are_not_lines() {
        assert!(parse_lrc("[aa:bb]Nope\n[00:75.00]Nope\n[length:03:20]").is_empty());
    }

    #[test]
    fn test_empty_text_lines_are_kept() {
        let lines = parse_lrc("[00:01.00]\n[00:02.00]After pause");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "");
    }

    #[test]
    fn test_is_synced() {
        assert!(is_synced(SONG));
        assert!(!is_synced("[ar:Someone]\nJust words"));
        assert!(!is_synced(""));
    }

    #[test]
    fn test_line_at() {
        let lines = parse_lrc(SONG);
        assert_eq!(line_at(&lines, ms(0)), None);
        assert_eq!(line_at(&lines, ms(5_500)), Some(0));
        assert_eq!(line_at(&lines, ms(13_000)), Some(1));
        assert_eq!(line_at(&lines, ms(600_000)), Some(4));
        assert_eq!(line_at(&[], ms(1_000)), None);
    }
}
