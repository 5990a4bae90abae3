use serde::{Deserialize, Serialize};

use super::cue::{sort_cues, DurationPolicy, SubtitleCue};
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// `[MM:SS.CC] text`, one cue per line.
    Bracket,
    /// `index / HH:MM:SS,mmm --> HH:MM:SS,mmm / text` blocks.
    Srt,
    /// `[mm:ss.xx]text`; import only, normalised to Bracket.
    Lrc,
}

impl std::str::FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bracket" => Ok(Self::Bracket),
            "srt" => Ok(Self::Srt),
            "lrc" => Ok(Self::Lrc),
            other => Err(format!("unknown subtitle format '{}'", other)),
        }
    }
}

/// Guess the format of uploaded subtitle text.
pub fn detect_format(text: &str) -> SubtitleFormat {
    if text.contains("-->") {
        SubtitleFormat::Srt
    } else if text.lines().any(is_lrc_line) {
        SubtitleFormat::Lrc
    } else {
        SubtitleFormat::Bracket
    }
}

/// Parse subtitle text into a start-sorted cue list.
///
/// Malformed lines are dropped; the rest of the input still parses.
pub fn parse(text: &str, format: SubtitleFormat, policy: DurationPolicy) -> Vec<SubtitleCue> {
    match format {
        SubtitleFormat::Bracket => parse_bracket(text, policy),
        SubtitleFormat::Srt => parse_srt(text),
        SubtitleFormat::Lrc => parse_bracket(&lrc_to_bracket(text), policy),
    }
}

pub fn parse_auto(text: &str, policy: DurationPolicy) -> Vec<SubtitleCue> {
    parse(text, detect_format(text), policy)
}

pub fn parse_bracket(text: &str, policy: DurationPolicy) -> Vec<SubtitleCue> {
    let mut starts: Vec<(f64, String)> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_bracket_line(line_no + 1, line) {
            Ok(Some(entry)) => starts.push(entry),
            Ok(None) => {}
            Err(err) => log::debug!("dropping subtitle line: {}", err),
        }
    }

    starts.sort_by(|a, b| a.0.total_cmp(&b.0));
    policy.apply(starts)
}

fn parse_bracket_line(line_no: usize, line: &str) -> Result<Option<(f64, String)>, EngineError> {
    let malformed = |reason: &str| EngineError::SubtitleParse {
        line: line_no,
        reason: reason.to_string(),
    };

    let (tag_start, tag_end, time) = find_bracket_tag(line).ok_or_else(|| malformed("no [MM:SS.CC] tag"))?;
    let mut text = String::with_capacity(line.len());
    text.push_str(&line[..tag_start]);
    text.push_str(&line[tag_end..]);
    let text = text.trim();

    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some((time, text.to_string())))
}

/// First `[MM:SS.CC]` tag on the line: (byte start, byte end, seconds).
fn find_bracket_tag(line: &str) -> Option<(usize, usize, f64)> {
    for (open, _) in line.match_indices('[') {
        let Some(close_rel) = line[open..].find(']') else {
            break;
        };
        let inner = &line[open + 1..open + close_rel];
        if let Some(time) = parse_bracket_time(inner) {
            return Some((open, open + close_rel + 1, time));
        }
    }
    None
}

fn parse_bracket_time(inner: &str) -> Option<f64> {
    let (minutes, rest) = inner.split_once(':')?;
    let (seconds, centis) = rest.split_once('.')?;
    if minutes.len() < 2 || seconds.len() != 2 || centis.len() != 2 {
        return None;
    }
    let m: u64 = parse_digits(minutes)?;
    let s: u64 = parse_digits(seconds)?;
    let cs: u64 = parse_digits(centis)?;
    if s >= 60 {
        return None;
    }
    Some(m as f64 * 60.0 + s as f64 + cs as f64 / 100.0)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_srt(text: &str) -> Vec<SubtitleCue> {
    let normalized = text.replace('\r', "");
    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut line_no = 0usize;
    let mut block_line = 1usize;

    for line in normalized.lines().chain(std::iter::once("")) {
        line_no += 1;
        if line.trim().is_empty() {
            if !block.is_empty() {
                match parse_srt_block(block_line, &block) {
                    Ok(Some(cue)) => cues.push(cue),
                    Ok(None) => {}
                    Err(err) => log::debug!("dropping subtitle block: {}", err),
                }
                block.clear();
            }
            block_line = line_no + 1;
            continue;
        }
        block.push(line.trim());
    }

    sort_cues(&mut cues);
    cues
}

fn parse_srt_block(line_no: usize, lines: &[&str]) -> Result<Option<SubtitleCue>, EngineError> {
    let malformed = |reason: &str| EngineError::SubtitleParse {
        line: line_no,
        reason: reason.to_string(),
    };

    let time_idx = lines
        .iter()
        .take(2)
        .position(|l| l.contains("-->"))
        .ok_or_else(|| malformed("missing --> timing line"))?;
    let (start, end) = lines[time_idx]
        .split_once("-->")
        .ok_or_else(|| malformed("missing -->"))?;
    let start = parse_srt_time(start.trim()).ok_or_else(|| malformed("bad start time"))?;
    let end = parse_srt_time(end.trim()).ok_or_else(|| malformed("bad end time"))?;
    if end <= start {
        return Err(malformed("end time not after start time"));
    }

    let text = lines[time_idx + 1..].join("\n");
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(SubtitleCue::new(start, end, text)))
}

fn parse_srt_time(s: &str) -> Option<f64> {
    let (hms, frac) = s.split_once(',').or_else(|| s.split_once('.'))?;
    let mut parts = hms.split(':');
    let h: u64 = parse_digits(parts.next()?)?;
    let m: u64 = parse_digits(parts.next()?)?;
    let sec: u64 = parse_digits(parts.next()?)?;
    if parts.next().is_some() || frac.is_empty() || frac.len() > 3 {
        return None;
    }
    // The field is a millisecond count: ",5" is 5 ms, not 500.
    let ms: u64 = parse_digits(frac)?;
    Some(h as f64 * 3600.0 + m as f64 * 60.0 + sec as f64 + ms as f64 / 1000.0)
}

/// Convert LRC text into Bracket text. Tag lines (`[ar:...]`, `[ti:...]`)
/// are skipped and multi-tag lines expand to one line per tag.
pub fn lrc_to_bracket(text: &str) -> String {
    let mut entries: Vec<(f64, String)> = Vec::new();

    for line in text.lines() {
        let (times, content) = split_lrc_tags(line.trim());
        let content = content.trim();
        if times.is_empty() || content.is_empty() {
            continue;
        }
        for t in times {
            entries.push((t, content.to_string()));
        }
    }

    entries.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut out = String::new();
    for (t, content) in entries {
        out.push_str(&format!("[{}] {}\n", format_bracket_time(t), content));
    }
    out
}

/// Leading `[..]` tags of an LRC line: time tags parsed, anything else
/// (metadata) discards the line.
fn split_lrc_tags(line: &str) -> (Vec<f64>, &str) {
    let mut times = Vec::new();
    let mut rest = line;
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        match parse_lrc_time(&stripped[..close]) {
            Some(t) => times.push(t),
            None => return (Vec::new(), ""),
        }
        rest = &stripped[close + 1..];
    }
    (times, rest)
}

/// `mm:ss`, `mm:ss.xx`, `mm:ss:xx` or `mm:ss.xxx`.
fn parse_lrc_time(tag: &str) -> Option<f64> {
    let (minutes, rest) = tag.split_once(':')?;
    let (seconds, frac) = match rest.find(['.', ':']) {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    let m = parse_digits(minutes)?;
    let s = parse_digits(seconds)?;
    let hundredths = if frac.is_empty() {
        0.0
    } else {
        let digits: String = format!("{:0<2}", frac).chars().take(3).collect();
        parse_digits(&digits)? as f64 / 10f64.powi(digits.len() as i32)
    };
    Some(m as f64 * 60.0 + s as f64 + hundredths)
}

fn is_lrc_line(line: &str) -> bool {
    let line = line.trim();
    let Some(stripped) = line.strip_prefix('[') else {
        return false;
    };
    let Some(close) = stripped.find(']') else {
        return false;
    };
    let tag = &stripped[..close];
    let after = &stripped[close + 1..];

    const META: [&str; 7] = ["ar:", "ti:", "al:", "by:", "au:", "length:", "offset:"];
    if META.iter().any(|m| tag.to_ascii_lowercase().starts_with(m)) {
        return true;
    }
    if parse_lrc_time(tag).is_none() {
        return false;
    }
    // Anything a strict `[MM:SS.CC] text` line would not produce.
    parse_bracket_time(tag).is_none()
        || after.starts_with('[')
        || after.chars().next().is_some_and(|c| !c.is_whitespace())
}

pub fn format_bracket_time(t: f64) -> String {
    let centis = (t.max(0.0) * 100.0).round() as u64;
    format!(
        "{:02}:{:02}.{:02}",
        centis / 6000,
        (centis / 100) % 60,
        centis % 100
    )
}

pub fn format_srt_time(t: f64) -> String {
    let ms = (t.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(cue.start_time),
            format_srt_time(cue.end_time),
            cue.text
        ));
    }
    out
}

pub fn to_bracket(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        let text = cue.text.split('\n').map(str::trim).collect::<Vec<_>>().join(" ");
        out.push_str(&format!("[{}] {}\n", format_bracket_time(cue.start_time), text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(cues: &[SubtitleCue]) -> Vec<(u64, String)> {
        cues.iter()
            .map(|c| ((c.start_time * 100.0).round() as u64, c.text.clone()))
            .collect()
    }

    #[test]
    fn bracket_scenario_two_cues() {
        let cues = parse(
            "[00:01.00] Hello\n[00:05.00] World",
            SubtitleFormat::Bracket,
            DurationPolicy::default(),
        );
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello");
        assert_eq!(cues[0].start_time, 1.0);
        assert_eq!(cues[0].end_time, 5.0);
        assert_eq!(cues[1].text, "World");
        assert_eq!(cues[1].start_time, 5.0);
        assert_eq!(cues[1].end_time, 15.0);
    }

    #[test]
    fn bracket_sorts_out_of_order_input() {
        let cues = parse_bracket(
            "[01:10.50] third\n[00:02.00] first\n[00:30.25] second",
            DurationPolicy::default(),
        );
        let texts: Vec<_> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
        assert!(cues.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        assert_eq!(cues[0].end_time, cues[1].start_time);
    }

    #[test]
    fn bracket_drops_malformed_lines_and_keeps_going() {
        let cues = parse_bracket(
            "garbage\n[00:01.00] ok\n[0:02.00] short minutes\n[00:75.00] bad seconds\n[00:03.00]\n[00:04.00] also ok",
            DurationPolicy::default(),
        );
        let texts: Vec<_> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["ok", "also ok"]);
    }

    #[test]
    fn srt_parses_multiline_blocks() {
        let srt = "1\r\n00:00:14,676 --> 00:00:19,347\r\nfirst line\r\nsecond line\r\n\r\n2\r\n00:00:20,000 --> 00:00:22,5\r\nnext\r\n";
        let cues = parse_srt(srt);
        assert_eq!(cues.len(), 2);
        assert!((cues[0].start_time - 14.676).abs() < 1e-9);
        assert_eq!(cues[0].text, "first line\nsecond line");
        assert!((cues[1].end_time - 22.005).abs() < 1e-9);
    }

    #[test]
    fn srt_fraction_is_a_millisecond_count() {
        let near = |s: &str, want: f64| (parse_srt_time(s).unwrap() - want).abs() < 1e-9;
        assert!(near("00:00:01,5", 1.005));
        assert!(near("00:00:01,50", 1.05));
        assert!(near("00:00:01,500", 1.5));
        assert!(near("00:01:00.250", 60.25));
        assert_eq!(parse_srt_time("00:00:01,5000"), None);
        assert_eq!(parse_srt_time("00:00:01,"), None);
    }

    #[test]
    fn srt_drops_inverted_cue() {
        let srt = "1\n00:00:05,000 --> 00:00:04,000\nbackwards\n\n2\n00:00:06,000 --> 00:00:07,000\nfine\n";
        let cues = parse_srt(srt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "fine");
    }

    #[test]
    fn bracket_srt_bracket_round_trip() {
        let original = "[00:00.00] intro\n[00:01.07] one\n[00:59.99] two\n[03:05.10] three\n[12:00.01] four\n";
        let first = parse_bracket(original, DurationPolicy::default());
        let srt = to_srt(&first);
        let back = parse_srt(&srt);
        let bracket = to_bracket(&back);
        let again = parse_bracket(&bracket, DurationPolicy::default());
        assert_eq!(pairs(&first), pairs(&again));
        assert_eq!(bracket, original);
    }

    #[test]
    fn lrc_skips_tags_and_expands_repeats() {
        let lrc = "[ti:Song]\n[ar:Someone]\n[00:12.00][00:40.5]Chorus\n[00:05.123]Verse\n[00:20]Bridge\n";
        let bracket = lrc_to_bracket(lrc);
        assert_eq!(
            bracket,
            "[00:05.12] Verse\n[00:12.00] Chorus\n[00:20.00] Bridge\n[00:40.50] Chorus\n"
        );
        let cues = parse(lrc, SubtitleFormat::Lrc, DurationPolicy::default());
        assert_eq!(cues.len(), 4);
        assert_eq!(cues[1].end_time, 20.0);
    }

    #[test]
    fn detects_formats() {
        assert_eq!(detect_format("1\n00:00:01,000 --> 00:00:02,000\nhi\n"), SubtitleFormat::Srt);
        assert_eq!(detect_format("[ar:Band]\n[00:01.00]hi"), SubtitleFormat::Lrc);
        assert_eq!(detect_format("[00:01.00]hi"), SubtitleFormat::Lrc);
        assert_eq!(detect_format("[00:01:50] hi"), SubtitleFormat::Lrc);
        assert_eq!(detect_format("[00:01.00] hi\n[00:02.00] there"), SubtitleFormat::Bracket);
        assert_eq!(detect_format("plain text"), SubtitleFormat::Bracket);
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_bracket_time(65.07), "01:05.07");
        assert_eq!(format_srt_time(3725.5), "01:02:05,500");
    }
}
