//! Styled-subtitle (SSA/ASS) synthesis for per-item text animation.
//!
//! Pure string generation; the caller is responsible for writing the result
//! to the sidecar `.ass` file consumed by the transcoder's `subtitles` filter.

const HEADER: &str = "[Script Info]\n\
Title: Animated Text\n\
ScriptType: v4.00+\n\
WrapStyle: 0\n\
PlayResX: 1920\n\
PlayResY: 1080\n\
\n\
[V4+ Styles]\n\
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: Default,Impact,50,&H00FFFF,&H000000FF,&H00000000,&H80000000,-1,0,0,0,100,100,0,0,1,4,3,9,40,40,40,1\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n";

/// Timing parameters for the letter-by-letter reveal animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtitleTiming {
    pub letter_delay_s: f64,
    pub cycle_s: f64,
    pub visible_s: f64,
}

impl Default for SubtitleTiming {
    fn default() -> Self {
        Self {
            letter_delay_s: 0.1,
            cycle_s: 20.0,
            visible_s: 10.0,
        }
    }
}

fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let h = (seconds / 3600.0) as u64;
    let m = ((seconds % 3600.0) / 60.0) as u64;
    let s = seconds % 60.0;
    format!("{h}:{m:02}:{s:05.2}")
}

/// Generates the full `.ass` file contents for `text` animated over a video
/// of `video_duration_s`, repeating in cycles until the duration is covered.
pub fn generate_ass(text: &str, video_duration_s: f64, timing: SubtitleTiming) -> String {
    let mut out = String::from(HEADER);
    if text.is_empty() || video_duration_s <= 0.0 {
        return out;
    }

    let chars: Vec<char> = text.chars().collect();
    let num_cycles = (video_duration_s / timing.cycle_s) as u64 + 1;

    for cycle in 0..num_cycles {
        let cycle_start = cycle as f64 * timing.cycle_s;
        if cycle_start >= video_duration_s {
            break;
        }

        for i in 1..=chars.len() {
            let substring: String = chars[..i].iter().collect();
            let start_time = cycle_start + (i - 1) as f64 * timing.letter_delay_s;
            if start_time >= video_duration_s {
                break;
            }

            let end_time = if i == chars.len() {
                cycle_start + timing.visible_s
            } else {
                cycle_start + i as f64 * timing.letter_delay_s
            };
            let end_time = end_time.min(video_duration_s);

            out.push_str(&format!(
                "Dialogue: 0,{},{},Default,,0,0,0,,{{\\fad(150,0)}}{}\\N\n",
                format_time(start_time),
                format_time(end_time),
                substring
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_text_produces_header_only() {
        let ass = generate_ass("", 30.0, SubtitleTiming::default());
        assert!(!ass.contains("Dialogue:"));
        assert!(ass.contains("[Events]"));
    }

    #[test]
    fn short_video_clamps_reveal_events() {
        let ass = generate_ass("HI", 0.05, SubtitleTiming::default());
        // video shorter than even the first letter delay: no event can start.
        assert!(!ass.contains("Dialogue:"));
    }

    #[test]
    fn single_cycle_reveals_every_letter() {
        let ass = generate_ass("AB", 5.0, SubtitleTiming::default());
        let count = ass.matches("Dialogue:").count();
        assert_eq!(count, 2);
    }

    #[test]
    fn long_video_repeats_across_cycles() {
        let timing = SubtitleTiming::default();
        let ass = generate_ass("HI", timing.cycle_s * 2.5, timing);
        // 3 cycles worth (0, 20, 40) of 2 letters each, none clipped away.
        let count = ass.matches("Dialogue:").count();
        assert_eq!(count, 6);
    }

    #[test]
    fn format_time_matches_ass_convention() {
        assert_eq!(format_time(0.0), "0:00:00.00");
        assert_eq!(format_time(3661.5), "1:01:01.50");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_never_emits_event_past_video_duration(
            text in "[A-Za-z]{1,12}",
            duration in 0.5f64..120.0,
        ) {
            let ass = generate_ass(&text, duration, SubtitleTiming::default());
            for line in ass.lines().filter(|l| l.starts_with("Dialogue:")) {
                // time fields: Layer,Start,End,Style,...
                let fields: Vec<&str> = line.trim_start_matches("Dialogue: ").split(',').collect();
                let end_str = fields[2];
                let parts: Vec<&str> = end_str.split(':').collect();
                let h: f64 = parts[0].parse().unwrap();
                let m: f64 = parts[1].parse().unwrap();
                let s: f64 = parts[2].parse().unwrap();
                let end = h * 3600.0 + m * 60.0 + s;
                prop_assert!(end <= duration + 0.01);
            }
        }
    }
}
