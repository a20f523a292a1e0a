//! Transcoder Command Builder (C10): assembles the external transcoder's
//! argument vector from an ordered, fully-resolved item list. Pure function;
//! GPU availability is supplied by the caller (see [`crate::gpu`]).

use vidcompile_core::item::ProcessedItem;
use vidcompile_core::model::ItemType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscoderOptions {
    pub enable_4k: bool,
    pub gpu_available: bool,
}

fn target_resolution(enable_4k: bool) -> (u32, u32) {
    if enable_4k {
        (3840, 2160)
    } else {
        (1920, 1080)
    }
}

/// Builds the full `ffmpeg` argument vector (program name excluded — the
/// caller constructs `Command::new("ffmpeg")` and extends with this vector).
pub fn build_transcoder_command(items: &[ProcessedItem], output_path: &str, opts: TranscoderOptions) -> Vec<String> {
    let (target_w, target_h) = target_resolution(opts.enable_4k);
    let mut args: Vec<String> = Vec::new();

    let mut input_index = 0usize;
    let mut item_input_index = Vec::with_capacity(items.len());

    for item in items {
        if item.item_type == ItemType::Image {
            args.push("-loop".to_string());
            args.push("1".to_string());
            args.push("-t".to_string());
            args.push(format!("{}", item.duration_s));
            args.push("-i".to_string());
            args.push(item.local_path.clone());
        } else {
            args.push("-i".to_string());
            args.push(item.local_path.clone());
        }
        item_input_index.push(input_index);
        input_index += 1;
    }

    let mut filter_complex: Vec<String> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let in_idx = item_input_index[i];

        let mut video_stream = if item.item_type == ItemType::Image {
            filter_complex.push(format!(
                "[{in_idx}:v]scale={target_w}:{target_h}:force_original_aspect_ratio=decrease,pad={target_w}:{target_h}:(ow-iw)/2:(oh-ih)/2:black,fps=30[v{i}_scaled]"
            ));
            filter_complex.push(format!(
                "anullsrc=channel_layout=stereo:sample_rate=44100,atrim=duration={}[a{i}]",
                item.duration_s
            ));
            format!("[v{i}_scaled]")
        } else {
            filter_complex.push(format!(
                "[{in_idx}:v]scale={target_w}:{target_h}:force_original_aspect_ratio=decrease,pad={target_w}:{target_h}:(ow-iw)/2:(oh-ih)/2:black[v{i}_scaled]"
            ));
            format!("[v{i}_scaled]")
        };

        if item.item_type == ItemType::Video {
            if let Some(logo_path) = &item.logo_local_path {
                args.push("-i".to_string());
                args.push(logo_path.clone());
                let logo_idx = input_index;
                input_index += 1;
                filter_complex.push(format!("{video_stream}[{logo_idx}:v]overlay=W-w-10:10[v{i}_logo]"));
                video_stream = format!("[v{i}_logo]");
            }

            if let Some(subtitle_path) = &item.subtitle_path {
                filter_complex.push(format!(
                    "{video_stream}subtitles={subtitle_path}:force_style='Alignment=9,MarginR=40,MarginV=40'[v{i}_text]"
                ));
                video_stream = format!("[v{i}_text]");
            }
        }

        filter_complex.push(format!("{video_stream}null[v{i}]"));

        if item.item_type != ItemType::Image {
            filter_complex.push(format!("[{in_idx}:a]anull[a{i}]"));
        }
    }

    let concat_inputs: String = (0..items.len()).map(|i| format!("[v{i}][a{i}]")).collect();
    filter_complex.push(format!("{concat_inputs}concat=n={}:v=1:a=1[outv][outa]", items.len()));

    args.push("-filter_complex".to_string());
    args.push(filter_complex.join(";"));
    args.push("-map".to_string());
    args.push("[outv]".to_string());
    args.push("-map".to_string());
    args.push("[outa]".to_string());

    append_encoder_args(&mut args, opts);

    args.push("-movflags".to_string());
    args.push("+faststart".to_string());
    args.push("-y".to_string());
    args.push(output_path.to_string());

    args
}

fn append_encoder_args(args: &mut Vec<String>, opts: TranscoderOptions) {
    let video_args: &[&str] = match (opts.enable_4k, opts.gpu_available) {
        (true, true) => &[
            "-c:v", "h264_nvenc", "-preset", "p5", "-tune", "hq", "-rc", "vbr",
            "-b:v", "40M", "-maxrate", "50M", "-bufsize", "60M",
            "-profile:v", "high", "-level", "5.1", "-pix_fmt", "yuv420p",
            "-spatial-aq", "1", "-temporal-aq", "1",
        ],
        (true, false) => &[
            "-c:v", "libx264", "-preset", "medium", "-crf", "18",
            "-profile:v", "high", "-level", "5.1", "-pix_fmt", "yuv420p",
        ],
        (false, true) => &[
            "-c:v", "h264_nvenc", "-preset", "p5", "-tune", "hq", "-rc", "vbr",
            "-b:v", "16M", "-maxrate", "20M", "-bufsize", "24M",
            "-profile:v", "main", "-level", "4.1", "-pix_fmt", "yuv420p",
            "-spatial-aq", "1", "-temporal-aq", "1",
        ],
        (false, false) => &[
            "-c:v", "libx264", "-preset", "medium", "-crf", "20",
            "-profile:v", "main", "-level", "4.1", "-pix_fmt", "yuv420p",
        ],
    };
    args.extend(video_args.iter().map(|s| s.to_string()));
    args.extend(
        ["-c:a", "aac", "-b:a", "320k", "-ar", "48000", "-ac", "2"]
            .iter()
            .map(|s| s.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_items() -> Vec<ProcessedItem> {
        let mut video = ProcessedItem::new(ItemType::Video, 2, "/tmp/video_2.mp4", 10.0);
        video.logo_local_path = Some("/tmp/logo_2.png".to_string());
        video.subtitle_path = Some("/tmp/text_2.ass".to_string());
        vec![
            ProcessedItem::new(ItemType::Intro, 1, "/tmp/intro_1.mp4", 5.0),
            video,
            ProcessedItem::new(ItemType::Image, 3, "/tmp/image_3.png", 4.0),
        ]
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn resolution_target_matches_4k_flag() {
        let items = sample_items();
        let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        let joined = args.join(" ");
        assert!(joined.contains("scale=1920:1080"));

        let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: true, gpu_available: false });
        let joined = args.join(" ");
        assert!(joined.contains("scale=3840:2160"));
    }

    #[test]
    fn logo_overlay_present_only_for_flagged_video_item() {
        let items = sample_items();
        let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        let joined = args.join(" ");
        assert!(joined.contains("overlay=W-w-10:10"));
        assert!(joined.contains("/tmp/logo_2.png"));
    }

    #[test]
    fn subtitle_burn_in_present_for_text_item() {
        let items = sample_items();
        let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        let joined = args.join(" ");
        assert!(joined.contains("subtitles=/tmp/text_2.ass"));
        assert!(joined.contains("Alignment=9"));
    }

    #[test]
    fn image_item_loops_with_silent_audio() {
        let items = sample_items();
        let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        assert!(has_flag_with_value(&args, "-loop", "1"));
        let joined = args.join(" ");
        assert!(joined.contains("anullsrc=channel_layout=stereo:sample_rate=44100"));
    }

    #[test]
    fn gpu_and_cpu_encoders_use_distinct_codecs() {
        let items = sample_items();
        let gpu = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: true });
        let cpu = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        assert!(has_flag_with_value(&gpu, "-c:v", "h264_nvenc"));
        assert!(has_flag_with_value(&cpu, "-c:v", "libx264"));
    }

    #[test]
    fn bitrate_targets_match_resolution() {
        let items = sample_items();
        let hd = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: false, gpu_available: true });
        assert!(has_flag_with_value(&hd, "-b:v", "16M"));
        let uhd = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k: true, gpu_available: true });
        assert!(has_flag_with_value(&uhd, "-b:v", "40M"));
    }

    #[test]
    fn faststart_and_output_path_present() {
        let items = sample_items();
        let args = build_transcoder_command(&items, "/tmp/final.mp4", TranscoderOptions { enable_4k: false, gpu_available: false });
        assert!(has_flag_with_value(&args, "-movflags", "+faststart"));
        assert_eq!(args.last().unwrap(), "/tmp/final.mp4");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_every_item_produces_an_input_flag(
            n in 1usize..8,
            enable_4k in proptest::bool::ANY,
            gpu_available in proptest::bool::ANY,
        ) {
            let items: Vec<ProcessedItem> = (1..=n as u32)
                .map(|pos| ProcessedItem::new(ItemType::Video, pos, format!("/tmp/v_{pos}.mp4"), 3.0))
                .collect();
            let args = build_transcoder_command(&items, "/tmp/out.mp4", TranscoderOptions { enable_4k, gpu_available });
            let input_count = args.iter().filter(|a| a.as_str() == "-i").count();
            prop_assert_eq!(input_count, n);
        }
    }
}
