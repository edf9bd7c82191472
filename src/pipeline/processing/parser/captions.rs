//! WebVTT cue reading and caption collapsing.

use once_cell::sync::Lazy;
use regex::Regex;

static CUE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+>").expect("static regex"));

/// Cue texts in file order. Header, NOTE, STYLE and REGION blocks are skipped
/// and cue tags are stripped. A multi-line cue is joined with single spaces.
///
/// A line that is blank after trimming ends a block, and a timing line always
/// starts a new cue, even without a blank line before it.
pub fn parse_captions(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut captions = Vec::new();
    // None outside a cue, Some(lines) while collecting cue text
    let mut cue: Option<Vec<String>> = None;
    let mut skipping = false;

    for line in normalized.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_cue(&mut cue, &mut captions);
            skipping = false;
            continue;
        }
        if trimmed.contains("-->") {
            flush_cue(&mut cue, &mut captions);
            if !skipping {
                cue = Some(Vec::new());
            }
            continue;
        }
        match cue.as_mut() {
            Some(lines) => lines.push(CUE_TAG.replace_all(trimmed, "").into_owned()),
            None => {
                if trimmed.starts_with("NOTE") || trimmed.starts_with("STYLE") || trimmed.starts_with("REGION") {
                    skipping = true;
                }
            }
        }
    }
    flush_cue(&mut cue, &mut captions);
    captions
}

fn flush_cue(cue: &mut Option<Vec<String>>, captions: &mut Vec<String>) {
    if let Some(lines) = cue.take() {
        captions.push(collapse_whitespace(&lines.join(" ")));
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep a caption only when it differs from the last kept one, then join with spaces.
pub fn collapse_captions<S: AsRef<str>>(captions: &[S]) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for caption in captions {
        let caption = caption.as_ref();
        if kept.last().copied().unwrap_or("") != caption {
            kept.push(caption);
        }
    }
    kept.join(" ").trim().to_string()
}

/// Raw caption markup straight to transcript text.
pub fn caption_text_to_transcript(caption_text: &str) -> String {
    collapse_captions(&parse_captions(caption_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VTT: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n\
        NOTE generated by the site\n\n\
        00:00:00.000 --> 00:00:02.000 align:start position:0%\nhello\n\n\
        00:00:02.000 --> 00:00:04.000\nhello\n\n\
        1\n00:00:04.000 --> 00:00:06.000\n<c>world</c>\n\n\
        00:00:06.000 --> 00:00:08.000\nworld\n\n\
        00:00:08.000 --> 00:00:10.000\nhello\n";

    #[test]
    fn test_parse_captions_in_order() {
        assert_eq!(parse_captions(VTT), vec!["hello", "hello", "world", "world", "hello"]);
    }

    #[test]
    fn test_collapse_repeated_captions() {
        let captions = ["hello", "hello", "world", "world", "hello"];
        assert_eq!(collapse_captions(&captions), "hello world hello");
    }

    #[test]
    fn test_caption_text_to_transcript() {
        assert_eq!(caption_text_to_transcript(VTT), "hello world hello");
    }

    #[test]
    fn test_multiline_cue_and_crlf() {
        let vtt = "WEBVTT\r\n\r\n00:00:00.000 --> 00:00:02.000\r\nfirst line\r\nsecond line\r\n";
        assert_eq!(parse_captions(vtt), vec!["first line second line"]);
    }

    #[test]
    fn test_whitespace_only_separator_splits_cues() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nhello\n \n00:00:02.000 --> 00:00:04.000\nworld\n";
        assert_eq!(parse_captions(vtt), vec!["hello", "world"]);
        assert_eq!(caption_text_to_transcript(vtt), "hello world");
    }

    #[test]
    fn test_timing_line_without_blank_line_starts_new_cue() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nhello\n00:00:02.000 --> 00:00:04.000\nworld\n";
        assert_eq!(parse_captions(vtt), vec!["hello", "world"]);
    }

    #[test]
    fn test_inner_whitespace_is_collapsed() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\n  go ye\t into\nall   the world \n";
        assert_eq!(parse_captions(vtt), vec!["go ye into all the world"]);
    }

    #[test]
    fn test_empty_caption_file() {
        assert!(parse_captions("WEBVTT\n\n").is_empty());
        assert_eq!(caption_text_to_transcript("WEBVTT\n\n"), "");
    }
}
