// Tesseract TSV output parsing

use super::{OcrFragment, script::{self, Script}};

/// TSV row level for individual words
const WORD_LEVEL: u32 = 5;
const TSV_COLUMNS: usize = 12;

/// Group tesseract TSV word rows into line-level fragments.
///
/// Lines are emitted in the order their first word appears. Confidence is
/// the mean word confidence scaled to `0.0..=1.0`, and each line is tagged
/// with the dominant script among `scripts`.
pub fn parse_fragments(tsv: &str, scripts: &[Script]) -> Vec<OcrFragment> {
    let mut lines: Vec<((u32, u32, u32, u32), Vec<(String, f32)>)> = Vec::new();

    // First row is the header
    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < TSV_COLUMNS {
            continue;
        }
        let level: u32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match lines.iter_mut().find(|(k, _)| *k == key) {
            Some((_, words)) => words.push((text.to_string(), conf)),
            None => lines.push((key, vec![(text.to_string(), conf)])),
        }
    }

    lines
        .into_iter()
        .map(|(_, words)| {
            let text = words
                .iter()
                .map(|(w, _)| w.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let confidence =
                words.iter().map(|(_, c)| c).sum::<f32>() / words.len() as f32 / 100.0;
            let tag = script::dominant_script(&text, scripts)
                .map(Script::tag)
                .unwrap_or(crate::consts::UNKNOWN_LANGUAGE);
            OcrFragment::new(text, confidence.clamp(0.0, 1.0), tag)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, line: u32, word: u32, conf: f32, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t".to_string(),
            word(1, 1, 1, 90.0, "Breaking"),
            word(1, 1, 2, 80.0, "news"),
            word(1, 2, 1, 70.0, "తెలంగాణ"),
        ]
        .join("\n");

        let fragments = parse_fragments(&tsv, &[Script::Telugu, Script::Latin]);

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "Breaking news");
        assert_eq!(fragments[0].script, "en");
        assert!((fragments[0].confidence - 0.85).abs() < 1e-4);
        assert_eq!(fragments[1].text, "తెలంగాణ");
        assert_eq!(fragments[1].script, "te");
    }

    #[test]
    fn skips_empty_and_unscored_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, -1.0, "ghost"),
            word(1, 1, 2, 95.0, " "),
        ]
        .join("\n");

        assert!(parse_fragments(&tsv, &[Script::Latin]).is_empty());
    }

    #[test]
    fn header_only_output_has_no_fragments() {
        assert!(parse_fragments(HEADER, &[Script::Latin]).is_empty());
        assert!(parse_fragments("", &[Script::Latin]).is_empty());
    }

    #[test]
    fn keeps_detection_order_across_blocks() {
        let tsv = [
            HEADER.to_string(),
            word(2, 1, 1, 90.0, "second"),
            word(1, 1, 1, 90.0, "first"),
            word(2, 1, 2, 90.0, "block"),
        ]
        .join("\n");

        let texts = parse_fragments(&tsv, &[Script::Latin])
            .into_iter()
            .map(|f| f.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["second block", "first"]);
    }
}
