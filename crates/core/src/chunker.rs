use crate::types::{Chunk, Segment, TimedLine};

/// Duration assigned to a line whose length cannot be derived from its successor.
pub const FALLBACK_SEGMENT_DURATION: f64 = 2.0;

/// Turn start-only lines into full segments.
///
/// Each line lasts until the next one starts. The last line, and any line whose successor
/// starts at or before it, gets [`FALLBACK_SEGMENT_DURATION`].
pub fn backfill_durations(lines: &[TimedLine]) -> Vec<Segment> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let duration = match lines.get(idx + 1) {
                Some(next) if next.start - line.start > 0.0 => next.start - line.start,
                _ => FALLBACK_SEGMENT_DURATION,
            };
            Segment::new(line.text.clone(), line.start, duration)
        })
        .collect()
}

struct ChunkAccumulator {
    chunks: Vec<Chunk>,
    texts: Vec<String>,
    start: Option<f64>,
    duration: f64,
}

impl ChunkAccumulator {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            texts: Vec::new(),
            start: None,
            duration: 0.0,
        }
    }

    fn attach(&mut self, segment: &Segment) {
        if self.start.is_none() {
            self.start = Some(segment.start);
        }
        self.texts.push(segment.text.clone());
        self.duration += segment.duration;
    }

    fn finish_chunk(&mut self) {
        let Some(start_time) = self.start.take() else {
            return;
        };
        self.chunks.push(Chunk {
            text: self.texts.join(" "),
            start_time,
        });
        self.texts.clear();
        self.duration = 0.0;
    }

    fn into_chunks(mut self) -> Vec<Chunk> {
        // trailing fragment is kept even when short
        self.finish_chunk();
        self.chunks
    }
}

/// Merge consecutive segments until their summed duration reaches `min_chunk_time`.
///
/// Chunks come out in source order and each starts where its first segment starts.
pub fn chunk_segments(segments: &[Segment], min_chunk_time: f64) -> Vec<Chunk> {
    let mut acc = ChunkAccumulator::new();
    for segment in segments {
        acc.attach(segment);
        if acc.duration >= min_chunk_time {
            acc.finish_chunk();
        }
    }
    acc.into_chunks()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64, duration: f64) -> Segment {
        Segment::new(text, start, duration)
    }

    fn line(text: &str, start: f64) -> TimedLine {
        TimedLine {
            text: text.to_string(),
            start,
        }
    }

    #[test]
    fn merges_until_threshold_and_keeps_tail() {
        let segments = vec![seg("a", 0.0, 10.0), seg("b", 10.0, 10.0), seg("c", 20.0, 30.0)];

        let chunks = chunk_segments(&segments, 20.0);

        assert_eq!(
            chunks,
            vec![
                Chunk {
                    text: "a b".to_string(),
                    start_time: 0.0
                },
                Chunk {
                    text: "c".to_string(),
                    start_time: 20.0
                },
            ]
        );
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_segments(&[], 45.0).is_empty());
    }

    #[test]
    fn short_trailing_fragment_is_emitted() {
        let segments = vec![seg("one", 0.0, 30.0), seg("two", 30.0, 30.0), seg("three", 60.0, 5.0)];

        let chunks = chunk_segments(&segments, 45.0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two");
        assert_eq!(chunks[1].text, "three");
        assert_eq!(chunks[1].start_time, 60.0);
    }

    #[test]
    fn non_positive_threshold_passes_segments_through() {
        let segments = vec![seg("x", 0.0, 1.0), seg("y", 1.0, 0.0), seg("z", 1.0, 3.0)];

        let chunks = chunk_segments(&segments, 0.0);

        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "y", "z"]);
    }

    #[test]
    fn no_text_is_lost_or_duplicated() {
        let segments: Vec<Segment> = (0..37)
            .map(|i| seg(&format!("w{i}"), i as f64 * 1.7, 1.7 + (i % 5) as f64))
            .collect();

        let chunks = chunk_segments(&segments, 12.5);

        let joined_chunks = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let joined_segments = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(joined_chunks, joined_segments);
    }

    #[test]
    fn non_final_chunks_reach_threshold() {
        let segments: Vec<Segment> = (0..50)
            .map(|i| seg(&format!("s{i}"), i as f64 * 3.0, 0.5 + (i % 7) as f64))
            .collect();
        let threshold = 9.0;

        let chunks = chunk_segments(&segments, threshold);

        // replay the sums per chunk by counting words
        let mut cursor = 0;
        for (idx, chunk) in chunks.iter().enumerate() {
            let words = chunk.text.split(' ').count();
            let total: f64 = segments[cursor..cursor + words]
                .iter()
                .map(|s| s.duration)
                .sum();
            if idx + 1 < chunks.len() {
                assert!(total >= threshold, "chunk {idx} only lasted {total}");
            }
            cursor += words;
        }
        assert_eq!(cursor, segments.len());
    }

    #[test]
    fn chunk_starts_never_go_backwards() {
        let segments: Vec<Segment> = (0..20)
            .map(|i| seg("t", i as f64 * 2.0, 2.0))
            .collect();

        let chunks = chunk_segments(&segments, 5.0);

        assert!(chunks.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    }

    #[test]
    fn backfill_uses_next_start_and_fallback_for_last() {
        let segments = backfill_durations(&[line("a", 0.0), line("b", 4.5), line("c", 10.0)]);

        let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![4.5, 5.5, FALLBACK_SEGMENT_DURATION]);
    }

    #[test]
    fn backfill_clamps_duplicate_and_backwards_timestamps() {
        let segments = backfill_durations(&[line("a", 5.0), line("b", 5.0), line("c", 3.0)]);

        assert_eq!(segments[0].duration, FALLBACK_SEGMENT_DURATION);
        assert_eq!(segments[1].duration, FALLBACK_SEGMENT_DURATION);
        assert_eq!(segments[2].duration, FALLBACK_SEGMENT_DURATION);
    }
}
