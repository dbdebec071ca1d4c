//! Canonical blob key scheme
//!
//! Every stage output lives at a deterministic key derived from the source
//! recording's base name. Keys are `/`-delimited, case-sensitive strings;
//! nothing here touches the filesystem.

/// Base name of a key: directories and the final extension stripped.
///
/// `videos/meeting_2024.mp4` → `meeting_2024`.
pub fn base_name(key: &str) -> &str {
    let file = key.rsplit('/').next().unwrap_or(key);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

/// Normalized mono 16 kHz WAV produced by the extractor.
pub fn normalized_wav(base: &str) -> String {
    format!("processed/{base}.wav")
}

/// Audio for one chunk window.
pub fn chunk_wav(base: &str, chunk_index: u32) -> String {
    format!("chunks/{base}_chunk_{chunk_index:02}.wav")
}

/// Detailed per-chunk diarization result.
pub fn chunk_diarization(base: &str, chunk_index: u32) -> String {
    format!("diarization/{base}_chunk_{chunk_index:02}.json")
}

/// Diarization detail key derived from a chunk audio key, so the diarizer
/// needs nothing beyond its own input message.
pub fn chunk_diarization_for(chunk_key: &str, chunk_index: u32) -> String {
    chunk_diarization(base_chunk_name(chunk_key, chunk_index), chunk_index)
}

fn base_chunk_name(chunk_key: &str, chunk_index: u32) -> &str {
    let stem = base_name(chunk_key);
    let suffix = format!("_chunk_{chunk_index:02}");
    stem.strip_suffix(suffix.as_str()).unwrap_or(stem)
}

/// Merged global segment timeline.
pub fn merged_segments(base: &str) -> String {
    format!("{base}_segments.json")
}

/// One sliced clip per final segment.
pub fn segment_clip(base: &str, segment_index: usize, speaker: &str) -> String {
    format!("segments/{base}_{segment_index:04}_{speaker}.wav")
}

/// Per-segment transcription result, derived from the clip key.
pub fn transcribe_result(segment_key: &str) -> String {
    format!("transcribe_results/{}.json", base_name(segment_key))
}

/// Manifest listing every segment clip.
pub fn segment_manifest(base: &str) -> String {
    format!("metadata/{base}_segment_files.json")
}

/// Spill location for a chunk-results list that exceeds the payload cap.
pub fn chunk_results_manifest(base: &str) -> String {
    format!("metadata/{base}_chunk_results.json")
}

/// Final time-ordered transcript.
pub fn final_transcript(base: &str) -> String {
    format!("transcripts/{base}_transcript.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directories_and_extension() {
        assert_eq!(base_name("videos/meeting_2024.mp4"), "meeting_2024");
        assert_eq!(base_name("processed/a/b/rec.wav"), "rec");
        assert_eq!(base_name("plain"), "plain");
        assert_eq!(base_name("dir/noext"), "noext");
        assert_eq!(base_name(".hidden"), ".hidden");
    }

    #[test]
    fn stage_keys_follow_the_scheme() {
        assert_eq!(normalized_wav("rec"), "processed/rec.wav");
        assert_eq!(chunk_wav("rec", 3), "chunks/rec_chunk_03.wav");
        assert_eq!(chunk_diarization("rec", 3), "diarization/rec_chunk_03.json");
        assert_eq!(merged_segments("rec"), "rec_segments.json");
        assert_eq!(
            segment_clip("rec", 7, "SPEAKER_B"),
            "segments/rec_0007_SPEAKER_B.wav"
        );
        assert_eq!(segment_manifest("rec"), "metadata/rec_segment_files.json");
        assert_eq!(final_transcript("rec"), "transcripts/rec_transcript.json");
    }

    #[test]
    fn diarization_key_derives_from_chunk_key() {
        assert_eq!(
            chunk_diarization_for("chunks/rec_chunk_02.wav", 2),
            "diarization/rec_chunk_02.json"
        );
    }

    #[test]
    fn transcribe_result_key_derives_from_clip_basename() {
        assert_eq!(
            transcribe_result("segments/rec_0000_SPEAKER_A.wav"),
            "transcribe_results/rec_0000_SPEAKER_A.json"
        );
    }
}
