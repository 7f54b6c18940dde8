use crate::passage::Passage;
use serde::{Deserialize, Serialize};

/// Characters per word in the WPM convention.
pub const CHARS_PER_WORD: f64 = 5.0;

/// Share of the error percentage taken off the raw WPM.
pub const PENALTY_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub wpm: f64,
    pub error_count: usize,
    pub error_percentage: f64,
    pub elapsed_secs: u32,
    pub typed_chars: usize,
}

/// Converts a finished attempt into a score. The session depends only on
/// this trait, so alternative policies can be swapped in.
pub trait ScoringPolicy: Send + Sync {
    fn score(
        &self,
        passage: &Passage,
        input: &[char],
        elapsed_secs: u32,
        error_count: usize,
    ) -> ScoreResult;
}

/// Words per minute with no error adjustment. Zero elapsed time yields 0.0.
pub fn gross_wpm(chars: usize, elapsed_secs: u32) -> f64 {
    let minutes = elapsed_secs as f64 / 60.0;
    if minutes == 0.0 {
        return 0.0;
    }
    (chars as f64 / CHARS_PER_WORD) / minutes
}

pub fn error_percentage(error_count: usize, passage_len: usize) -> f64 {
    (error_count as f64 / passage_len as f64) * 100.0
}

/// Standard policy: raw WPM reduced by a tenth of the error percentage,
/// floored at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct PenalizedWpm;

impl ScoringPolicy for PenalizedWpm {
    fn score(
        &self,
        passage: &Passage,
        input: &[char],
        elapsed_secs: u32,
        error_count: usize,
    ) -> ScoreResult {
        let raw = gross_wpm(input.len(), elapsed_secs);
        let error_percentage = error_percentage(error_count, passage.len());
        let penalty = (error_percentage * PENALTY_FACTOR) / 100.0;

        ScoreResult {
            wpm: (raw - raw * penalty).max(0.0),
            error_count,
            error_percentage,
            elapsed_secs,
            typed_chars: input.len(),
        }
    }
}

/// Reports raw WPM; errors are counted but not penalised.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawWpm;

impl ScoringPolicy for RawWpm {
    fn score(
        &self,
        passage: &Passage,
        input: &[char],
        elapsed_secs: u32,
        error_count: usize,
    ) -> ScoreResult {
        ScoreResult {
            wpm: gross_wpm(input.len(), elapsed_secs),
            error_count,
            error_percentage: error_percentage(error_count, passage.len()),
            elapsed_secs,
            typed_chars: input.len(),
        }
    }
}
