use crate::passage::Passage;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum CharStatus {
    Correct,
    Incorrect,
    Pending,
}

/// Classification of every passage position against the current input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffResult {
    pub statuses: Vec<CharStatus>,
    /// Mismatches plus untyped positions.
    pub error_count: usize,
}

impl DiffResult {
    pub fn correct_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == CharStatus::Correct)
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == CharStatus::Pending)
            .count()
    }
}

/// Compare `input` with `passage` position by position. Untyped positions
/// count as errors; input past the end of the passage is ignored.
pub fn diff(passage: &Passage, input: &[char]) -> DiffResult {
    let mut error_count = 0;
    let statuses = passage
        .chars()
        .iter()
        .enumerate()
        .map(|(idx, expected)| {
            let status = match input.get(idx) {
                Some(typed) if typed == expected => CharStatus::Correct,
                Some(_) => CharStatus::Incorrect,
                None => CharStatus::Pending,
            };
            if status != CharStatus::Correct {
                error_count += 1;
            }
            status
        })
        .collect();

    DiffResult {
        statuses,
        error_count,
    }
}
