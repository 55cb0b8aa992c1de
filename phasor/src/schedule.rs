//! Trigger schedules: sorted iteration sets consumed by a forward-only cursor.

/// Iterations at which one periodic behavior fires.
///
/// The cursor only moves forward, so a schedule is traversed once per run.
/// Once the cursor reaches the end the behavior never fires again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSchedule {
    iterations: Vec<usize>,
    cursor: usize,
}

impl TriggerSchedule {
    /// Builds a schedule from arbitrary indices; duplicates are removed.
    pub fn new(iterations: impl IntoIterator<Item = usize>) -> Self {
        let mut iterations: Vec<usize> = iterations.into_iter().collect();
        iterations.sort_unstable();
        iterations.dedup();
        Self {
            iterations,
            cursor: 0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn iterations(&self) -> &[usize] {
        &self.iterations
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The next iteration this schedule will fire at, if any.
    #[inline]
    pub fn next_trigger(&self) -> Option<usize> {
        self.iterations.get(self.cursor).copied()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.iterations.len()
    }

    /// Returns `true` and consumes the cursor element if it equals `iteration`.
    pub fn fires_at(&mut self, iteration: usize) -> bool {
        match self.next_trigger() {
            Some(next) if next == iteration => {
                self.cursor += 1;
                true
            }
            Some(next) => {
                debug_assert!(
                    next > iteration,
                    "trigger {} skipped, now at iteration {}",
                    next,
                    iteration
                );
                false
            }
            None => false,
        }
    }
}
