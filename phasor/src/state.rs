//! Per-iteration control state.
//!
//! [`IterationState`] owns the iteration counter, the algorithm switch list
//! and one [`TriggerSchedule`] per periodic behavior. Each call to
//! [`IterationState::advance`] moves to the next iteration and recomputes
//! the [`IterationFacts`] the reconstruction acts on.

use crate::algorithm::AlgorithmId;
use crate::params::{AlgorithmSwitch, Params};
use crate::schedule::TriggerSchedule;

/// What happens during the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationFacts {
    pub iteration: usize,
    pub algorithm: AlgorithmId,
    pub update_support: bool,
    pub update_phase: bool,
    pub update_coherence: bool,
    pub low_resolution: bool,
    pub release_scratch: bool,
    pub averaging: bool,
    pub twin: bool,
}

#[derive(Debug, Clone)]
pub struct IterationState {
    total: usize,
    current: Option<usize>,
    switches: Vec<AlgorithmSwitch>,
    switch_index: usize,
    support: TriggerSchedule,
    phase: TriggerSchedule,
    coherence: TriggerSchedule,
    resolution: TriggerSchedule,
    release: TriggerSchedule,
    avg_iterations: usize,
    twin: Option<usize>,
    facts: Option<IterationFacts>,
}

impl IterationState {
    pub fn new(params: &Params) -> Self {
        let schedule = |triggers: Option<&Vec<usize>>| {
            triggers.map_or_else(TriggerSchedule::empty, |t| TriggerSchedule::new(t.iter().copied()))
        };

        Self {
            total: params.iteration_count(),
            current: None,
            switches: params.switches.clone(),
            switch_index: 0,
            support: schedule(Some(&params.support.triggers)),
            phase: schedule(params.phase.as_ref().map(|p| &p.triggers)),
            coherence: schedule(params.pcdi.as_ref().map(|p| &p.triggers)),
            resolution: schedule(params.resolution.as_ref().map(|r| &r.triggers)),
            release: schedule(Some(&params.gc_triggers)),
            avg_iterations: params.avg_iterations,
            twin: params.twin,
            facts: None,
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Index of the current iteration, `None` before the first advance.
    #[inline]
    pub fn iteration(&self) -> Option<usize> {
        self.current
    }

    /// Facts of the current iteration, `None` before the first advance and
    /// after the run ended.
    #[inline]
    pub fn facts(&self) -> Option<&IterationFacts> {
        self.facts.as_ref()
    }

    /// Moves to the next iteration. Returns `false` once all iterations ran.
    pub fn advance(&mut self) -> bool {
        let iteration = self.current.map_or(0, |i| i + 1);
        if iteration >= self.total {
            self.current = Some(self.total);
            self.facts = None;
            return false;
        }
        self.current = Some(iteration);

        while self.switch_index + 1 < self.switches.len()
            && self.switches[self.switch_index].end <= iteration
        {
            self.switch_index += 1;
        }

        self.facts = Some(IterationFacts {
            iteration,
            algorithm: self.switches[self.switch_index].algorithm,
            update_support: self.support.fires_at(iteration),
            update_phase: self.phase.fires_at(iteration),
            update_coherence: self.coherence.fires_at(iteration),
            low_resolution: self.resolution.fires_at(iteration),
            release_scratch: self.release.fires_at(iteration),
            averaging: iteration + self.avg_iterations >= self.total,
            twin: self.twin == Some(iteration),
        });
        true
    }

    /// Whether any coherence trigger fired so far.
    pub fn coherence_started(&self) -> bool {
        self.coherence.cursor() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn er_hio_params() -> Params {
        Params::new(
            [8, 8, 8],
            vec![
                AlgorithmSwitch::new(AlgorithmId::Er, 5),
                AlgorithmSwitch::new(AlgorithmId::Hio, 10),
            ],
        )
    }

    fn run_to_end(state: &mut IterationState) -> Vec<IterationFacts> {
        let mut facts = Vec::new();
        while state.advance() {
            facts.push(*state.facts().unwrap());
        }
        facts
    }

    #[test]
    fn test_algorithm_switch_coverage() {
        let mut state = IterationState::new(&er_hio_params());
        let facts = run_to_end(&mut state);

        assert_eq!(facts.len(), 10);
        for f in &facts {
            let expected = if f.iteration < 5 {
                AlgorithmId::Er
            } else {
                AlgorithmId::Hio
            };
            assert_eq!(f.algorithm, expected, "iteration {}", f.iteration);
        }
    }

    #[test]
    fn test_terminal_advance_is_sticky() {
        let mut state = IterationState::new(&er_hio_params());
        assert!(state.iteration().is_none());
        run_to_end(&mut state);
        assert!(!state.advance());
        assert!(!state.advance());
        assert!(state.facts().is_none());
        assert_eq!(state.iteration(), Some(10));
    }

    #[test]
    fn test_triggers_fire_on_schedule() {
        let mut params = er_hio_params();
        params.support.triggers = vec![0, 5];
        params.gc_triggers = vec![9];
        params.twin = Some(3);
        params.avg_iterations = 2;
        let mut state = IterationState::new(&params);
        let facts = run_to_end(&mut state);

        let support: Vec<usize> = facts.iter().filter(|f| f.update_support).map(|f| f.iteration).collect();
        assert_eq!(support, vec![0, 5]);

        let twin: Vec<usize> = facts.iter().filter(|f| f.twin).map(|f| f.iteration).collect();
        assert_eq!(twin, vec![3]);

        let averaging: Vec<usize> = facts.iter().filter(|f| f.averaging).map(|f| f.iteration).collect();
        assert_eq!(averaging, vec![8, 9]);

        let release: Vec<usize> = facts.iter().filter(|f| f.release_scratch).map(|f| f.iteration).collect();
        assert_eq!(release, vec![9]);

        assert!(facts.iter().all(|f| !f.update_phase && !f.update_coherence && !f.low_resolution));
    }

    #[test]
    fn test_coherence_started_after_first_trigger() {
        let mut params = er_hio_params();
        params.pcdi = Some(crate::params::PcdiParams {
            algorithm: crate::config::PcdiAlgorithm::Lucy,
            roi: [4, 4, 4],
            normalize: true,
            iterations: 5,
            clip: false,
            triggers: vec![2, 6],
        });
        let mut state = IterationState::new(&params);

        state.advance();
        state.advance();
        assert!(!state.coherence_started());
        state.advance();
        assert!(state.facts().unwrap().update_coherence);
        assert!(state.coherence_started());
    }

    #[test]
    fn test_single_switch_runs_all_iterations() {
        let params = Params::new([4, 4, 4], vec![AlgorithmSwitch::new(AlgorithmId::HioNorm, 3)]);
        let mut state = IterationState::new(&params);
        let facts = run_to_end(&mut state);
        assert_eq!(facts.len(), 3);
        assert!(facts.iter().all(|f| f.algorithm == AlgorithmId::HioNorm));
    }
}
