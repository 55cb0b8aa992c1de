use super::*;

fn config_with_sequence(blocks: Vec<Vec<SequenceItem>>) -> ReconstructionConfig {
    ReconstructionConfig {
        algorithm_sequence: blocks,
        support_area: vec![Extent::Fraction(0.5); 3],
        ..Default::default()
    }
}

fn er_hio_config() -> ReconstructionConfig {
    config_with_sequence(vec![vec![
        SequenceItem::Repeat(1),
        SequenceItem::Step(AlgorithmId::Er, 5),
        SequenceItem::Step(AlgorithmId::Hio, 5),
    ]])
}

// ============================================================================
// Algorithm sequence
// ============================================================================

#[test]
fn test_sequence_expansion_with_repeats() {
    let switches = expand_algorithm_sequence(&[
        vec![
            SequenceItem::Repeat(2),
            SequenceItem::Step(AlgorithmId::Er, 3),
            SequenceItem::Step(AlgorithmId::Hio, 7),
        ],
        vec![SequenceItem::Repeat(1), SequenceItem::Step(AlgorithmId::ErNorm, 4)],
    ])
    .unwrap();

    assert_eq!(
        switches,
        vec![
            AlgorithmSwitch::new(AlgorithmId::Er, 3),
            AlgorithmSwitch::new(AlgorithmId::Hio, 10),
            AlgorithmSwitch::new(AlgorithmId::Er, 13),
            AlgorithmSwitch::new(AlgorithmId::Hio, 20),
            AlgorithmSwitch::new(AlgorithmId::ErNorm, 24),
        ]
    );
}

#[test]
fn test_sequence_errors() {
    assert!(matches!(
        expand_algorithm_sequence(&[]),
        Err(ConfigError::EmptyAlgorithmSequence)
    ));
    assert!(matches!(
        expand_algorithm_sequence(&[vec![SequenceItem::Step(AlgorithmId::Er, 3)]]),
        Err(ConfigError::MissingRepeatCount { block: 0 })
    ));
    assert!(matches!(
        expand_algorithm_sequence(&[vec![SequenceItem::Repeat(1)]]),
        Err(ConfigError::EmptySequenceBlock { block: 0 })
    ));
    assert!(matches!(
        expand_algorithm_sequence(&[vec![
            SequenceItem::Repeat(1),
            SequenceItem::Step(AlgorithmId::Er, 3),
            SequenceItem::Repeat(2),
        ]]),
        Err(ConfigError::MisplacedRepeatCount {
            block: 0,
            position: 2
        })
    ));
    assert!(matches!(
        expand_algorithm_sequence(&[vec![
            SequenceItem::Repeat(1),
            SequenceItem::Step(AlgorithmId::Hio, 0),
        ]]),
        Err(ConfigError::ZeroIterations { block: 0, .. })
    ));
    assert!(matches!(
        expand_algorithm_sequence(&[vec![
            SequenceItem::Repeat(0),
            SequenceItem::Step(AlgorithmId::Er, 3),
        ]]),
        Err(ConfigError::EmptyAlgorithmSequence)
    ));
}

// ============================================================================
// Trigger compaction
// ============================================================================

#[test]
fn test_compact_single_and_periodic() {
    let triggers = compact_triggers(
        "t",
        &[TriggerSetting::every(0, 5), TriggerSetting::at(7), TriggerSetting::at(5)],
        20,
        TriggerKind::ForAllRuns,
        RunKind::First,
    )
    .unwrap();
    assert_eq!(triggers, vec![0, 5, 7, 10, 15]);
}

#[test]
fn test_compact_stop_is_exclusive_and_wraps() {
    let triggers = compact_triggers(
        "t",
        &[TriggerSetting::range(2, 3, 11)],
        20,
        TriggerKind::ForAllRuns,
        RunKind::First,
    )
    .unwrap();
    assert_eq!(triggers, vec![2, 5, 8]);

    let wrapped = compact_triggers(
        "t",
        &[TriggerSetting::range(-6, 2, -1), TriggerSetting::at(-1)],
        20,
        TriggerKind::ForAllRuns,
        RunKind::First,
    )
    .unwrap();
    assert_eq!(wrapped, vec![14, 16, 18, 19]);
}

#[test]
fn test_compact_drops_out_of_range_and_clamps_stop() {
    let triggers = compact_triggers(
        "t",
        &[TriggerSetting::at(25), TriggerSetting::range(8, 4, 100)],
        10,
        TriggerKind::ForAllRuns,
        RunKind::First,
    )
    .unwrap();
    assert_eq!(triggers, vec![8]);
}

#[test]
fn test_compact_rejects_bad_settings() {
    for setting in [
        TriggerSetting(vec![]),
        TriggerSetting(vec![1, 2, 3, 4]),
        TriggerSetting::every(0, 0),
        TriggerSetting::every(0, -2),
    ] {
        let result = compact_triggers(
            "amp_support_trigger",
            std::slice::from_ref(&setting),
            10,
            TriggerKind::ForAllRuns,
            RunKind::First,
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidTrigger { .. })),
            "{:?} should be rejected",
            setting
        );
    }
}

#[test]
fn test_continued_run_rewrites_triggers() {
    let settings = [TriggerSetting::every(0, 4)];

    let first_only = compact_triggers(
        "t",
        &settings,
        12,
        TriggerKind::FirstRunOnly,
        RunKind::Continued,
    )
    .unwrap();
    assert!(first_only.is_empty());

    let delayed = compact_triggers(
        "t",
        &settings,
        12,
        TriggerKind::ModifiedAfterFirst,
        RunKind::Continued,
    )
    .unwrap();
    assert_eq!(delayed, vec![4, 8]);

    let unchanged = compact_triggers(
        "t",
        &settings,
        12,
        TriggerKind::ForAllRuns,
        RunKind::Continued,
    )
    .unwrap();
    assert_eq!(unchanged, vec![0, 4, 8]);
}

// ============================================================================
// Params from config
// ============================================================================

#[test]
fn test_from_config_minimal() {
    let params = Params::from_config(&er_hio_config(), [16, 16, 8], RunKind::First).unwrap();
    params.validate();

    assert_eq!(params.iteration_count(), 10);
    assert_eq!(params.support.area, [8, 8, 4]);
    assert!(params.support.triggers.is_empty());
    assert!(params.phase.is_none());
    assert!(params.pcdi.is_none());
    assert!(params.resolution.is_none());
    assert!(params.twin.is_none());
    assert_eq!(params.beta, DEFAULT_BETA);
}

#[test]
fn test_from_config_full() {
    let config = ReconstructionConfig {
        amp_support_trigger: vec![TriggerSetting::every(0, 5)],
        phase_support_trigger: vec![TriggerSetting::range(0, 2, 6)],
        pcdi_trigger: vec![TriggerSetting::every(4, 3)],
        partial_coherence_roi: vec![Extent::Voxels(7), Extent::Voxels(11), Extent::Voxels(40)],
        resolution_trigger: vec![TriggerSetting::range(0, 1, 6)],
        iter_res_sigma_range: vec![3.0],
        twin_trigger: vec![TriggerSetting::at(3)],
        garbage_trigger: vec![TriggerSetting::every(2, 4)],
        avg_iterations: 2,
        seed: Some(9),
        ..er_hio_config()
    };
    let params = Params::from_config(&config, [16, 16, 8], RunKind::First).unwrap();
    params.validate();

    assert_eq!(params.support.triggers, vec![0, 5]);
    let phase = params.phase.as_ref().unwrap();
    assert_eq!(phase.triggers, vec![0, 2, 4]);

    let pcdi = params.pcdi.as_ref().unwrap();
    assert_eq!(pcdi.triggers, vec![4, 7]);
    assert_eq!(pcdi.roi, [8, 12, 8]);
    assert_eq!(pcdi.iterations, 20);

    let resolution = params.resolution.as_ref().unwrap();
    assert_eq!(resolution.iterations, 6);
    assert_eq!(resolution.triggers, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(resolution.sigma_range, (3.0, 1.0));
    assert_eq!(resolution.det_range, DEFAULT_DET_RANGE);

    assert_eq!(params.twin, Some(3));
    assert_eq!(params.gc_triggers, vec![2, 6]);
    assert_eq!(params.avg_iterations, 2);
    assert_eq!(params.seed, Some(9));
}

#[test]
fn test_from_config_continued_run() {
    let config = ReconstructionConfig {
        amp_support_trigger: vec![TriggerSetting::every(0, 5)],
        resolution_trigger: vec![TriggerSetting::range(0, 1, 6)],
        twin_trigger: vec![TriggerSetting::at(3)],
        ..er_hio_config()
    };
    let params = Params::from_config(&config, [16, 16, 8], RunKind::Continued).unwrap();
    assert_eq!(params.support.triggers, vec![5]);
    assert!(params.resolution.is_none());
    assert!(params.twin.is_none());
}

#[test]
fn test_from_config_missing_settings() {
    let config = ReconstructionConfig {
        support_area: Vec::new(),
        ..er_hio_config()
    };
    assert!(matches!(
        Params::from_config(&config, [8, 8, 8], RunKind::First),
        Err(ConfigError::MissingSetting("support_area"))
    ));

    let config = ReconstructionConfig {
        pcdi_trigger: vec![TriggerSetting::every(0, 1)],
        ..er_hio_config()
    };
    assert!(matches!(
        Params::from_config(&config, [8, 8, 8], RunKind::First),
        Err(ConfigError::MissingSetting("partial_coherence_roi"))
    ));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_new_params_validate() {
    let params = Params::new([8, 8, 8], vec![AlgorithmSwitch::new(AlgorithmId::Er, 4)]);
    params.validate();
    assert_eq!(params.support.area, [4, 4, 4]);
    assert_eq!(params.iteration_count(), 4);
}

#[test]
#[should_panic(expected = "strictly increase")]
fn test_validate_rejects_unordered_switches() {
    let params = Params::new(
        [8, 8, 8],
        vec![
            AlgorithmSwitch::new(AlgorithmId::Er, 5),
            AlgorithmSwitch::new(AlgorithmId::Hio, 5),
        ],
    );
    params.validate();
}

#[test]
#[should_panic(expected = "At least one algorithm switch")]
fn test_validate_rejects_empty_switches() {
    Params::new([8, 8, 8], Vec::new()).validate();
}

#[test]
#[should_panic(expected = "Support area")]
fn test_validate_rejects_oversized_support() {
    let mut params = Params::new([8, 8, 8], vec![AlgorithmSwitch::new(AlgorithmId::Er, 4)]);
    params.support.area = [9, 4, 4];
    params.validate();
}

#[test]
#[should_panic(expected = "avg_iterations")]
fn test_validate_rejects_long_averaging() {
    let mut params = Params::new([8, 8, 8], vec![AlgorithmSwitch::new(AlgorithmId::Er, 4)]);
    params.avg_iterations = 5;
    params.validate();
}
