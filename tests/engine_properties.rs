//! Property tests for the matching engine
//!
//! Random pools are generated from a fixed seed so failures are reproducible. Small
//! pools are checked against an exhaustive search over all matchings.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use pair_solver::{
    CompatibilityModel, EngineConfig, EngineError, Exclusion, Interest, MatchOutcome,
    MatchingEngine, MeetingFormat, Participant, ParticipantId, Place, Role,
};

const GROUPS: [&str; 3] = ["cs", "math", "bio"];
const WORKPLACES: [&str; 3] = ["lab", "hq", "remote"];

fn random_participant(rng: &mut ChaCha8Rng, id: i64, max_id: i64) -> Participant {
    let role = if rng.gen_bool(0.5) { Role::Student } else { Role::Worker };
    let format = *[MeetingFormat::Online, MeetingFormat::Offline, MeetingFormat::Any]
        .choose(rng)
        .unwrap();

    let interests: Vec<Interest> = Interest::ALL
        .iter()
        .copied()
        .filter(|_| rng.gen_bool(0.3))
        .collect();
    let places: Vec<Place> = Place::ALL
        .iter()
        .copied()
        .filter(|_| rng.gen_bool(0.4))
        .collect();
    let groups: Vec<&str> = GROUPS.iter().copied().filter(|_| rng.gen_bool(0.2)).collect();
    let workplaces: Vec<&str> = WORKPLACES
        .iter()
        .copied()
        .filter(|_| rng.gen_bool(0.2))
        .collect();
    let excluded: Vec<i64> = (1..=max_id).filter(|_| rng.gen_bool(0.1)).collect();

    Participant::new(id, role)
        .with_format(format)
        .with_interests(interests)
        .with_places(places)
        .with_groups(groups)
        .with_workplaces(workplaces)
        .with_excluded(excluded)
}

fn random_pool(seed: u64, size: i64) -> Vec<Participant> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (1..=size)
        .map(|id| random_participant(&mut rng, id, size))
        .collect()
}

fn engine() -> MatchingEngine {
    MatchingEngine::new(EngineConfig::default().with_workers(1)).unwrap()
}

/// Best achievable total weight, by trying every matching
fn brute_force_best(participants: &[Participant], model: &CompatibilityModel) -> i64 {
    fn search(
        participants: &[Participant],
        model: &CompatibilityModel,
        used: &mut Vec<bool>,
        start: usize,
    ) -> i64 {
        let Some(i) = (start..participants.len()).find(|&i| !used[i]) else {
            return 0;
        };

        used[i] = true;
        // Leave i unmatched
        let mut best = search(participants, model, used, i + 1);
        for j in i + 1..participants.len() {
            if used[j] {
                continue;
            }
            if let Some(weight) = model.evaluate(&participants[i], &participants[j]).weight() {
                used[j] = true;
                best = best.max(weight + search(participants, model, used, i + 1));
                used[j] = false;
            }
        }
        used[i] = false;
        best
    }

    let mut used = vec![false; participants.len()];
    search(participants, model, &mut used, 0)
}

/// Structural checks every outcome must pass
fn assert_valid(participants: &[Participant], outcome: &MatchOutcome, model: &CompatibilityModel) {
    let all: BTreeSet<ParticipantId> = participants.iter().map(|p| p.id).collect();
    let mut seen = BTreeSet::new();

    for pair in &outcome.pairs {
        assert!(seen.insert(pair.low), "{} matched twice", pair.low);
        assert!(seen.insert(pair.high), "{} matched twice", pair.high);

        let a = participants.iter().find(|p| p.id == pair.low).unwrap();
        let b = participants.iter().find(|p| p.id == pair.high).unwrap();
        let weight = model.evaluate(a, b).weight();
        assert_eq!(weight, Some(pair.weight), "pair {pair} is not an allowed edge");
    }

    for id in &outcome.free {
        assert!(seen.insert(*id), "{id} is both matched and free");
    }
    assert_eq!(seen, all, "matched and free ids must cover the pool exactly");
}

#[test]
fn test_random_pools_are_optimal() {
    let model = CompatibilityModel::new(1);
    for seed in 0..60 {
        let size = 2 + (seed % 9) as i64;
        let pool = random_pool(seed, size);

        let outcome = engine().solve(pool.clone()).unwrap();
        assert_valid(&pool, &outcome, &model);
        assert_eq!(
            outcome.total_weight(),
            brute_force_best(&pool, &model),
            "seed {seed}, {size} participants"
        );
    }
}

#[test]
fn test_larger_pools_are_valid() {
    let model = CompatibilityModel::new(1);
    for seed in 100..105 {
        let pool = random_pool(seed, 80);
        let outcome = engine().solve(pool.clone()).unwrap();
        assert_valid(&pool, &outcome, &model);
    }
}

#[test]
fn test_parallel_graph_build_gives_same_result() {
    let pool = random_pool(7, 300);
    let single = engine().solve(pool.clone()).unwrap();
    let parallel = MatchingEngine::new(EngineConfig::default().with_workers(4))
        .unwrap()
        .solve(pool)
        .unwrap();
    assert_eq!(single.pairs, parallel.pairs);
    assert_eq!(single.free, parallel.free);
}

#[test]
fn test_result_does_not_depend_on_input_order() {
    let pool = random_pool(42, 40);
    let mut shuffled = pool.clone();
    shuffled.shuffle(&mut ChaCha8Rng::seed_from_u64(1));

    let first = engine().solve(pool).unwrap();
    let second = engine().solve(shuffled).unwrap();
    assert_eq!(first.pairs, second.pairs);
    assert_eq!(first.free, second.free);
}

#[test]
fn test_evaluation_is_symmetric() {
    let model = CompatibilityModel::new(1);
    let pool = random_pool(3, 30);
    for a in &pool {
        for b in &pool {
            assert_eq!(model.evaluate(a, b), model.evaluate(b, a));
        }
    }
}

#[test]
fn test_one_sided_history_still_excludes() {
    let model = CompatibilityModel::new(1);
    let a = Participant::new(1, Role::Worker).with_excluded([2]);
    let b = Participant::new(2, Role::Worker);
    assert_eq!(model.evaluate(&a, &b).exclusion(), Some(Exclusion::AlreadyMet));
    assert_eq!(model.evaluate(&b, &a).exclusion(), Some(Exclusion::AlreadyMet));

    let outcome = engine().solve(vec![a, b]).unwrap();
    assert!(outcome.pairs.is_empty());
}

#[test]
fn test_online_pair_with_shared_interest_is_matched() {
    let a = Participant::new(1, Role::Student)
        .with_format(MeetingFormat::Online)
        .with_interests([Interest::Art, Interest::Books]);
    let b = Participant::new(2, Role::Student)
        .with_format(MeetingFormat::Online)
        .with_interests([Interest::Books, Interest::Music]);

    let outcome = engine().solve(vec![a, b]).unwrap();
    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].weight, 2);
    assert!(outcome.free.is_empty());
}

#[test]
fn test_online_and_offline_only_stay_free() {
    let a = Participant::new(1, Role::Student).with_format(MeetingFormat::Online);
    let b = Participant::new(2, Role::Student)
        .with_format(MeetingFormat::Offline)
        .with_places([Place::Campus]);

    let outcome = engine().solve(vec![a, b]).unwrap();
    assert!(outcome.pairs.is_empty());
    assert_eq!(outcome.free, vec![ParticipantId(1), ParticipantId(2)]);
}

#[test]
fn test_participant_without_allowed_edges_is_free() {
    let loner = Participant::new(9, Role::Worker).with_groups(["cs"]);
    let others = (1..=4).map(|id| {
        Participant::new(id, Role::Worker)
            .with_groups(["cs"])
            .with_interests([Interest::Games])
    });
    // Everyone shares the "cs" group, so nobody can be paired
    let pool: Vec<Participant> = others.chain(std::iter::once(loner)).collect();

    let outcome = engine().solve(pool).unwrap();
    assert!(outcome.pairs.is_empty());
    assert_eq!(outcome.free.len(), 5);
}

#[test]
fn test_zero_budget_returns_valid_best_effort() {
    let model = CompatibilityModel::new(1);
    let pool = random_pool(2024, 200);
    let engine =
        MatchingEngine::new(EngineConfig::default().with_time_limit(Duration::ZERO)).unwrap();

    match engine.solve(pool.clone()) {
        Err(EngineError::Timeout { best_effort, .. }) => {
            assert_valid(&pool, &best_effort, &model);
            assert!(!best_effort.pairs.is_empty());
        }
        Ok(outcome) => panic!("expected a timeout, got {} pairs", outcome.pairs.len()),
        Err(err) => panic!("unexpected error: {err}"),
    }
}
