//! Scheduling invariants checked over generated task sets.

use std::collections::HashSet;

use phaseflow::{DependencyGraph, ExecutionPlan};

use crate::fixtures::{chain, random_dag};

const SEEDS: std::ops::Range<u64> = 1..60;

fn plan_for(seed: u64, n: usize) -> (DependencyGraph, ExecutionPlan) {
    let graph = DependencyGraph::build(random_dag(seed, n));
    let report = graph.validate();
    assert!(report.is_valid(), "seed {} produced {}", seed, report);
    let plan = ExecutionPlan::create(&graph).unwrap();
    (graph, plan)
}

#[test]
fn test_every_task_scheduled_exactly_once() {
    for seed in SEEDS {
        let (graph, plan) = plan_for(seed, 40);
        let mut seen = HashSet::new();
        for phase in &plan.phases {
            assert!(!phase.is_empty());
            for id in phase.task_ids() {
                assert!(seen.insert(id.clone()), "seed {}: {} scheduled twice", seed, id);
            }
        }
        assert_eq!(seen.len(), graph.len());
        assert_eq!(plan.total_tasks, graph.len());
    }
}

#[test]
fn test_dependencies_run_in_earlier_phases() {
    for seed in SEEDS {
        let (graph, plan) = plan_for(seed, 40);
        for task in graph.tasks() {
            let phase = plan.phase_of(&task.id).unwrap();
            for dep in &task.dependencies {
                let dep_phase = plan.phase_of(dep).unwrap();
                assert!(
                    phase > dep_phase,
                    "seed {}: {} (phase {}) not after {} (phase {})",
                    seed,
                    task.id,
                    phase,
                    dep,
                    dep_phase
                );
            }
        }
    }
}

#[test]
fn test_no_file_shared_within_a_phase() {
    for seed in SEEDS {
        let (_, plan) = plan_for(seed, 40);
        for phase in &plan.phases {
            let mut files = HashSet::new();
            for task in &phase.tasks {
                for file in &task.files_affected {
                    assert!(
                        files.insert(file.as_str()),
                        "seed {}: {} shared in phase {}",
                        seed,
                        file,
                        phase.phase_number
                    );
                }
            }
        }
    }
}

#[test]
fn test_duration_bounds() {
    for seed in SEEDS {
        let (graph, plan) = plan_for(seed, 40);
        assert!(plan.total_duration <= plan.sequential_duration);
        assert!(plan.parallelization_ratio >= 0.0);
        assert!(plan.parallelization_ratio < 1.0);

        let sequential: u64 = graph.tasks().iter().map(|t| t.estimated_duration).sum();
        assert_eq!(plan.sequential_duration, sequential);

        let critical = graph.critical_path().unwrap();
        let longest = graph
            .tasks()
            .iter()
            .map(|t| t.estimated_duration)
            .max()
            .unwrap_or(0);
        assert!(critical.duration >= longest);
        assert!(critical.duration <= plan.total_duration);
    }
}

#[test]
fn test_phase_numbers_are_contiguous() {
    for seed in SEEDS {
        let (_, plan) = plan_for(seed, 30);
        let numbers: Vec<usize> = plan.phases.iter().map(|p| p.phase_number).collect();
        let expected: Vec<usize> = (1..=plan.phase_count()).collect();
        assert_eq!(numbers, expected);
    }
}

#[test]
fn test_build_is_idempotent() {
    for seed in SEEDS {
        let tasks = random_dag(seed, 40);
        let first = DependencyGraph::build(tasks.clone());
        let second = DependencyGraph::build(tasks);
        assert_eq!(first.edges(), second.edges());
        assert_eq!(
            ExecutionPlan::create(&first).unwrap(),
            ExecutionPlan::create(&second).unwrap()
        );
    }
}

#[test]
fn test_critical_path_is_a_dependency_chain() {
    for seed in SEEDS {
        let (graph, _) = plan_for(seed, 40);
        let critical = graph.critical_path().unwrap();
        for pair in critical.tasks.windows(2) {
            assert!(
                pair[1].dependencies.contains(&pair[0].id),
                "seed {}: {} does not depend on {}",
                seed,
                pair[1].id,
                pair[0].id
            );
        }
        let sum: u64 = critical.tasks.iter().map(|t| t.estimated_duration).sum();
        assert_eq!(sum, critical.duration);
    }
}

#[test]
fn test_closing_a_chain_is_always_detected() {
    for n in 2..20 {
        let mut tasks = chain(n);
        let last = format!("t{}", n - 1);
        tasks[0] = tasks[0].clone().depends_on(last.as_str());

        let report = DependencyGraph::build(tasks).validate();
        assert!(report.has_cycle(), "cycle of length {} missed", n);
        let named: HashSet<String> = report
            .errors
            .iter()
            .flat_map(|e| e.tasks())
            .map(|id| id.to_string())
            .collect();
        assert!(named.contains("t0"));
        assert!(named.contains(&last));
    }
}
