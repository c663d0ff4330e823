//! Coordinator behaviour with scripted agents.
//!
//! Time is paused in these tests so agent delays advance instantly and the
//! interleaving of concurrent tasks is deterministic.

use std::sync::Arc;
use std::time::Duration;

use phaseflow::{
    AgentRegistry, Coordinator, CoordinatorEvent, Error, RunContext, RunState, TaskStatus,
};
use tokio::sync::mpsc;

use crate::fixtures::{
    chain, coordinator_with, diamond, independent_tasks, task, RecordingSink, ScriptedAgent,
};

fn drain(rx: &mut mpsc::UnboundedReceiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_parallel_phase_runs_tasks_concurrently() {
    let agent = Arc::new(ScriptedAgent::new().with_default_delay(50));
    let coord = coordinator_with(agent.clone());

    let result = coord
        .execute(independent_tasks(4), &RunContext::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.tasks_completed, 4);
    assert_eq!(agent.max_in_flight(), 4, "all four tasks should overlap");
}

#[tokio::test(start_paused = true)]
async fn test_chain_runs_one_task_at_a_time() {
    let agent = Arc::new(ScriptedAgent::new().with_default_delay(10));
    let coord = coordinator_with(agent.clone());

    let result = coord.execute(chain(5), &RunContext::default()).await.unwrap();

    assert!(result.success);
    assert_eq!(agent.max_in_flight(), 1);
    assert_eq!(agent.started(), vec!["t0", "t1", "t2", "t3", "t4"]);
}

#[tokio::test(start_paused = true)]
async fn test_next_phase_waits_for_slowest_task() {
    let agent = Arc::new(
        ScriptedAgent::new()
            .with_delay("a", 5)
            .with_delay("b", 10)
            .with_delay("c", 200),
    );
    let coord = coordinator_with(agent.clone());

    let result = coord.execute(diamond(), &RunContext::default()).await.unwrap();
    assert!(result.success);

    // b and c share phase 2; d may only start after both ended.
    let start_d = agent.position("start:d").unwrap();
    assert!(agent.position("end:b").unwrap() < start_d);
    assert!(agent.position("end:c").unwrap() < start_d);
    assert!(agent.position("end:a").unwrap() < agent.position("start:b").unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_no_phase_overlap_on_generated_graph() {
    let tasks = crate::fixtures::random_dag(7, 30);
    let agent = Arc::new(ScriptedAgent::new().with_default_delay(3));
    let coord = coordinator_with(agent.clone());

    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();
    assert!(result.success);
    let plan = result.plan.unwrap();

    let log = agent.log();
    for (i, entry) in log.iter().enumerate() {
        let Some(id) = entry.strip_prefix("start:") else {
            continue;
        };
        let phase = plan.phase_of(&id.into()).unwrap();
        // Every task of an earlier phase has ended before this start.
        for earlier in plan.phases.iter().filter(|p| p.phase_number < phase) {
            for done in earlier.task_ids() {
                let end = log
                    .iter()
                    .position(|e| e == &format!("end:{}", done))
                    .unwrap();
                assert!(end < i, "{} started before {} ended", id, done);
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_waits_for_siblings_then_aborts() {
    let agent = Arc::new(
        ScriptedAgent::new()
            .with_delay("t0", 10)
            .with_delay("t1", 100)
            .failing("t0"),
    );
    let coord = coordinator_with(agent.clone());
    let mut tasks = independent_tasks(2);
    tasks.push(task("next", 1).depends_on("t0").depends_on("t1"));

    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Task t0 failed: t0 failed"));
    assert_eq!(result.tasks_completed, 1);
    assert_eq!(result.task_results.len(), 2);
    assert!(result.task_results.iter().any(|r| r.task_id.as_str() == "t1" && r.success));
    assert!(agent.position("end:t1").is_some(), "sibling must finish");
    assert!(agent.position("start:next").is_none(), "no later phase");
    assert!(result.plan.is_some());
    assert_eq!(coord.state(), RunState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_in_phase_order_is_reported() {
    let agent = Arc::new(
        ScriptedAgent::new()
            .with_delay("t0", 80)
            .with_delay("t1", 5)
            .failing("t0")
            .failing("t1"),
    );
    let coord = coordinator_with(agent);

    let result = coord
        .execute(independent_tasks(2), &RunContext::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Task t0 failed: t0 failed"));
    assert_eq!(result.tasks_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_execute_is_rejected() {
    let agent = Arc::new(ScriptedAgent::new().with_default_delay(100));
    let coord = coordinator_with(agent.clone());
    let ctx = RunContext::default();

    let (first, second) = tokio::join!(coord.execute(chain(2), &ctx), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coord.is_running());
        coord.execute(independent_tasks(1), &ctx).await
    });

    assert!(first.unwrap().success);
    assert!(matches!(second, Err(Error::AlreadyRunning)));
    // The rejected call dispatched nothing.
    assert_eq!(agent.started(), vec!["t0", "t1"]);
    assert!(!coord.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_missing_agent_fails_run_without_dispatch() {
    let agent = Arc::new(ScriptedAgent::new());
    let coord = coordinator_with(agent.clone());
    let mut rx = coord.subscribe();
    let tasks = vec![
        task("ok", 1),
        task("ui", 1).with_agent("frontend").depends_on("ok"),
    ];

    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.tasks_completed, 1);
    assert_eq!(
        result.error.as_deref(),
        Some("No agent registered for type 'frontend' (task ui)")
    );
    assert_eq!(agent.started(), vec!["ok"]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::PhaseCompleted {
            phase_number: 2,
            succeeded: 0,
            failed: 1,
            ..
        }
    )));
    assert!(!events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::TaskStarted { task_id, .. } if task_id.as_str() == "ui"
    )));
    assert_eq!(events.last().map(|e| e.name()), Some("execution:failed"));
}

#[tokio::test]
async fn test_invalid_graph_reports_all_errors() {
    let coord = coordinator_with(Arc::new(ScriptedAgent::new()));
    let tasks = vec![
        task("a", 1).depends_on("a"),
        task("b", 1).depends_on("missing"),
    ];

    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();

    assert!(!result.success);
    assert!(result.plan.is_none());
    assert!(result.task_results.is_empty());
    let error = result.error.unwrap();
    assert!(error.contains("Task a depends on itself"));
    assert!(error.contains("Task b depends on non-existent task missing"));
}

#[tokio::test]
async fn test_event_sequence_for_chain() {
    let coord = coordinator_with(Arc::new(ScriptedAgent::new()));
    let mut rx = coord.subscribe();
    let ctx = RunContext::default();

    coord.execute(chain(2), &ctx).await.unwrap();

    let events = drain(&mut rx);
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "execution:started",
            "phase:started",
            "task:assigned",
            "task:started",
            "task:completed",
            "phase:completed",
            "phase:started",
            "task:assigned",
            "task:started",
            "task:completed",
            "phase:completed",
            "execution:completed",
        ]
    );
    assert_eq!(
        events[0],
        CoordinatorEvent::ExecutionStarted {
            run_id: ctx.run_id,
            total_tasks: 2
        }
    );
    assert!(matches!(
        &events[11],
        CoordinatorEvent::ExecutionCompleted { tasks_completed: 2, run_id, .. } if *run_id == ctx.run_id
    ));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_phase_assigns_before_dispatch() {
    let coord = coordinator_with(Arc::new(ScriptedAgent::new().with_default_delay(5)));
    let mut rx = coord.subscribe();

    coord
        .execute(independent_tasks(3), &RunContext::default())
        .await
        .unwrap();

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
    let last_assigned = names.iter().rposition(|n| *n == "task:assigned").unwrap();
    let first_started = names.iter().position(|n| *n == "task:started").unwrap();
    assert!(last_assigned < first_started);
    assert_eq!(names.iter().filter(|n| **n == "task:completed").count(), 3);
}

#[tokio::test]
async fn test_sink_sees_transitions_and_progress() {
    let sink = Arc::new(RecordingSink::default());
    let coord = coordinator_with(Arc::new(ScriptedAgent::new().failing("t1"))).with_sink(sink.clone());

    let result = coord.execute(chain(3), &RunContext::default()).await.unwrap();
    assert!(!result.success);

    assert_eq!(
        sink.statuses_for("t0"),
        vec![TaskStatus::Assigned, TaskStatus::Active, TaskStatus::Completed]
    );
    assert_eq!(
        sink.statuses_for("t1"),
        vec![
            TaskStatus::Assigned,
            TaskStatus::Active,
            TaskStatus::Failed {
                error: "t1 failed".to_string()
            }
        ]
    );
    assert!(sink.statuses_for("t2").is_empty());

    let progress = sink.progress();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0].0, 1);
    assert_eq!(progress[0].1, 3);
    assert!((progress[0].2 - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(progress[1].0, 1);
}

#[tokio::test]
async fn test_task_results_carry_agent_output() {
    let coord = coordinator_with(Arc::new(ScriptedAgent::new()));
    let tasks = vec![task("api", 3).touching("src/api.rs")];

    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();

    let api = &result.task_results[0];
    assert!(api.success);
    assert_eq!(api.output, "done api");
    assert_eq!(api.files_changed, vec!["src/api.rs".to_string()]);
    assert!(api.error.is_none());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["tasks_completed"], 1);
    assert_eq!(json["plan"]["total_duration"], 3);
}

#[tokio::test]
async fn test_agents_resolved_by_type() {
    let backend = Arc::new(ScriptedAgent::new());
    let docs = Arc::new(ScriptedAgent::new());
    let mut registry = AgentRegistry::new();
    registry.register("backend", backend.clone());
    registry.register("docs", docs.clone());
    let coord = Coordinator::new(registry);

    let tasks = vec![
        task("server", 1).with_agent("backend"),
        task("readme", 1).with_agent("docs").depends_on("server"),
    ];
    let result = coord.execute(tasks, &RunContext::default()).await.unwrap();

    assert!(result.success);
    assert_eq!(backend.started(), vec!["server"]);
    assert_eq!(docs.started(), vec!["readme"]);
}

#[tokio::test]
async fn test_wide_run_delivers_every_event() {
    let n = 300;
    let coord = coordinator_with(Arc::new(ScriptedAgent::new()));
    let mut rx = coord.subscribe();

    let result = coord
        .execute(independent_tasks(n), &RunContext::default())
        .await
        .unwrap();
    assert!(result.success);

    let events = drain(&mut rx);
    // started, phase start/end, completed, plus three per task.
    assert_eq!(events.len(), 4 + 3 * n);
    let count = |name: &str| events.iter().filter(|e| e.name() == name).count();
    assert_eq!(count("task:assigned"), n);
    assert_eq!(count("task:started"), n);
    assert_eq!(count("task:completed"), n);
    assert_eq!(events.first().map(|e| e.name()), Some("execution:started"));
    assert_eq!(events.last().map(|e| e.name()), Some("execution:completed"));
}

#[tokio::test]
async fn test_every_subscriber_sees_every_event() {
    let coord = coordinator_with(Arc::new(ScriptedAgent::new()));
    let mut first = coord.subscribe();
    let mut second = coord.subscribe();

    coord
        .execute(independent_tasks(50), &RunContext::default())
        .await
        .unwrap();

    assert_eq!(drain(&mut first), drain(&mut second));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_releases_coordinator() {
    let agent = Arc::new(ScriptedAgent::new().with_default_delay(1_000));
    let coord = coordinator_with(agent.clone());
    let ctx = RunContext::default();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), coord.execute(chain(3), &ctx)).await;
    assert!(cancelled.is_err());
    assert_eq!(agent.started(), vec!["t0"]);
    assert!(!coord.is_running());
    assert_eq!(coord.state(), RunState::Failed);

    let rerun = coord.execute(independent_tasks(1), &ctx).await.unwrap();
    assert!(rerun.success);
    assert_eq!(coord.state(), RunState::Completed);
}
