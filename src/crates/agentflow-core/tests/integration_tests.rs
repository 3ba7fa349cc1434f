//! End-to-end workflow execution tests

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;

use agentflow_core::{
    handler, list_handler, Case, CheckpointError, CheckpointStorage, DefaultCase, FnExecutor,
    InMemoryCheckpointStorage, RequestResponse, RunState, TypedData, WorkflowBuilder,
    WorkflowError, WorkflowEvent,
};

fn forwarder(id: &str) -> Arc<FnExecutor> {
    FnExecutor::builder(id)
        .with_handler(
            handler::<String, _, _>(|text, ctx| async move { ctx.send_message(text).await })
                .with_output::<String>(),
        )
        .build()
}

fn appender(id: &str, suffix: &'static str) -> Arc<FnExecutor> {
    FnExecutor::builder(id)
        .with_handler(
            handler::<String, _, _>(move |text, ctx| async move {
                ctx.send_message(format!("{text}{suffix}")).await
            })
            .with_output::<String>(),
        )
        .build()
}

fn yielder(id: &str, suffix: &'static str) -> Arc<FnExecutor> {
    FnExecutor::builder(id)
        .with_handler(
            handler::<String, _, _>(move |text, ctx| async move {
                ctx.yield_output(format!("{text}{suffix}")).await
            })
            .with_output::<String>(),
        )
        .build()
}

fn outputs_of(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event.as_output::<String>())
        .map(|output| output.unwrap())
        .collect()
}

#[tokio::test]
async fn test_linear_pipeline_with_chained_checkpoints() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());
    let a = forwarder("a");
    let b = appender("b", "-processed");
    let c = yielder("c", "-done");

    let workflow = WorkflowBuilder::new(a.clone())
        .with_name("linear")
        .add_edge(a, b.clone())
        .add_edge(b, c)
        .with_checkpointing(storage.clone())
        .build()
        .unwrap();

    let events = workflow.run("start".to_string()).await.unwrap();
    assert_eq!(outputs_of(&events), vec!["start-processed-done".to_string()]);
    assert_eq!(
        events.last().and_then(|event| event.as_status()),
        Some(RunState::Idle)
    );

    // One initial checkpoint plus one per progressing superstep, chained.
    let checkpoints = storage.list_checkpoints(Some("linear")).await.unwrap();
    assert_eq!(checkpoints.len(), 4);
    assert_eq!(checkpoints[0].previous_checkpoint_id, None);
    for pair in checkpoints.windows(2) {
        assert_eq!(
            pair[1].previous_checkpoint_id.as_deref(),
            Some(pair[0].checkpoint_id.as_str())
        );
        assert!(pair[1].iteration_count > pair[0].iteration_count);
    }
}

#[tokio::test]
async fn test_fan_out_fan_in_aggregation() {
    let source = FnExecutor::builder("source")
        .with_handler(
            handler::<i64, _, _>(|n, ctx| async move { ctx.send_message(n).await })
                .with_output::<i64>(),
        )
        .build();
    let dbl = FnExecutor::builder("dbl")
        .with_handler(
            handler::<i64, _, _>(|n, ctx| async move { ctx.send_message(n * 2).await })
                .with_output::<i64>(),
        )
        .build();
    let sqr = FnExecutor::builder("sqr")
        .with_handler(
            handler::<i64, _, _>(|n, ctx| async move { ctx.send_message(n * n).await })
                .with_output::<i64>(),
        )
        .build();
    let sum = FnExecutor::builder("sum")
        .with_handler(
            list_handler::<i64, _, _>(|values, ctx| async move {
                ctx.yield_output(values.into_iter().sum::<i64>()).await
            })
            .with_output::<i64>(),
        )
        .build();

    let workflow = WorkflowBuilder::new(source.clone())
        .add_fan_out(source, vec![dbl.clone(), sqr.clone()])
        .add_fan_in(vec![dbl, sqr], sum)
        .build()
        .unwrap();

    let events = workflow.run(5i64).await.unwrap();
    let totals: Vec<i64> = events
        .iter()
        .filter_map(|event| event.as_output::<i64>())
        .map(|output| output.unwrap())
        .collect();
    // Aggregation fires exactly once, with both branch results.
    assert_eq!(totals, vec![35]);
}

#[tokio::test]
async fn test_switch_case_routes_each_input_once() {
    for (input, expected) in [(-3i64, "neg"), (0, "zero"), (7, "pos")] {
        let router = FnExecutor::builder("router")
            .with_handler(
                handler::<i64, _, _>(|n, ctx| async move { ctx.send_message(n).await })
                    .with_output::<i64>(),
            )
            .build();
        let labeler = |id: &'static str| {
            FnExecutor::builder(id)
                .with_handler(
                    handler::<i64, _, _>(move |_, ctx| async move {
                        ctx.yield_output(id.to_string()).await
                    })
                    .with_output::<String>(),
                )
                .build()
        };
        let neg = labeler("neg");
        let zero = labeler("zero");
        let pos = labeler("pos");

        let workflow = WorkflowBuilder::new(router.clone())
            .add_executor(neg)
            .add_executor(zero)
            .add_executor(pos)
            .add_switch(
                router,
                vec![
                    Case::new::<i64, _>(|n| *n < 0, "neg"),
                    Case::new::<i64, _>(|n| *n == 0, "zero"),
                ],
                DefaultCase::new("pos"),
            )
            .build()
            .unwrap();

        let events = workflow.run(input).await.unwrap();
        assert_eq!(outputs_of(&events), vec![expected.to_string()]);
    }
}

#[tokio::test]
async fn test_request_info_pause_and_resume() {
    let greeter = FnExecutor::builder("greeter")
        .with_handler(
            handler::<String, _, _>(|_task, ctx| async move {
                ctx.request_info::<String, String>("what should I greet?".to_string())
                    .await?;
                Ok(())
            })
            .with_request::<String>(),
        )
        .with_handler(
            handler::<RequestResponse, _, _>(|response, ctx| async move {
                let name: String = response.data.decode()?;
                ctx.yield_output(format!("hello {name}")).await
            })
            .with_output::<String>(),
        )
        .build();

    let workflow = WorkflowBuilder::new(greeter).build().unwrap();

    let mut stream = workflow.run_stream("go".to_string()).unwrap();
    let mut request_id = None;
    let mut saw_request_before_pause = false;
    let mut last_state = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            WorkflowEvent::RequestInfo(request) => {
                assert_eq!(request.source_executor_id, "greeter");
                request_id = Some(request.request_id);
            }
            WorkflowEvent::WorkflowStatus { state } => {
                if state == RunState::IdleWithPendingRequests {
                    saw_request_before_pause = request_id.is_some();
                }
                last_state = Some(state);
            }
            _ => {}
        }
    }
    assert!(saw_request_before_pause);
    assert_eq!(last_state, Some(RunState::IdleWithPendingRequests));

    let responses: HashMap<String, TypedData> = [(
        request_id.unwrap(),
        TypedData::new(&"world".to_string()).unwrap(),
    )]
    .into_iter()
    .collect();
    let events = workflow.send_responses(responses).await.unwrap();
    assert_eq!(outputs_of(&events), vec!["hello world".to_string()]);
    assert_eq!(
        events.last().and_then(|event| event.as_status()),
        Some(RunState::Idle)
    );
}

#[tokio::test]
async fn test_unknown_request_id_does_not_terminate_run() {
    let waiter = FnExecutor::builder("waiter")
        .with_handler(
            handler::<String, _, _>(|_task, ctx| async move {
                ctx.request_info::<String, String>("input?".to_string()).await?;
                Ok(())
            })
            .with_request::<String>(),
        )
        .with_handler(
            handler::<RequestResponse, _, _>(|response, ctx| async move {
                ctx.yield_output(response.data.decode::<String>()?).await
            })
            .with_output::<String>(),
        )
        .build();
    let workflow = WorkflowBuilder::new(waiter).build().unwrap();

    let events = workflow.run("go".to_string()).await.unwrap();
    let request_id = events
        .iter()
        .find_map(|event| event.as_request_info())
        .unwrap()
        .request_id
        .clone();

    let bogus: HashMap<String, TypedData> =
        [("nope".to_string(), TypedData::new(&"x".to_string()).unwrap())]
            .into_iter()
            .collect();
    let err = workflow.send_responses(bogus).await.unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownRequestId(_)));

    // The caller may retry with the valid id.
    let responses: HashMap<String, TypedData> =
        [(request_id, TypedData::new(&"ok".to_string()).unwrap())]
            .into_iter()
            .collect();
    let events = workflow.send_responses(responses).await.unwrap();
    assert_eq!(outputs_of(&events), vec!["ok".to_string()]);
}

fn paused_pipeline(storage: Arc<InMemoryCheckpointStorage>, sink_id: &str) -> agentflow_core::Workflow {
    let gate = FnExecutor::builder("gate")
        .with_handler(
            handler::<String, _, _>(|task, ctx| async move {
                ctx.shared_state().set("task", &task).await?;
                ctx.request_info::<String, String>(task).await?;
                Ok(())
            })
            .with_request::<String>(),
        )
        .with_handler(
            handler::<RequestResponse, _, _>(|response, ctx| async move {
                let task: String = ctx.shared_state().get("task").await?.unwrap_or_default();
                let answer: String = response.data.decode()?;
                ctx.send_message(format!("{task}:{answer}")).await
            })
            .with_output::<String>(),
        )
        .build();
    let sink = yielder(sink_id, "");

    WorkflowBuilder::new(gate.clone())
        .with_name("pausing")
        .add_edge(gate, sink)
        .with_checkpointing(storage as Arc<dyn CheckpointStorage>)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_resume_from_checkpoint_continues_identically() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());
    let workflow = paused_pipeline(storage.clone(), "sink");

    // Run to the pause; the pending request is checkpointed.
    let events = workflow.run("job".to_string()).await.unwrap();
    let request_id = events
        .iter()
        .find_map(|event| event.as_request_info())
        .unwrap()
        .request_id
        .clone();

    let latest = storage.get_latest("pausing").await.unwrap().unwrap();
    assert!(!latest.pending_request_info.is_empty());

    // Rebuild an identical workflow and resume from the checkpoint.
    let rebuilt = paused_pipeline(storage.clone(), "sink");
    let mut stream = rebuilt.run_stream_from_checkpoint(latest.checkpoint_id.clone(), None);
    let mut last_state = None;
    while let Some(event) = stream.next().await {
        last_state = event.unwrap().as_status().or(last_state);
    }
    assert_eq!(last_state, Some(RunState::IdleWithPendingRequests));

    let responses: HashMap<String, TypedData> =
        [(request_id, TypedData::new(&"done".to_string()).unwrap())]
            .into_iter()
            .collect();
    let events = rebuilt.send_responses(responses).await.unwrap();
    assert_eq!(outputs_of(&events), vec!["job:done".to_string()]);
}

#[tokio::test]
async fn test_resume_refuses_changed_graph() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());
    let workflow = paused_pipeline(storage.clone(), "sink");
    workflow.run("job".to_string()).await.unwrap();

    let latest = storage.get_latest("pausing").await.unwrap().unwrap();

    // Rebuild with a renamed executor: the signature no longer matches.
    let changed = paused_pipeline(storage.clone(), "renamedAgent");
    let mut stream = changed.run_stream_from_checkpoint(latest.checkpoint_id, None);
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Checkpoint(CheckpointError::GraphMismatch(_))
    ));
    assert!(format!("{err}").contains("Workflow graph has changed"));
}

#[tokio::test]
async fn test_runtime_storage_override_wins_over_buildtime() {
    let buildtime = Arc::new(InMemoryCheckpointStorage::new());
    let runtime = Arc::new(InMemoryCheckpointStorage::new());

    let a = forwarder("a");
    let b = yielder("b", "!");
    let workflow = WorkflowBuilder::new(a.clone())
        .with_name("override")
        .add_edge(a, b)
        .with_checkpointing(buildtime.clone() as Arc<dyn CheckpointStorage>)
        .build()
        .unwrap();

    let mut stream = workflow
        .run_stream_with_storage("x".to_string(), runtime.clone() as Arc<dyn CheckpointStorage>)
        .unwrap();
    while let Some(event) = stream.next().await {
        event.unwrap();
    }

    // Neither store writes to the other.
    assert_eq!(buildtime.checkpoint_count().await, 0);
    assert!(runtime.checkpoint_count().await > 0);
}

#[tokio::test]
async fn test_workflow_as_agent_collects_chat_replies() {
    use agentflow_core::{Agent, ChatMessage};

    let respond = FnExecutor::builder("respond")
        .with_handler(
            handler::<Vec<ChatMessage>, _, _>(|conversation, ctx| async move {
                let last = conversation
                    .last()
                    .map(|message| message.text.clone())
                    .unwrap_or_default();
                ctx.yield_output(ChatMessage::assistant(format!("echo: {last}")))
                    .await
            })
            .with_output::<ChatMessage>(),
        )
        .build();

    let workflow = WorkflowBuilder::new(respond).build().unwrap();
    let agent = workflow.as_agent("echo-agent");

    let response = agent.run(&[ChatMessage::user("ping")]).await.unwrap();
    assert_eq!(agent.name(), "echo-agent");
    assert_eq!(response.text(), "echo: ping");
}

#[tokio::test]
async fn test_executor_failure_marks_run_failed() {
    let boom = FnExecutor::builder("boom")
        .with_handler(
            handler::<String, _, _>(|_, _| async move {
                Err(WorkflowError::executor_failure("boom", "deliberate failure"))
            })
            .with_output::<String>(),
        )
        .build();
    let workflow = WorkflowBuilder::new(boom).build().unwrap();

    let mut stream = workflow.run_stream("x".to_string()).unwrap();
    let mut saw_failed_status = false;
    let mut saw_error = false;
    while let Some(event) = stream.next().await {
        match event {
            Ok(WorkflowEvent::WorkflowStatus { state }) if state == RunState::Failed => {
                saw_failed_status = true;
            }
            Ok(_) => {}
            Err(err) => {
                assert!(matches!(err, WorkflowError::ExecutorFailure { .. }));
                saw_error = true;
            }
        }
    }
    assert!(saw_failed_status);
    assert!(saw_error);
}
