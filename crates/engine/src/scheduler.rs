//! DAG Scheduler (spec §4.6): per-node retry/timeout pipeline and the
//! bounded-parallel ready-set execution loop, edge gating, loop fan-out,
//! and the abort path.

use crate::config::EngineConfig;
use crate::engine::Engine;
use fleet_action::{EngineHandle, NodeError, ResolvedNode};
use fleet_execution::{ExecutionContext, LogLevel, NodeStatus};
use fleet_expression::eval_edge_condition;
use fleet_workflow::{WorkflowDefinition, WorkflowEdge, WorkflowNode};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

const BACKOFF_CAP_MS: u64 = 30_000;

/// What a single node run settled on, once retries/timeout/continue-on-error
/// have all been accounted for.
pub(crate) enum NodeOutcome {
    Completed(Value),
    /// Failed, but `continueOnError` lets the graph proceed past it.
    CarriedOver(Value),
    /// Failed hard — triggers the abort path.
    Failed(NodeError),
}

fn resolved_max_retries(node: &WorkflowNode, cfg: &EngineConfig) -> u32 {
    if !node.retryable() {
        return 0;
    }
    node.max_retries_override().unwrap_or(cfg.node_max_retries)
}

fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(1u64 << attempt.saturating_sub(1).min(31)).min(BACKOFF_CAP_MS)
}

/// Run one node through the full retry/timeout pipeline (spec §4.6
/// "Per-node execution"). Always clears its timeout timer on every path —
/// `tokio::time::timeout` does this for us structurally, it cannot leak.
pub(crate) async fn execute_node(engine: &Engine, node: &WorkflowNode, ctx: &ExecutionContext, cfg: &EngineConfig) -> NodeOutcome {
    let max_retries = resolved_max_retries(node, cfg);
    let retry_delay = node.retry_delay_ms();
    let timeout_ms = node.timeout_override_ms().unwrap_or(cfg.node_timeout_ms);

    ctx.set_node_status(node.id.clone(), NodeStatus::Running);
    debug!(node_id = %node.id, "node:start");

    let resolved_config = ctx.resolve_config(&node.config);

    let mut attempt: u32 = 0;
    loop {
        if ctx.cancellation.is_cancelled() {
            return finish_failed(ctx, node, NodeError::Cancelled);
        }

        let handler = match engine.registry().get(&node.node_type) {
            Ok(handler) => handler,
            Err(err) => return finish_failed(ctx, node, err),
        };

        let resolved_node = ResolvedNode { id: &node.id, node_type: &node.node_type, config: resolved_config.clone() };

        let outcome = tokio::select! {
            () = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), handler.execute(&resolved_node, ctx, engine)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(NodeError::Retryable {
                        message: format!("node `{}` exceeded its {}ms deadline", node.id, timeout_ms),
                        backoff_hint_ms: None,
                    }),
                }
            }
        };

        match outcome {
            Ok(value) => {
                ctx.set_node_status(node.id.clone(), NodeStatus::Completed);
                debug!(node_id = %node.id, "node:complete");
                return NodeOutcome::Completed(value);
            }
            Err(err) if err.is_retryable_with(max_retries, attempt) => {
                attempt += 1;
                let attempts_used = ctx.increment_retry_attempts(&node.id);
                let delay = backoff_ms(retry_delay, attempts_used);
                debug!(node_id = %node.id, attempt = attempts_used, max_retries, backoff_ms = delay, "node:retry");
                ctx.log(
                    Some(node.id.clone()),
                    format!("node:retry attempt={attempts_used} maxRetries={max_retries} backoffMs={delay}"),
                    LogLevel::Warn,
                );
                ctx.set_node_status(node.id.clone(), NodeStatus::Running);
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
            Err(err) => return finish_failed(ctx, node, err),
        }
    }
}

/// Distinguishes "still has a retry slot" from "retries exhausted or not
/// retryable at all" without the caller needing to know about attempt
/// bookkeeping.
trait RetryDecision {
    fn is_retryable_with(&self, max_retries: u32, attempts_so_far: u32) -> bool;
}

impl RetryDecision for NodeError {
    fn is_retryable_with(&self, max_retries: u32, attempts_so_far: u32) -> bool {
        use fleet_error::Retryable;
        self.is_retryable() && attempts_so_far < max_retries
    }
}

fn finish_failed(ctx: &ExecutionContext, node: &WorkflowNode, err: NodeError) -> NodeOutcome {
    ctx.error(Some(node.id.clone()), &err);
    ctx.set_node_status(node.id.clone(), NodeStatus::Failed);
    debug!(node_id = %node.id, error = %err, "node:error");
    if node.continue_on_error() {
        NodeOutcome::CarriedOver(serde_json::json!({ "error": err.to_string(), "_failed": true }))
    } else {
        NodeOutcome::Failed(err)
    }
}

/// A workflow's edges indexed for the scheduling loop.
struct Topology<'a> {
    outgoing: HashMap<&'a fleet_core::NodeId, Vec<&'a WorkflowEdge>>,
    in_degree: HashMap<fleet_core::NodeId, usize>,
    nodes: HashMap<&'a fleet_core::NodeId, &'a WorkflowNode>,
}

impl<'a> Topology<'a> {
    fn build(workflow: &'a WorkflowDefinition) -> Self {
        let mut outgoing: HashMap<&fleet_core::NodeId, Vec<&WorkflowEdge>> = HashMap::new();
        let mut in_degree: HashMap<fleet_core::NodeId, usize> = workflow.nodes.iter().map(|n| (n.id.clone(), 0)).collect();
        for edge in &workflow.edges {
            outgoing.entry(&edge.source).or_default().push(edge);
            *in_degree.entry(edge.target.clone()).or_insert(0) += 1;
        }
        let nodes = workflow.nodes.iter().map(|n| (&n.id, n)).collect();
        Self { outgoing, in_degree, nodes }
    }
}

/// Result of running the whole graph once.
pub(crate) enum RunOutcome {
    Completed,
    Failed(NodeError),
    Cancelled,
}

/// Execute every node of `workflow` to a terminal state (spec §4.6's
/// scheduling loop), honoring `MAX_CONCURRENT_BRANCHES`, edge gating, loop
/// fan-out, and the abort path.
pub(crate) async fn run_graph(engine: &Engine, workflow: &WorkflowDefinition, ctx: &ExecutionContext, cfg: &EngineConfig) -> RunOutcome {
    let topo = Topology::build(workflow);
    let mut ready: VecDeque<fleet_core::NodeId> = fleet_workflow::dag::entry_node_ids(workflow).into_iter().collect();
    let mut executed: HashSet<fleet_core::NodeId> = HashSet::new();
    let semaphore = std::sync::Arc::new(Semaphore::new(cfg.max_concurrent_branches.max(1)));

    while let Some(batch) = next_batch(&mut ready, &executed) {
        if ctx.cancellation.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let mut joins = JoinSet::new();
        for node_id in batch {
            let Some(&node) = topo.nodes.get(&node_id) else { continue };
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let node = node.clone();
            let ctx = ctx.clone();
            let cfg = *cfg;
            let engine = engine.clone_handle();
            joins.spawn(async move {
                let _permit = permit;
                let outcome = execute_node(&engine, &node, &ctx, &cfg).await;
                (node, outcome)
            });
        }

        while let Some(joined) = joins.join_next().await {
            let (node, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    tracing::error!(%join_err, "node task panicked");
                    return RunOutcome::Failed(NodeError::Fatal { message: join_err.to_string(), details: None });
                }
            };
            executed.insert(node.id.clone());

            match outcome {
                NodeOutcome::Completed(output) | NodeOutcome::CarriedOver(output) => {
                    ctx.set_node_output(node.id.clone(), output.clone());
                    if node.node_type.as_str() == "loop.for_each" {
                        run_loop_fanout(engine, workflow, &node, &output, ctx, cfg, &topo, &mut ready, &mut executed).await;
                    }
                    gate_outgoing(&topo, &node, &output, ctx, &mut ready, &mut executed);
                }
                NodeOutcome::Failed(err) => {
                    abort_remaining(workflow, ctx, &executed);
                    return RunOutcome::Failed(err);
                }
            }
        }
    }

    // Ready-set emptied without an abort: anything never reached (an
    // ignored source-port edge was its only path in) is unreachable, not
    // an error — mark it skipped so I1's completed+failed+skipped==nodeCount
    // holds.
    for node in &workflow.nodes {
        if ctx.get_node_status(&node.id).is_none() {
            ctx.set_node_status(node.id.clone(), NodeStatus::Skipped);
        }
    }

    RunOutcome::Completed
}

fn next_batch(ready: &mut VecDeque<fleet_core::NodeId>, executed: &HashSet<fleet_core::NodeId>) -> Option<Vec<fleet_core::NodeId>> {
    let mut batch = Vec::new();
    while let Some(id) = ready.pop_front() {
        if executed.contains(&id) {
            continue;
        }
        batch.push(id);
    }
    if batch.is_empty() {
        None
    } else {
        Some(batch)
    }
}

/// After a node completes, route its outgoing edges (spec §4.6 "Edge
/// gating"): source-port filtering, then per-edge condition evaluation,
/// then in-degree decrement into the ready-set.
fn gate_outgoing(
    topo: &Topology<'_>,
    node: &WorkflowNode,
    output: &Value,
    ctx: &ExecutionContext,
    ready: &mut VecDeque<fleet_core::NodeId>,
    executed: &mut HashSet<fleet_core::NodeId>,
) {
    let matched_port = output.get("matchedPort").or_else(|| output.get("port")).and_then(Value::as_str);

    let Some(edges) = topo.outgoing.get(&node.id) else { return };
    for edge in edges {
        if let Some(expected) = matched_port {
            if edge.source_port != expected {
                continue;
            }
        }

        if executed.contains(&edge.target) {
            continue;
        }

        if let Some(condition) = &edge.condition {
            let resolved = ctx.resolve(condition);
            let condition_str = resolved.as_str().map(str::to_owned).unwrap_or(condition.clone());
            let source_status = ctx.get_node_status(&node.id).map_or(Value::Null, |s| Value::String(s.to_string()));
            let eval_ctx = fleet_expression::EvalContext::for_edge(output.clone(), source_status, ctx.data_snapshot(), ctx.node_outputs_map());
            if !eval_edge_condition(&condition_str, &eval_ctx) {
                ctx.set_node_status(edge.target.clone(), NodeStatus::Skipped);
                executed.insert(edge.target.clone());
                continue;
            }
        }

        decrement_and_maybe_ready(topo, &edge.target, ready, executed);
    }
}

fn decrement_and_maybe_ready(
    topo: &Topology<'_>,
    target: &fleet_core::NodeId,
    ready: &mut VecDeque<fleet_core::NodeId>,
    executed: &HashSet<fleet_core::NodeId>,
) {
    if executed.contains(target) {
        return;
    }
    // NOTE: in-degree is tracked per-topology build, but since each edge is
    // only ever gated once (the node it comes from only completes once),
    // we recompute remaining in-degree by counting already-resolved
    // incoming edges each time rather than mutating shared state, which
    // keeps this function free of interior mutability.
    let remaining = topo
        .in_degree
        .get(target)
        .copied()
        .unwrap_or(0)
        .saturating_sub(incoming_resolved_count(topo, target, executed));
    if remaining == 0 {
        ready.push_back(target.clone());
    }
}

fn incoming_resolved_count(topo: &Topology<'_>, target: &fleet_core::NodeId, executed: &HashSet<fleet_core::NodeId>) -> usize {
    topo.outgoing
        .values()
        .flatten()
        .filter(|edge| &edge.target == target && executed.contains(&edge.source))
        .count()
}

#[allow(clippy::too_many_arguments)]
async fn run_loop_fanout(
    engine: &Engine,
    workflow: &WorkflowDefinition,
    loop_node: &WorkflowNode,
    loop_output: &Value,
    ctx: &ExecutionContext,
    cfg: &EngineConfig,
    topo: &Topology<'_>,
    ready: &mut VecDeque<fleet_core::NodeId>,
    executed: &mut HashSet<fleet_core::NodeId>,
) {
    let (Some(items), Some(variable)) = (
        loop_output.get("items").and_then(Value::as_array).cloned(),
        loop_output.get("variable").and_then(Value::as_str).map(str::to_owned),
    ) else {
        return;
    };

    let Some(targets) = topo.outgoing.get(&loop_node.id) else { return };
    let target_nodes: Vec<&WorkflowNode> = targets.iter().filter_map(|edge| topo.nodes.get(&edge.target).copied()).collect();
    if target_nodes.is_empty() {
        return;
    }

    let total = items.len();
    let mut collected = Vec::with_capacity(total);

    for (index, item) in items.into_iter().enumerate() {
        let overrides = serde_json::json!({ variable.clone(): item, "_loopIndex": index, "_loopTotal": total });
        let fork = ctx.fork(overrides);
        debug!(node_id = %loop_node.id, iteration = index, total, "loop:iteration");

        for target in &target_nodes {
            let outcome = execute_node(engine, target, &fork, cfg).await;
            match outcome {
                NodeOutcome::Completed(output) | NodeOutcome::CarriedOver(output) => {
                    fork.set_node_output(target.id.clone(), output);
                }
                NodeOutcome::Failed(_) if target.continue_on_error() => {}
                NodeOutcome::Failed(_) => break,
            }
        }

        collected.push(fork.data_snapshot());
        ctx.absorb_fork(&fork);
    }

    let synthetic = serde_json::json!({ "_loopResults": collected, "iterations": total });
    for target in target_nodes {
        ctx.set_node_output(target.id.clone(), synthetic.clone());
        ctx.set_node_status(target.id.clone(), NodeStatus::Completed);
        executed.insert(target.id.clone());
        gate_outgoing(topo, target, &synthetic, ctx, ready, executed);
    }
    let _ = workflow;
}

fn abort_remaining(workflow: &WorkflowDefinition, ctx: &ExecutionContext, executed: &HashSet<fleet_core::NodeId>) {
    for node in &workflow.nodes {
        if !executed.contains(&node.id) && ctx.get_node_status(&node.id).is_none() {
            ctx.set_node_status(node.id.clone(), NodeStatus::Skipped);
        }
    }
}
