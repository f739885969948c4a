// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end correlation runs over the classic TCP handshake scenario.
//!
//! The model is `s_tcp; s_syn ~> s_synack`: qualify on TCP packets, match
//! SYN packets binding their source port, then search for the SYN-ACK whose
//! destination port equals the bound value. Each test drives a full
//! `process_model` run against an in-memory event log.

use behavior_engine::core::event::{AttributeValue, Event};
use behavior_engine::core::store::memory::fixture_event;
use behavior_engine::core::store::MemoryEventStore;
use behavior_engine::core::symbol::{StateSymbol, SymbolTable};
use behavior_engine::core::time::Time;
use behavior_engine::core::tree::{
    AttributeExpr, Behavior, Model, Node, NodeKind, OpConstraint, RelOp,
};
use behavior_engine::{EngineConfig, ModelProcessor};

fn tcp(id: u64, sec: i64, flags: &str, extra: &[(&str, AttributeValue)]) -> Event {
    let mut attrs = vec![("flags", AttributeValue::from(flags))];
    attrs.extend(extra.iter().cloned());
    fixture_event(id, "PKT_TCP", Time::new(sec, 0), &attrs)
}

fn symbols() -> SymbolTable {
    let mut table = SymbolTable::new();
    table.register_state("net.s_tcp", StateSymbol::new("PKT_TCP"));
    table.register_state(
        "net.s_syn",
        StateSymbol::new("PKT_TCP")
            .attr("flags", AttributeExpr::Constant("SYN".into()))
            .attr("sport", AttributeExpr::Independent),
    );
    table.register_state(
        "net.s_synack",
        StateSymbol::new("PKT_TCP")
            .attr("flags", AttributeExpr::Constant("SYN-ACK".into()))
            .attr("dport", AttributeExpr::Dependent("net.s_syn.sport".into())),
    );
    table
}

/// `b_handshake = s_tcp; s_syn ~> s_synack`.
fn handshake_model(op_constraint: Option<OpConstraint>) -> Model {
    let mut model = Model::new("handshake", "net");
    let b = model.add_behavior(Behavior::new("b_handshake", "net"));
    let q = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
    let syn = model.add_node(Node::new("s_syn", "net", NodeKind::State));
    let mut leadsto = Node::new("op1", "net", NodeKind::LeadsTo);
    if let Some(c) = op_constraint {
        leadsto = leadsto.with_op_constraint(c);
    }
    let leadsto = model.add_node(leadsto);
    let synack = model.add_node(Node::new("s_synack", "net", NodeKind::State));
    model.behavior_mut(b).children = vec![q, syn, leadsto, synack];
    model.set_root(b);
    model
}

/// Three complete handshakes plus one UDP packet the qualifier must drop.
fn handshake_store() -> MemoryEventStore {
    MemoryEventStore::with_events([
        tcp(1, 10, "SYN", &[("sport", 1111.into())]),
        tcp(2, 11, "SYN-ACK", &[("dport", 1111.into())]),
        tcp(3, 20, "SYN", &[("sport", 2222.into())]),
        tcp(4, 21, "SYN-ACK", &[("dport", 2222.into())]),
        tcp(5, 30, "SYN", &[("sport", 3333.into())]),
        tcp(6, 31, "SYN-ACK", &[("dport", 3333.into())]),
        fixture_event(7, "PKT_UDP", Time::new(32, 0), &[("sport", 53.into())]),
    ])
}

fn processor(store: MemoryEventStore) -> ModelProcessor {
    ModelProcessor::new(Box::new(store), symbols(), EngineConfig::default())
}

/// The canonical 20-event regression fixture: four answered SYNs, one
/// unanswered SYN, one SYN-ACK with no matching SYN, one SYN-ACK that
/// precedes its SYN, assorted ACK/FIN/RST noise, and one UDP packet the
/// qualifier must drop.
fn canonical_store() -> MemoryEventStore {
    MemoryEventStore::with_events([
        tcp(1, 10, "SYN", &[("sport", 1111.into())]),
        tcp(2, 11, "ACK", &[]),
        tcp(3, 12, "SYN-ACK", &[("dport", 1111.into())]),
        tcp(4, 13, "FIN", &[]),
        tcp(5, 14, "SYN", &[("sport", 2222.into())]),
        tcp(6, 15, "SYN-ACK", &[("dport", 9999.into())]),
        tcp(7, 16, "SYN-ACK", &[("dport", 2222.into())]),
        tcp(8, 17, "RST", &[]),
        tcp(9, 18, "SYN", &[("sport", 3333.into())]),
        tcp(10, 19, "ACK", &[]),
        tcp(11, 20, "SYN", &[("sport", 4444.into())]),
        tcp(12, 21, "SYN-ACK", &[("dport", 4444.into())]),
        tcp(13, 22, "FIN", &[]),
        tcp(14, 5, "SYN-ACK", &[("dport", 5555.into())]),
        tcp(15, 23, "SYN", &[("sport", 5555.into())]),
        tcp(16, 24, "ACK", &[]),
        tcp(17, 25, "SYN", &[("sport", 6666.into())]),
        tcp(18, 26, "SYN-ACK", &[("dport", 6666.into())]),
        fixture_event(19, "PKT_UDP", Time::new(27, 0), &[("sport", 53.into())]),
        tcp(20, 28, "FIN", &[]),
    ])
}

#[test]
fn syn_synack_pairs_correlate_by_bound_port() {
    let mut proc = processor(canonical_store());
    let result = proc.process_model(&handshake_model(None)).expect("model run");

    // Exactly the pairs whose SYN-ACK carries the SYN's bound port and
    // follows it in time. SYN 9 is unanswered, SYN-ACK 6 matches no SYN,
    // and SYN-ACK 14 precedes SYN 15.
    assert_eq!(result.len(), 4);
    let pairs: Vec<Vec<u64>> = result.iter().map(|i| i.ids()).collect();
    assert_eq!(
        pairs,
        vec![vec![1, 3], vec![5, 7], vec![11, 12], vec![17, 18]]
    );
}

#[test]
fn a_successor_is_consumed_at_most_once() {
    // Two SYNs from the same port race for a single SYN-ACK; the earlier
    // trigger wins and the later one finds the pool empty.
    let store = MemoryEventStore::with_events([
        tcp(1, 10, "SYN", &[("sport", 1111.into())]),
        tcp(2, 12, "SYN", &[("sport", 1111.into())]),
        tcp(3, 15, "SYN-ACK", &[("dport", 1111.into())]),
    ]);
    let mut proc = processor(store);
    let result = proc.process_model(&handshake_model(None)).expect("model run");

    assert_eq!(result.len(), 1);
    assert_eq!(result.first().expect("one pair").ids(), vec![1, 3]);
}

#[test]
fn a_successor_before_the_trigger_is_not_paired() {
    let store = MemoryEventStore::with_events([
        tcp(1, 5, "SYN-ACK", &[("dport", 9999.into())]),
        tcp(2, 50, "SYN", &[("sport", 9999.into())]),
    ]);
    let mut proc = processor(store);
    let result = proc.process_model(&handshake_model(None)).expect("model run");
    assert!(result.is_empty());
}

#[test]
fn operator_time_window_rejects_late_successors() {
    // `~> [<= 2 secs]`: the second SYN-ACK arrives 5 seconds after its SYN
    // and falls outside the window.
    let store = MemoryEventStore::with_events([
        tcp(1, 10, "SYN", &[("sport", 1111.into())]),
        tcp(2, 11, "SYN-ACK", &[("dport", 1111.into())]),
        tcp(3, 20, "SYN", &[("sport", 2222.into())]),
        tcp(4, 25, "SYN-ACK", &[("dport", 2222.into())]),
    ]);
    let within_two = OpConstraint {
        relop: RelOp::Le,
        delta: Time::new(2, 0),
    };
    let mut proc = processor(store);
    let result = proc
        .process_model(&handshake_model(Some(within_two)))
        .expect("model run");

    assert_eq!(result.len(), 1);
    assert_eq!(result.first().expect("one pair").ids(), vec![1, 2]);
}

#[test]
fn reruns_on_one_processor_are_idempotent() {
    // The qualifier opens a fresh correlation epoch and resets the query
    // cache, so consumption from an earlier run cannot leak into the next.
    let mut proc = processor(handshake_store());
    let model = handshake_model(None);
    let first = proc.process_model(&model).expect("first run");
    let second = proc.process_model(&model).expect("second run");

    assert_eq!(first, second);
    assert_eq!(second.len(), 3);
}

#[test]
fn recursion_reference_suppresses_the_target_qualifier() {
    // `b_main = s_tcp; s_syn ~> b_sub` with `b_sub` referenced recursively:
    // the sub-behavior's own qualifier is skipped and its state evaluates
    // against the predecessors, so the outcome matches the flat model.
    let mut model = Model::new("handshake_rec", "net");
    let b_main = model.add_behavior(Behavior::new("b_main", "net"));
    let b_sub = model.add_behavior(Behavior::new("b_sub", "net"));

    let q = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
    let syn = model.add_node(Node::new("s_syn", "net", NodeKind::State));
    let leadsto = model.add_node(Node::new("op1", "net", NodeKind::LeadsTo));
    let rec = model.add_node(Node::new("b_sub", "net", NodeKind::Recursion(b_sub)));
    model.behavior_mut(b_main).children = vec![q, syn, leadsto, rec];

    let q_sub = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
    let synack = model.add_node(Node::new("s_synack", "net", NodeKind::State));
    model.behavior_mut(b_sub).children = vec![q_sub, synack];

    model.set_root(b_main);

    let mut proc = processor(handshake_store());
    let result = proc.process_model(&model).expect("model run");

    assert_eq!(result.len(), 3);
    let pairs: Vec<Vec<u64>> = result.iter().map(|i| i.ids()).collect();
    assert_eq!(pairs, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
}

#[test]
fn nested_behavior_runs_with_its_own_qualifier() {
    let mut model = Model::new("nested", "net");
    let b_main = model.add_behavior(Behavior::new("b_main", "net"));
    let b_sub = model.add_behavior(Behavior::new("b_sub", "net"));

    let q = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
    let sub_ref = model.add_node(Node::new("b_sub", "net", NodeKind::Behavior(b_sub)));
    model.behavior_mut(b_main).children = vec![q, sub_ref];

    let q_sub = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
    let syn = model.add_node(Node::new("s_syn", "net", NodeKind::State));
    model.behavior_mut(b_sub).children = vec![q_sub, syn];

    model.set_root(b_main);

    let mut proc = processor(handshake_store());
    let result = proc.process_model(&model).expect("model run");
    let ids: Vec<u64> = result.iter().map(|i| i.id()).collect();
    assert_eq!(ids, vec![1, 3, 5]);
}
