use scenesynth::graph::{
    GraphError, LayoutBand, NodeId, NodeUpdate, SceneGraph, SceneNode, SemanticType,
};
use scenesynth::mutation::{layout, MutationEngine, MutationError, NodeSpec, Operation, OperationBatch};

fn courtyard() -> SceneGraph {
    let mut graph = SceneGraph::new("g1", "Courtyard");
    graph
        .add_node(SceneNode::new("fountain", "Fountain").with_position(0.0, 0.0))
        .unwrap();
    graph
}

#[test]
fn test_batch_partial_success() {
    let mut graph = courtyard();
    let engine = MutationEngine::new();

    let batch = OperationBatch::new(vec![
        Operation::add_node(NodeSpec::new("Bench").with_id("bench")),
        Operation::add_edge("bench", "fountain", "faces"),
        Operation::update_node("statue", NodeUpdate::default().name("Old Statue")),
        Operation::add_node(NodeSpec::new("Lamp").with_id("lamp")),
        Operation::add_edge("lamp", "bench", "lights"),
    ]);

    let result = engine.apply(&mut graph, &batch);

    assert_eq!(result.applied_indices(), vec![0, 1, 3, 4]);
    assert_eq!(result.skipped_indices(), vec![2]);
    assert_eq!(
        result.skipped[0].error,
        MutationError::Graph(GraphError::NodeNotFound(NodeId::new("statue")))
    );

    // Exactly the applied operations are visible
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.edge_between(&"bench".into(), &"fountain".into()).is_some());
    assert!(graph.edge_between(&"lamp".into(), &"bench".into()).is_some());
    assert!(graph.find_node_by_name("Old Statue").is_none());
}

#[test]
fn test_sky_and_underground_are_opposite() {
    let mut graph = SceneGraph::new("g1", "Empty");
    let engine = MutationEngine::new();

    engine
        .add_node(&mut graph, NodeSpec::new("A").with_id("a").with_type("sky"))
        .unwrap();
    engine
        .add_node(
            &mut graph,
            NodeSpec::new("B").with_id("b").with_type(SemanticType::Underground),
        )
        .unwrap();

    let a = graph.get_node(&"a".into()).unwrap().position;
    let b = graph.get_node(&"b".into()).unwrap().position;
    assert_eq!(layout::band_of(a), Some(LayoutBand::Sky));
    assert_eq!(layout::band_of(b), Some(LayoutBand::Underground));
    assert!(a.y > 0.5 && b.y < -0.5);
}

#[test]
fn test_remove_then_update_conflict_policy() {
    let mut graph = courtyard();
    let engine = MutationEngine::new();

    let batch = OperationBatch::new(vec![
        Operation::update_node("fountain", NodeUpdate::default().description("Dry")),
        Operation::remove_node("fountain"),
        Operation::update_node("fountain", NodeUpdate::default().description("Flowing")),
        Operation::add_node(NodeSpec::new("Fountain").with_id("fountain")),
    ]);
    let result = engine.apply(&mut graph, &batch);

    assert_eq!(result.applied_indices(), vec![0, 1]);
    assert_eq!(result.skipped_indices(), vec![2, 3]);
    assert!(result.skipped[0].error.is_not_found());
    assert_eq!(
        result.skipped[1].error,
        MutationError::Graph(GraphError::DuplicateNodeId(NodeId::new("fountain")))
    );
    assert_eq!(graph.node_count(), 0);
}

#[test]
fn test_sibling_ties_are_broken_deterministically() {
    let build = || {
        let mut graph = SceneGraph::new("g1", "Market");
        let engine = MutationEngine::new();
        for i in 0..6 {
            engine
                .add_node(&mut graph, NodeSpec::new(format!("Stall {}", i)))
                .unwrap();
        }
        graph
    };

    let first = build();
    let second = build();
    let positions: Vec<_> = first.nodes().map(|n| n.position).collect();
    assert_eq!(positions, second.nodes().map(|n| n.position).collect::<Vec<_>>());

    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_operations_from_model_json() {
    let json = r#"[
        {"op": "add_node", "name": "Watchtower", "node_type": "landmark"},
        {"op": "add_edge", "source": "Watchtower", "target": "Fountain", "relationship": "overlooks"},
        {"op": "remove_edge", "source": "Watchtower", "target": "Fountain"}
    ]"#;
    let operations: Vec<Operation> = serde_json::from_str(json).unwrap();
    let batch: OperationBatch = operations.into_iter().collect();

    let mut graph = courtyard();
    let result = MutationEngine::new().apply(&mut graph, &batch);
    assert!(result.is_complete());
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 0);
}
