//! Edge node health tracking and selection through the manager

use edgepulse::edge::{EdgeNodeStatus, SelectionCriteria, MAX_CONSECUTIVE_FAILURES};
use edgepulse::Error;

use crate::common::{node, Harness};

#[tokio::test]
async fn test_node_goes_offline_on_third_failure() {
    let h = Harness::new(vec![
        node("a", "us-east", 10.0, 1_000, 500),
        node("b", "us-east", 30.0, 1_000, 500),
    ]);
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();
    h.directory.set_unhealthy("a", true);

    for round in 1..=MAX_CONSECUTIVE_FAILURES {
        let summary = edge.check_all_nodes().await;
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.failed, 1);

        let status = edge.node("a").await.unwrap().status;
        if round < MAX_CONSECUTIVE_FAILURES {
            assert_eq!(status, EdgeNodeStatus::Online, "round {round}");
        } else {
            assert_eq!(status, EdgeNodeStatus::Offline, "round {round}");
        }
    }

    let metrics = edge.node_metrics("a").await.unwrap();
    assert_eq!(metrics.consecutive_failures, MAX_CONSECUTIVE_FAILURES);
    assert!(metrics.last_error.is_some());

    let selection = edge.select_node(&SelectionCriteria::for_session()).await.unwrap();
    assert_eq!(selection.node.id, "b");

    h.directory.set_unhealthy("a", false);
    edge.check_all_nodes().await;
    assert_eq!(edge.node("a").await.unwrap().status, EdgeNodeStatus::Online);
    assert_eq!(edge.node_metrics("a").await.unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn test_refresh_keeps_failing_node_offline() {
    let h = Harness::new(vec![node("a", "us-east", 10.0, 1_000, 500)]);
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();
    h.directory.set_unhealthy("a", true);

    for _ in 0..MAX_CONSECUTIVE_FAILURES {
        edge.check_all_nodes().await;
    }
    edge.refresh_nodes().await.unwrap();

    assert_eq!(edge.node("a").await.unwrap().status, EdgeNodeStatus::Offline);
    assert!(matches!(
        edge.select_node(&SelectionCriteria::for_session()).await,
        Err(Error::NoSuitableNodes)
    ));
    assert!(!h.adapter.is_healthy().await);
}

#[tokio::test]
async fn test_maintenance_nodes_are_not_checked() {
    let h = Harness::new(vec![
        node("a", "us-east", 10.0, 1_000, 500),
        node("m", "us-east", 10.0, 1_000, 500).with_status(EdgeNodeStatus::Maintenance),
    ]);
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();

    let summary = edge.check_all_nodes().await;
    assert_eq!(summary.checked, 1);
    assert_eq!(edge.node("m").await.unwrap().status, EdgeNodeStatus::Maintenance);
}

#[tokio::test]
async fn test_connection_limit() {
    let config = edgepulse::AdapterConfig::builder()
        .max_edge_connections(1)
        .build()
        .unwrap();
    let h = Harness::with_config(
        config,
        vec![
            node("a", "us-east", 10.0, 1_000, 500),
            node("b", "eu-west", 20.0, 1_000, 500),
        ],
    );
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();

    edge.connect("a").await.unwrap();
    edge.connect("a").await.unwrap();
    assert!(matches!(edge.connect("b").await, Err(Error::ConnectionLimit { max: 1 })));
    assert!(matches!(edge.connect("zz").await, Err(Error::NodeNotFound(_))));

    assert!(edge.disconnect("a").await);
    edge.connect("b").await.unwrap();
    assert_eq!(edge.connected_nodes().await, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_load_reports_drive_views_and_selection() {
    let h = Harness::new(vec![
        node("a", "us-east", 10.0, 100, 50),
        node("b", "us-east", 10.0, 100, 50),
    ]);
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();

    edge.report_node_load("a", 90, 100).await.unwrap();
    edge.report_node_load("b", 10, 100).await.unwrap();

    let hot: Vec<_> = edge.hot_nodes().await.into_iter().map(|n| n.id).collect();
    let cold: Vec<_> = edge.cold_nodes().await.into_iter().map(|n| n.id).collect();
    assert_eq!(hot, vec!["a".to_string()]);
    assert_eq!(cold, vec!["b".to_string()]);

    let by_load: Vec<_> = edge.nodes_by_load().await.into_iter().map(|n| n.id).collect();
    assert_eq!(by_load, vec!["b".to_string(), "a".to_string()]);

    let selection = edge.select_node(&SelectionCriteria::for_session()).await.unwrap();
    assert_eq!(selection.node.id, "b");

    let strict = SelectionCriteria::for_session().with_min_capacity(20);
    let selection = edge.select_node(&strict).await.unwrap();
    assert_eq!(selection.node.id, "b");
    assert!(selection.alternatives.is_empty());

    assert!(matches!(
        edge.report_node_load("zz", 1, 10).await,
        Err(Error::NodeNotFound(_))
    ));
}
