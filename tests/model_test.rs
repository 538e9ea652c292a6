//! 数据模型与消息信封测试模块


use hive_tree::{IdAllocator, Job, JobKind, LoadInfo, Message, NodeInfo, TreeNode};
use test_utils::new_test_node;

#[test]
fn test_weight_fixtures() {
    let ids = IdAllocator::new();

    let fib = Job::create(&ids, JobKind::Fibonacci, 10);
    assert_eq!(fib.weight(), 10);

    let square = Job::create(&ids, JobKind::SquareSum, 4);
    assert_eq!(square.weight(), 16);

    // ceil(100 * ln(100)) = 461
    let sieve = Job::create(&ids, JobKind::Eratosthenes, 100);
    assert_eq!(sieve.weight(), 461);
}

#[test]
fn test_identity_monotonic_assignment() {
    let ids = IdAllocator::new();
    let a = ids.assign();
    let b = ids.assign();
    assert!(b > a);
}

#[test]
fn test_identity_import_raises_counter() {
    // importId(50)之后分配的ID必须 >= 51，绝不与0..50碰撞
    let ids = IdAllocator::new();
    ids.import(50);
    assert!(ids.assign() >= 51);

    // 导入落后的ID不能让计数器倒退
    ids.import(3);
    assert!(ids.assign() >= 52);
}

#[test]
fn test_identity_concurrent_assignment_unique() {
    use std::collections::HashSet;
    use std::sync::Arc;

    let ids = Arc::new(IdAllocator::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let ids = Arc::clone(&ids);
        handles.push(std::thread::spawn(move || {
            (0..100).map(|_| ids.assign()).collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "id {id} assigned twice");
        }
    }
    assert_eq!(seen.len(), 800);
}

#[test]
fn test_job_ids_unique_per_allocator() {
    let ids = IdAllocator::new();
    let a = Job::create(&ids, JobKind::Fibonacci, 1);
    let b = Job::create(&ids, JobKind::SquareSum, 1);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_envelope_round_trip() {
    let node = new_test_node(1);
    let messages = vec![
        Message::SpinUpRequest { node_count: 4 },
        Message::KillRequest,
        Message::NodeOnline { port: 9001 },
        Message::Response {
            text: "ok".to_string(),
        },
        Message::BuildHierarchy {
            branching_factor: 2,
            nodes: vec![node.clone(), new_test_node(2)],
        },
        Message::SendNodeInfo { node: node.clone() },
        Message::LoadInfo(LoadInfo::new(node.clone(), 12.5)),
        Message::Hierarchy(TreeNode::new(node.clone())),
        Message::collect_jobs(),
        Message::JobInfoList {
            sender: node,
            jobs: Vec::new(),
        },
        Message::Log {
            text: "hello".to_string(),
        },
    ];

    for message in messages {
        let encoded = message.encode().unwrap();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }
}

#[test]
fn test_envelope_tag_is_the_discriminant() {
    // 外部标签编码：一条消息恰好一个变体键
    let encoded = Message::NodeOnline { port: 7 }.encode().unwrap();
    let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object.contains_key("nodeOnline"));
}

#[test]
fn test_envelope_rejects_malformed_payloads() {
    // 零个变体
    assert!(Message::decode("{}").is_err());
    // 两个变体同时出现
    assert!(Message::decode(r#"{"killRequest":null,"nodeOnline":{"port":1}}"#).is_err());
    // 未知变体
    assert!(Message::decode(r#"{"selfDestruct":{}}"#).is_err());
    // 缺少必填字段
    assert!(Message::decode(r#"{"nodeOnline":{}}"#).is_err());
}

#[test]
fn test_node_info_orders_by_id() {
    let mut nodes = vec![new_test_node(5), new_test_node(1), NodeInfo::unassigned("localhost", 1)];
    nodes.sort();
    assert_eq!(nodes[0].id, None);
    assert_eq!(nodes[1].id, Some(1));
    assert_eq!(nodes[2].id, Some(5));
}

#[test]
fn test_with_id_keeps_endpoint() {
    let bare = NodeInfo::unassigned("10.0.0.7", 4242);
    let assigned = NodeInfo::with_id(3, &bare);
    assert_eq!(assigned.id, Some(3));
    assert_eq!(assigned.address, "10.0.0.7");
    assert_eq!(assigned.port, 4242);
}
